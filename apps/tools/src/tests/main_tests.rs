use super::*;

fn chat(query: &str) -> RecentChat {
    RecentChat {
        query: query.to_string(),
        response: format!("answer to {query}"),
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn clear_chats_empties_database_and_mirror() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mirror = dir.path().join("recent_chats").join("chats.json");
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.append_recent_chat(&chat("refunds?"), 5).await.expect("append");
    storage.append_recent_chat(&chat("shipping?"), 5).await.expect("append");
    std::fs::create_dir_all(mirror.parent().expect("parent")).expect("mkdir");
    std::fs::write(
        &mirror,
        serde_json::to_vec(&storage.list_recent_chats().await.expect("list")).expect("json"),
    )
    .expect("seed mirror");

    let removed = clear_chats(&storage, &mirror).await.expect("clear");

    assert_eq!(removed, 2);
    assert!(storage.list_recent_chats().await.expect("list").is_empty());
    let mirrored: Vec<RecentChat> =
        serde_json::from_slice(&std::fs::read(&mirror).expect("mirror")).expect("json");
    assert!(mirrored.is_empty());
}
