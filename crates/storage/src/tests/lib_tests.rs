use super::*;

fn chat(query: &str) -> RecentChat {
    RecentChat {
        query: query.to_string(),
        response: format!("answer to {query}"),
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn recent_chats_keep_only_the_newest_entries() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    for i in 0..7 {
        storage
            .append_recent_chat(&chat(&format!("q{i}")), 5)
            .await
            .expect("append");
    }

    let chats = storage.list_recent_chats().await.expect("list");
    let queries: Vec<_> = chats.iter().map(|c| c.query.as_str()).collect();
    assert_eq!(queries, vec!["q2", "q3", "q4", "q5", "q6"]);
}

#[tokio::test]
async fn replacing_document_resets_chats_and_tracks_current() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.current_document().await.expect("doc").is_none());

    storage
        .replace_current_document(NewDocument {
            filename: "handbook",
            stored_name: "handbook.pdf",
            size_bytes: 1024,
            chunk_count: 3,
        })
        .await
        .expect("first");
    storage
        .append_recent_chat(&chat("refunds?"), 5)
        .await
        .expect("append");

    let second = storage
        .replace_current_document(NewDocument {
            filename: "policy",
            stored_name: "Policy.PDF",
            size_bytes: 2048,
            chunk_count: 1,
        })
        .await
        .expect("second");

    let current = storage
        .current_document()
        .await
        .expect("doc")
        .expect("current document");
    assert_eq!(current.document_id, second);
    assert_eq!(current.filename, "policy");
    assert_eq!(current.stored_name, "Policy.PDF");
    assert_eq!(current.chunk_count, 1);
    assert!(storage.list_recent_chats().await.expect("list").is_empty());
}

#[tokio::test]
async fn clear_recent_chats_reports_removed_rows() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.append_recent_chat(&chat("a"), 5).await.expect("a");
    storage.append_recent_chat(&chat("b"), 5).await.expect("b");

    assert_eq!(storage.clear_recent_chats().await.expect("clear"), 2);
    assert!(storage.list_recent_chats().await.expect("list").is_empty());
}
