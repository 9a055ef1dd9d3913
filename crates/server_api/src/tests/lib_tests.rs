use super::*;
use generator::{ExtractiveGenerator, GeneratorError};
use shared::protocol::UploadStatus;
use tempfile::TempDir;

const POLICY_TEXT: &str = "Refunds are issued within thirty days of purchase. \
    Shipping takes five business days across the country. \
    The warranty covers manufacturing defects for one year.";

struct FailingGenerator;

#[async_trait::async_trait]
impl AnswerGenerator for FailingGenerator {
    async fn generate(&self, _query: &str, _context: &[&str]) -> Result<String, GeneratorError> {
        Err(GeneratorError::Response("quota exhausted".to_string()))
    }
}

async fn test_context_with(generator: Arc<dyn AnswerGenerator>) -> (ApiContext, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut config = PipelineConfig::new(dir.path().join("uploads"));
    config.recent_chats_path = Some(dir.path().join("recent_chats").join("chats.json"));
    (ApiContext::new(storage, generator, config), dir)
}

async fn test_context() -> (ApiContext, TempDir) {
    test_context_with(Arc::new(ExtractiveGenerator)).await
}

fn text_upload(name: &str, body: &str) -> Option<UploadedFile> {
    Some(UploadedFile {
        filename: name.to_string(),
        bytes: body.as_bytes().to_vec(),
    })
}

fn query(text: &str) -> QueryRequest {
    QueryRequest {
        query: text.to_string(),
    }
}

#[tokio::test]
async fn rejects_invalid_uploads_with_fixed_messages() {
    let (ctx, _dir) = test_context().await;

    let cases = [
        (None, NO_FILE_UPLOADED),
        (text_upload("  ", POLICY_TEXT), NO_FILE_SELECTED),
        (text_upload("slides.pptx", POLICY_TEXT), UNSUPPORTED_FILE_TYPE),
        (text_upload("empty.pdf", ""), EMPTY_FILE),
    ];
    for (file, expected) in cases {
        let outcome = ingest_upload(&ctx, file).await.expect("outcome");
        assert_eq!(outcome.status, UploadStatus::Error);
        assert_eq!(outcome.message, expected);
        assert!(!outcome.chat_visible);
    }
    assert!(ctx.current_filename().await.is_none());
}

#[tokio::test]
async fn text_without_enough_content_reports_processing_error() {
    let (ctx, _dir) = test_context().await;
    let outcome = ingest_upload(&ctx, text_upload("tiny.txt", "Too short."))
        .await
        .expect("outcome");
    assert_eq!(outcome.status, UploadStatus::Error);
    assert!(outcome
        .message
        .starts_with("Failed: Error processing PDF: No meaningful text"));
}

#[tokio::test]
async fn blank_document_reports_no_text_extracted() {
    let (ctx, _dir) = test_context().await;
    let outcome = ingest_upload(&ctx, text_upload("blank.txt", " \n\n  "))
        .await
        .expect("outcome");
    assert_eq!(outcome.message, NO_TEXT_EXTRACTED);
}

#[tokio::test]
async fn successful_upload_enables_chat_and_answers_queries() {
    let (ctx, dir) = test_context().await;

    let outcome = ingest_upload(&ctx, text_upload("../Store Policy.txt", POLICY_TEXT))
        .await
        .expect("outcome");
    assert_eq!(outcome, UploadOutcome::success());
    assert_eq!(ctx.current_filename().await.as_deref(), Some("Store_Policy"));
    assert!(dir.path().join("uploads").join("Store_Policy.txt").exists());

    let response = answer_query(&ctx, query("How long is the warranty?"))
        .await
        .expect("answer");
    assert!(response.answer.contains("warranty"));

    let chats = ctx.storage.list_recent_chats().await.expect("chats");
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].query, "How long is the warranty?");

    let mirrored = std::fs::read_to_string(dir.path().join("recent_chats").join("chats.json"))
        .expect("mirror");
    let mirrored: Vec<RecentChat> = serde_json::from_str(&mirrored).expect("json");
    assert_eq!(mirrored.len(), 1);
}

#[tokio::test]
async fn recent_chats_are_capped_and_reset_by_new_upload() {
    let (ctx, _dir) = test_context().await;
    ingest_upload(&ctx, text_upload("policy.txt", POLICY_TEXT))
        .await
        .expect("upload");

    for i in 0..7 {
        answer_query(&ctx, query(&format!("refund question {i}")))
            .await
            .expect("answer");
    }
    let chats = ctx.storage.list_recent_chats().await.expect("chats");
    assert_eq!(chats.len(), 5);
    assert_eq!(chats[0].query, "refund question 2");

    ingest_upload(&ctx, text_upload("other.txt", POLICY_TEXT))
        .await
        .expect("second upload");
    assert!(ctx.storage.list_recent_chats().await.expect("chats").is_empty());
    assert_eq!(ctx.current_filename().await.as_deref(), Some("other"));
}

#[tokio::test]
async fn queries_before_upload_or_blank_get_fixed_replies() {
    let (ctx, _dir) = test_context().await;

    let blank = answer_query(&ctx, query("   ")).await.expect("blank");
    assert_eq!(blank.answer, EMPTY_QUERY_REPLY);

    let no_doc = answer_query(&ctx, query("anything?")).await.expect("no doc");
    assert_eq!(no_doc.answer, NO_DOCUMENT_REPLY);
    assert!(ctx.storage.list_recent_chats().await.expect("chats").is_empty());
}

#[tokio::test]
async fn generator_failure_becomes_apology() {
    let (ctx, _dir) = test_context_with(Arc::new(FailingGenerator)).await;
    ingest_upload(&ctx, text_upload("policy.txt", POLICY_TEXT))
        .await
        .expect("upload");

    let response = answer_query(&ctx, query("refunds?")).await.expect("answer");
    assert_eq!(response.answer, generator::GENERATOR_FAILURE_REPLY);
}

#[tokio::test]
async fn page_state_reflects_query_parameters() {
    let (ctx, _dir) = test_context().await;

    let success = page_state(
        &ctx,
        PageQuery {
            message: Some("success".to_string()),
            file: None,
        },
    )
    .await
    .expect("state");
    assert!(success.show_chat);
    assert_eq!(success.message.as_deref(), Some("success"));

    let invalid = page_state(
        &ctx,
        PageQuery {
            message: Some("success".to_string()),
            file: Some("x.pdf".to_string()),
        },
    )
    .await
    .expect("state");
    assert!(!invalid.show_chat);
    assert_eq!(invalid.error.as_deref(), Some(INVALID_PAGE_REQUEST));

    let plain = page_state(&ctx, PageQuery::default()).await.expect("state");
    assert!(!plain.show_chat);
    assert!(plain.error.is_none());
}

#[tokio::test]
async fn restores_index_from_upload_folder() {
    let (ctx, dir) = test_context().await;
    ingest_upload(&ctx, text_upload("policy.txt", POLICY_TEXT))
        .await
        .expect("upload");

    let restarted = ApiContext::new(
        ctx.storage.clone(),
        Arc::new(ExtractiveGenerator),
        PipelineConfig::new(dir.path().join("uploads")),
    );
    assert!(restarted.current_filename().await.is_none());
    assert!(restarted.restore_current_document().await.expect("restore"));
    assert_eq!(restarted.current_filename().await.as_deref(), Some("policy"));
}

#[tokio::test]
async fn restores_document_saved_with_uppercase_extension() {
    let (ctx, dir) = test_context().await;
    ingest_upload(&ctx, text_upload("Policy.TXT", POLICY_TEXT))
        .await
        .expect("upload");
    assert!(dir.path().join("uploads").join("Policy.TXT").is_file());

    let restarted = ApiContext::new(
        ctx.storage.clone(),
        Arc::new(ExtractiveGenerator),
        PipelineConfig::new(dir.path().join("uploads")),
    );
    assert!(restarted.restore_current_document().await.expect("restore"));
    assert_eq!(restarted.current_filename().await.as_deref(), Some("Policy"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_leave_index_and_storage_in_agreement() {
    let (ctx, dir) = test_context().await;

    let uploads: Vec<_> = (0..8)
        .map(|i| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ingest_upload(&ctx, text_upload(&format!("doc{i}.txt"), POLICY_TEXT)).await
            })
        })
        .collect();
    for upload in uploads {
        let outcome = upload.await.expect("join").expect("outcome");
        assert_eq!(outcome, UploadOutcome::success());
    }

    let stored = ctx
        .storage
        .current_document()
        .await
        .expect("doc")
        .expect("current document");
    assert_eq!(ctx.current_filename().await, Some(stored.filename.clone()));

    let saved: Vec<_> = std::fs::read_dir(dir.path().join("uploads"))
        .expect("uploads")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(saved, vec![stored.stored_name]);
}
