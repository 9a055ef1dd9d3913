use super::*;
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use tokio::net::TcpListener;

async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

#[test]
fn prompt_carries_context_and_question() {
    let prompt = build_prompt("What is covered?", &["Defects are covered.", "For one year."]);
    assert!(prompt.contains("Context: Defects are covered. For one year."));
    assert!(prompt.contains("Question: What is covered?"));
    assert!(prompt.ends_with("Answer:"));
}

#[test]
fn blank_or_none_answers_become_fallback_reply() {
    assert_eq!(finalize_answer(Ok("  ".to_string())), NO_ANSWER_REPLY);
    assert_eq!(finalize_answer(Ok("None".to_string())), NO_ANSWER_REPLY);
    assert_eq!(
        finalize_answer(Ok(" Thirty days. \n".to_string())),
        "Thirty days."
    );
    assert_eq!(
        finalize_answer(Err(GeneratorError::Response("boom".to_string()))),
        GENERATOR_FAILURE_REPLY
    );
}

#[tokio::test]
async fn extractive_generator_returns_best_chunk() {
    let answer = ExtractiveGenerator
        .generate("q", &["best", "second"])
        .await
        .expect("answer");
    assert_eq!(answer, "best");
}

#[tokio::test]
async fn gemini_generator_reads_first_candidate_text() {
    let router = Router::new().route(
        "/models/:call",
        post(|Path(call): Path<String>, headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
            assert_eq!(call, "test-model:generateContent");
            assert_eq!(headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()), Some("key"));
            assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
            Json(serde_json::json!({
                "candidates": [{ "content": { "role": "model", "parts": [{ "text": "Thirty days." }] } }]
            }))
        }),
    );
    let base = spawn_stub(router).await;

    let generator = GeminiGenerator::new("key", "test-model").with_base_url(format!("{base}/models"));
    let answer = generator
        .generate("refund window?", &["Refunds within thirty days."])
        .await
        .expect("answer");
    assert_eq!(answer, "Thirty days.");
}

#[tokio::test]
async fn gemini_generator_surfaces_http_errors() {
    let router = Router::new().route(
        "/models/:call",
        post(|| async { (StatusCode::FORBIDDEN, "bad key") }),
    );
    let base = spawn_stub(router).await;

    let generator = GeminiGenerator::new("key", "m").with_base_url(format!("{base}/models"));
    let err = generator.generate("q", &[]).await.expect_err("should fail");
    assert!(matches!(err, GeneratorError::Http { status_code: 403, .. }));
}

#[tokio::test]
async fn connection_errors_do_not_expose_api_key() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let generator = GeminiGenerator::new("SECRET-KEY", "m").with_base_url(format!("http://{addr}/models"));
    let err = generator.generate("q", &["context"]).await.expect_err("should fail");

    assert!(matches!(err, GeneratorError::Request(_)));
    assert!(!err.to_string().contains("SECRET-KEY"));
    assert!(!format!("{err:?}").contains("SECRET-KEY"));
    assert!(!format!("{err:?}").contains("generateContent"));
}
