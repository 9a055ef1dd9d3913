use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use server_api::{
    answer_query,
    generator::{AnswerGenerator, ExtractiveGenerator, GeminiGenerator},
    ingest_upload, page_state, ApiContext, PipelineConfig, UploadedFile,
};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        health_route, query_route, upload_route, PageQuery, PageState, QueryRequest,
        QueryResponse, UploadOutcome,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

const UPLOAD_FIELD: &str = "file";

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let generator: Arc<dyn AnswerGenerator> = match settings.gemini_api_key.clone() {
        Some(api_key) => {
            info!(model = %settings.gemini_model, "answering with Gemini");
            Arc::new(GeminiGenerator::new(api_key, settings.gemini_model.clone()))
        }
        None => {
            warn!("no Gemini API key configured; answering with best matching excerpt");
            Arc::new(ExtractiveGenerator)
        }
    };

    let mut pipeline = PipelineConfig::new(settings.upload_dir.clone());
    pipeline.recent_chats_path = Some(settings.recent_chats_path());
    tokio::fs::create_dir_all(&settings.upload_dir).await?;
    tokio::fs::create_dir_all(&settings.recent_chats_dir).await?;

    let api = ApiContext::new(storage, generator, pipeline);
    if let Err(error) = api.restore_current_document().await {
        warn!(%error, "could not restore previous document");
    }

    let app = build_router(Arc::new(AppState { api }), settings.max_upload_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(health_route(), get(healthz))
        .route(upload_route(), get(http_page_state).post(http_upload))
        .route(query_route(), post(http_query))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_page_state(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> Result<Json<PageState>, HttpError> {
    let page = page_state(&state.api, q)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(e)))?;
    Ok(Json(page))
}

async fn http_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, HttpError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        file = Some(UploadedFile {
            filename,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let outcome = ingest_upload(&state.api, file)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(e)))?;
    Ok(Json(outcome))
}

async fn http_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, HttpError> {
    let response = answer_query(&state.api, req)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(e)))?;
    Ok(Json(response))
}

fn multipart_error(err: MultipartError) -> HttpError {
    let status = err.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorCode::PayloadTooLarge
    } else {
        ErrorCode::Validation
    };
    warn!(%status, error = %err, "rejected upload body");
    (status, Json(ApiError::new(code, err.body_text())))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
