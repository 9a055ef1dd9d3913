use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use chrono::Utc;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        PageQuery, PageState, QueryRequest, QueryResponse, RecentChat, UploadOutcome,
        UPLOAD_SUCCESS_MESSAGE,
    },
};
use storage::{NewDocument, Storage};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub mod chunking;
pub mod generator;
pub mod ingest;
pub mod retrieval;

use generator::{finalize_answer, AnswerGenerator};
use ingest::{document_stem, extract_text, secure_filename, store_upload, DocumentKind, IngestError};
use retrieval::Bm25Index;

pub const NO_FILE_UPLOADED: &str = "Failed: No file uploaded.";
pub const NO_FILE_SELECTED: &str = "Failed: No file selected.";
pub const UNSUPPORTED_FILE_TYPE: &str = "Failed: Unsupported file type. Please upload a PDF.";
pub const EMPTY_FILE: &str = "Failed: Uploaded file is empty.";
pub const NO_TEXT_EXTRACTED: &str =
    "Failed: No text extracted from the PDF. It may be scanned or image-based.";
pub const INVALID_PAGE_REQUEST: &str =
    "Failed: Invalid request. Please upload a PDF using the form.";
pub const EMPTY_QUERY_REPLY: &str = "Please enter a query.";
pub const NO_DOCUMENT_REPLY: &str = "No PDF processed. Please upload a PDF first.";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_dir: PathBuf,
    /// JSON mirror of the recent chats; `None` disables it.
    pub recent_chats_path: Option<PathBuf>,
    pub chunk_sentences: usize,
    pub overlap_ratio: f32,
    pub top_k: usize,
    pub recent_chat_limit: usize,
}

impl PipelineConfig {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            recent_chats_path: None,
            chunk_sentences: chunking::DEFAULT_CHUNK_SENTENCES,
            overlap_ratio: chunking::DEFAULT_OVERLAP_RATIO,
            top_k: retrieval::DEFAULT_TOP_K,
            recent_chat_limit: 5,
        }
    }
}

/// The document questions are currently answered from.
pub struct LoadedDocument {
    pub filename: String,
    pub index: Bm25Index,
}

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub generator: Arc<dyn AnswerGenerator>,
    pub config: Arc<PipelineConfig>,
    document: Arc<RwLock<Option<LoadedDocument>>>,
    /// Held for the whole of an upload, from saving the file to swapping the index.
    upload_lock: Arc<Mutex<()>>,
}

/// A file field pulled out of an upload form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ApiContext {
    pub fn new(storage: Storage, generator: Arc<dyn AnswerGenerator>, config: PipelineConfig) -> Self {
        Self {
            storage,
            generator,
            config: Arc::new(config),
            document: Arc::new(RwLock::new(None)),
            upload_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn current_filename(&self) -> Option<String> {
        self.document
            .read()
            .await
            .as_ref()
            .map(|doc| doc.filename.clone())
    }

    /// Reloads the document recorded in storage from the upload folder, if it is still there.
    pub async fn restore_current_document(&self) -> anyhow::Result<bool> {
        let Some(stored) = self.storage.current_document().await? else {
            return Ok(false);
        };
        let path = self.config.upload_dir.join(&stored.stored_name);
        let Some(kind) = DocumentKind::from_filename(&stored.stored_name) else {
            warn!(stored_name = %stored.stored_name, "stored document has unsupported type");
            return Ok(false);
        };
        if !path.is_file() {
            warn!(filename = %stored.filename, "stored document missing from upload folder");
            return Ok(false);
        }
        let text = extract_text(&path, kind)
            .await
            .with_context(|| format!("failed to re-read '{}'", path.display()))?;
        let chunks = self.chunk(&text);
        if chunks.is_empty() {
            return Ok(false);
        }
        info!(filename = %stored.filename, chunks = chunks.len(), "restored document index");
        *self.document.write().await = Some(LoadedDocument {
            filename: stored.filename,
            index: Bm25Index::new(chunks),
        });
        Ok(true)
    }

    fn chunk(&self, text: &str) -> Vec<String> {
        chunking::chunk_text(text, self.config.chunk_sentences, self.config.overlap_ratio)
    }
}

/// Validates, stores and indexes an uploaded document.
///
/// Rejections are reported in the returned outcome; only storage faults
/// become an [`ApiError`].
pub async fn ingest_upload(
    ctx: &ApiContext,
    file: Option<UploadedFile>,
) -> Result<UploadOutcome, ApiError> {
    debug!("processing document upload");
    let Some(file) = file else {
        error!("{}", NO_FILE_UPLOADED);
        return Ok(UploadOutcome::failed(NO_FILE_UPLOADED));
    };
    let raw_name = file.filename.trim();
    if raw_name.is_empty() {
        error!("{}", NO_FILE_SELECTED);
        return Ok(UploadOutcome::failed(NO_FILE_SELECTED));
    }
    let Some(kind) = DocumentKind::from_filename(raw_name) else {
        error!(filename = %raw_name, "unsupported upload type");
        return Ok(UploadOutcome::failed(UNSUPPORTED_FILE_TYPE));
    };
    if file.bytes.is_empty() {
        error!("{}", EMPTY_FILE);
        return Ok(UploadOutcome::failed(EMPTY_FILE));
    }

    let filename = secure_filename(raw_name)
        .filter(|name| DocumentKind::from_filename(name) == Some(kind))
        .unwrap_or_else(|| format!("document.{}", kind.extension()));

    match index_document(ctx, &filename, kind, &file.bytes).await {
        Ok(Some(chunk_count)) => {
            info!(%filename, chunk_count, "document processing completed");
            Ok(UploadOutcome::success())
        }
        Ok(None) => {
            error!(%filename, "{}", NO_TEXT_EXTRACTED);
            Ok(UploadOutcome::failed(NO_TEXT_EXTRACTED))
        }
        Err(IndexFailure::Processing(err)) => {
            let message = format!("Failed: Error processing PDF: {err}");
            error!(%filename, "{message}");
            Ok(UploadOutcome::failed(message))
        }
        Err(IndexFailure::Storage(err)) => Err(internal(err)),
    }
}

enum IndexFailure {
    Processing(IngestError),
    Storage(anyhow::Error),
}

async fn index_document(
    ctx: &ApiContext,
    filename: &str,
    kind: DocumentKind,
    bytes: &[u8],
) -> Result<Option<usize>, IndexFailure> {
    let _upload = ctx.upload_lock.lock().await;
    let path = store_upload(&ctx.config.upload_dir, filename, bytes)
        .await
        .map_err(|e| IndexFailure::Processing(IngestError::Other(e)))?;
    let text = extract_text(&path, kind)
        .await
        .map_err(IndexFailure::Processing)?;
    if text.is_empty() {
        return Ok(None);
    }

    let chunks = ctx.chunk(&text);
    if chunks.is_empty() {
        return Ok(None);
    }
    let chunk_count = chunks.len();
    let stem = document_stem(filename).to_string();

    ctx.storage
        .replace_current_document(NewDocument {
            filename: &stem,
            stored_name: filename,
            size_bytes: bytes.len() as u64,
            chunk_count: chunk_count as u64,
        })
        .await
        .map_err(IndexFailure::Storage)?;
    *ctx.document.write().await = Some(LoadedDocument {
        filename: stem,
        index: Bm25Index::new(chunks),
    });
    mirror_recent_chats(ctx, &[]).await;

    Ok(Some(chunk_count))
}

/// Answers a question about the current document and records the exchange.
pub async fn answer_query(ctx: &ApiContext, request: QueryRequest) -> Result<QueryResponse, ApiError> {
    debug!("handling query request");
    let query = request.query.trim();
    if query.is_empty() {
        warn!("empty query received");
        return Ok(QueryResponse {
            answer: EMPTY_QUERY_REPLY.to_string(),
        });
    }

    let context: Vec<String> = {
        let guard = ctx.document.read().await;
        let Some(document) = guard.as_ref() else {
            error!("no document processed");
            return Ok(QueryResponse {
                answer: NO_DOCUMENT_REPLY.to_string(),
            });
        };
        document
            .index
            .search(query, ctx.config.top_k)
            .into_iter()
            .map(|(chunk, _)| chunk.to_string())
            .collect()
    };
    debug!(chunks = context.len(), "retrieved context");

    let context_refs: Vec<&str> = context.iter().map(String::as_str).collect();
    let answer = finalize_answer(ctx.generator.generate(query, &context_refs).await);
    debug!(%answer, "query response");

    let chat = RecentChat {
        query: query.to_string(),
        response: answer.clone(),
        timestamp: Utc::now(),
    };
    ctx.storage
        .append_recent_chat(&chat, ctx.config.recent_chat_limit)
        .await
        .map_err(internal)?;
    let chats = ctx.storage.list_recent_chats().await.map_err(internal)?;
    mirror_recent_chats(ctx, &chats).await;

    Ok(QueryResponse { answer })
}

/// Everything a front end needs to render the landing page.
pub async fn page_state(ctx: &ApiContext, query: PageQuery) -> Result<PageState, ApiError> {
    let recent_chats = ctx.storage.list_recent_chats().await.map_err(internal)?;
    let current_filename = ctx.current_filename().await;

    if let Some(file) = query.file.as_deref() {
        error!(%file, "invalid page request with file parameter");
        return Ok(PageState {
            error: Some(INVALID_PAGE_REQUEST.to_string()),
            message: None,
            show_chat: false,
            recent_chats,
            current_filename,
        });
    }

    let show_chat = query.message.as_deref() == Some(UPLOAD_SUCCESS_MESSAGE);
    Ok(PageState {
        error: None,
        message: query.message,
        show_chat,
        recent_chats,
        current_filename,
    })
}

async fn mirror_recent_chats(ctx: &ApiContext, chats: &[RecentChat]) {
    let Some(path) = ctx.config.recent_chats_path.as_deref() else {
        return;
    };
    if let Err(err) = write_json(path, chats).await {
        warn!(path = %path.display(), error = %err, "failed to mirror recent chats");
    }
}

async fn write_json(path: &Path, chats: &[RecentChat]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(chats)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
