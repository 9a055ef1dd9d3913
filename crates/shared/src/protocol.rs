use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FeedbackFragment, FeedbackKind};

/// Message text the server returns once a document has been indexed.
pub const UPLOAD_SUCCESS_MESSAGE: &str = "success";
/// Location the client navigates to after a successful upload.
pub const UPLOAD_SUCCESS_LOCATION: &str = "/?message=success";

pub fn upload_route() -> &'static str {
    "/"
}

pub fn query_route() -> &'static str {
    "/query"
}

pub fn health_route() -> &'static str {
    "/healthz"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Error,
    Message,
}

/// Structured reply of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub status: UploadStatus,
    pub message: String,
    pub chat_visible: bool,
}

impl UploadOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: UploadStatus::Error,
            message: message.into(),
            chat_visible: false,
        }
    }

    pub fn success() -> Self {
        Self {
            status: UploadStatus::Message,
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            chat_visible: true,
        }
    }

    pub fn into_fragment(self) -> FeedbackFragment {
        FeedbackFragment {
            kind: match self.status {
                UploadStatus::Error => FeedbackKind::Error,
                UploadStatus::Message => FeedbackKind::Message,
            },
            text: self.message,
            chat_visible: self.chat_visible,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentChat {
    pub query: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

/// State a front end needs to render the landing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub show_chat: bool,
    pub recent_chats: Vec<RecentChat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_filename: Option<String>,
}
