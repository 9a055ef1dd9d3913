use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Bot,
}

impl ChatRole {
    /// CSS-style class suffix used by front ends (`user-message`, `bot-message`).
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub role: ChatRole,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: ChatRole::User,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: ChatRole::Bot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Error,
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackFragment {
    pub kind: FeedbackKind,
    pub text: String,
    pub chat_visible: bool,
}

impl FeedbackFragment {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Error,
            text: text.into(),
            chat_visible: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == FeedbackKind::Message && self.text == crate::protocol::UPLOAD_SUCCESS_MESSAGE
    }
}
