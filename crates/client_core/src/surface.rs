//! The page elements the controller drives.

use std::sync::{Mutex, MutexGuard, PoisonError};

use shared::domain::{ChatMessage, FeedbackFragment};

use crate::chat::GREETING;

/// Handles onto the upload-and-chat page: the chat box, the query input, the
/// upload area with its loading indicator and feedback slot, and the chat
/// panel. Implementations are shared across tasks and mutate through `&self`.
pub trait UiSurface: Send + Sync {
    fn append_message(&self, message: &ChatMessage);
    fn message_count(&self) -> usize;
    fn remove_oldest_message(&self);

    fn query_input(&self) -> String;
    fn clear_query_input(&self);

    fn set_loading(&self, visible: bool);
    fn set_chat_visible(&self, visible: bool);

    /// Removes the error or message element from the upload area, if any.
    fn remove_feedback(&self);
    /// Inserts `fragment` into the upload area, right after the loading indicator.
    fn show_feedback(&self, fragment: &FeedbackFragment);

    fn navigate(&self, location: &str);

    fn set_upload_enabled(&self, enabled: bool);
    fn set_query_enabled(&self, enabled: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceState {
    pub messages: Vec<ChatMessage>,
    pub query_input: String,
    pub loading: bool,
    pub chat_visible: bool,
    pub feedback: Vec<FeedbackFragment>,
    pub navigations: Vec<String>,
    pub upload_enabled: bool,
    pub query_enabled: bool,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            query_input: String::new(),
            loading: false,
            chat_visible: false,
            feedback: Vec::new(),
            navigations: Vec::new(),
            upload_enabled: true,
            query_enabled: true,
        }
    }
}

/// In-memory page model.
#[derive(Debug, Default)]
pub struct MemorySurface {
    state: Mutex<SurfaceState>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page whose chat box already holds the greeting.
    pub fn with_greeting() -> Self {
        let surface = Self::new();
        surface.lock().messages.push(ChatMessage::bot(GREETING));
        surface
    }

    pub fn set_query_input(&self, text: impl Into<String>) {
        self.lock().query_input = text.into();
    }

    pub fn snapshot(&self) -> SurfaceState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UiSurface for MemorySurface {
    fn append_message(&self, message: &ChatMessage) {
        self.lock().messages.push(message.clone());
    }

    fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    fn remove_oldest_message(&self) {
        let mut state = self.lock();
        if !state.messages.is_empty() {
            state.messages.remove(0);
        }
    }

    fn query_input(&self) -> String {
        self.lock().query_input.clone()
    }

    fn clear_query_input(&self) {
        self.lock().query_input.clear();
    }

    fn set_loading(&self, visible: bool) {
        self.lock().loading = visible;
    }

    fn set_chat_visible(&self, visible: bool) {
        self.lock().chat_visible = visible;
    }

    fn remove_feedback(&self) {
        // Mirrors a single-element query: only the first match goes.
        let mut state = self.lock();
        if !state.feedback.is_empty() {
            state.feedback.remove(0);
        }
    }

    fn show_feedback(&self, fragment: &FeedbackFragment) {
        self.lock().feedback.push(fragment.clone());
    }

    fn navigate(&self, location: &str) {
        self.lock().navigations.push(location.to_string());
    }

    fn set_upload_enabled(&self, enabled: bool) {
        self.lock().upload_enabled = enabled;
    }

    fn set_query_enabled(&self, enabled: bool) {
        self.lock().query_enabled = enabled;
    }
}
