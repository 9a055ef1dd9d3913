//! Upload and chat interaction flow.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::{
    domain::{ChatMessage, FeedbackFragment},
    protocol::UPLOAD_SUCCESS_LOCATION,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
    chat::excess_messages,
    surface::UiSurface,
    transport::{DocumentApi, UploadForm},
};

pub const UPLOAD_FAILED_MESSAGE: &str = "Failed: Error uploading file.";
pub const QUERY_FAILED_MESSAGE: &str = "Error: Could not process query.";

const SUBMIT_KEY: &str = "Enter";

/// User actions the controller reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// The file input changed.
    FileSelected,
    /// The upload form was submitted.
    FormSubmitted(UploadForm),
    /// A key was pressed in the query field.
    KeyPressed { key: String },
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Upload,
    Query,
}

/// Marks a request as in flight and disables its control until dropped.
///
/// Dropping an upload guard also hides the loading indicator.
struct PendingGuard<'a, S: UiSurface> {
    flag: &'a AtomicBool,
    surface: &'a S,
    control: Control,
}

impl<'a, S: UiSurface> PendingGuard<'a, S> {
    fn acquire(flag: &'a AtomicBool, surface: &'a S, control: Control) -> Option<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let guard = Self {
            flag,
            surface,
            control,
        };
        guard.set_enabled(false);
        Some(guard)
    }

    fn set_enabled(&self, enabled: bool) {
        match self.control {
            Control::Upload => self.surface.set_upload_enabled(enabled),
            Control::Query => self.surface.set_query_enabled(enabled),
        }
    }
}

impl<S: UiSurface> Drop for PendingGuard<'_, S> {
    fn drop(&mut self) {
        if let Control::Upload = self.control {
            self.surface.set_loading(false);
        }
        self.set_enabled(true);
        self.flag.store(false, Ordering::Release);
    }
}

pub struct InteractionController<S, A> {
    surface: Arc<S>,
    api: Arc<A>,
    upload_pending: AtomicBool,
    query_pending: AtomicBool,
}

impl<S, A> InteractionController<S, A>
where
    S: UiSurface,
    A: DocumentApi,
{
    pub fn new(surface: Arc<S>, api: Arc<A>) -> Self {
        Self {
            surface,
            api,
            upload_pending: AtomicBool::new(false),
            query_pending: AtomicBool::new(false),
        }
    }

    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    pub fn upload_in_flight(&self) -> bool {
        self.upload_pending.load(Ordering::Acquire)
    }

    pub fn query_in_flight(&self) -> bool {
        self.query_pending.load(Ordering::Acquire)
    }

    /// Clears upload feedback and hides the chat panel.
    pub fn reset_feedback(&self) {
        debug!("resetting upload feedback");
        self.surface.remove_feedback();
        self.surface.set_chat_visible(false);
    }

    /// Sends the upload form and renders the outcome.
    ///
    /// Ignored while another upload is in flight.
    pub async fn submit_upload(&self, form: UploadForm) {
        let Some(_pending) =
            PendingGuard::acquire(&self.upload_pending, self.surface.as_ref(), Control::Upload)
        else {
            debug!("upload already in flight; ignoring submission");
            return;
        };

        info!(filename = %form.filename, size_bytes = form.bytes.len(), "submitting upload");
        self.surface.set_loading(true);
        match self.api.upload(form).await {
            Ok(outcome) => {
                debug!(status = ?outcome.status, "upload response received");
                self.surface.set_loading(false);
                self.render_feedback(outcome.into_fragment());
            }
            Err(err) => {
                warn!(error = %err, "upload failed");
                self.surface.set_loading(false);
                self.surface.set_chat_visible(false);
                self.surface.remove_feedback();
                self.surface
                    .show_feedback(&FeedbackFragment::error(UPLOAD_FAILED_MESSAGE));
            }
        }
    }

    fn render_feedback(&self, fragment: FeedbackFragment) {
        self.surface.remove_feedback();
        self.surface.show_feedback(&fragment);
        self.surface.set_chat_visible(fragment.chat_visible);
        if fragment.is_success() {
            info!(location = UPLOAD_SUCCESS_LOCATION, "upload succeeded; navigating");
            self.surface.navigate(UPLOAD_SUCCESS_LOCATION);
        }
    }

    /// Posts `text` as a question and appends the answer to the chat box.
    ///
    /// Blank input, or input arriving while a question is in flight, leaves
    /// the page untouched.
    pub async fn send_query(&self, text: &str) {
        let query = text.trim();
        if query.is_empty() {
            return;
        }
        let Some(_pending) =
            PendingGuard::acquire(&self.query_pending, self.surface.as_ref(), Control::Query)
        else {
            debug!("query already in flight; ignoring");
            return;
        };

        debug!(%query, "sending query");
        self.surface.append_message(&ChatMessage::user(query));
        self.surface.clear_query_input();

        match self.api.query(query).await {
            Ok(response) => {
                self.surface.append_message(&ChatMessage::bot(response.answer));
                for _ in 0..excess_messages(self.surface.message_count()) {
                    self.surface.remove_oldest_message();
                }
            }
            Err(err) => {
                warn!(error = %err, "query failed");
                self.surface
                    .append_message(&ChatMessage::bot(QUERY_FAILED_MESSAGE));
            }
        }
    }

    /// Runs the handler bound to `event` to completion.
    pub async fn handle_event(&self, event: UiEvent) {
        match event {
            UiEvent::FileSelected => self.reset_feedback(),
            UiEvent::FormSubmitted(form) => {
                if self.upload_in_flight() {
                    debug!("upload already in flight; ignoring submission");
                    return;
                }
                self.reset_feedback();
                self.submit_upload(form).await;
            }
            UiEvent::KeyPressed { key } if key == SUBMIT_KEY => {
                let text = self.surface.query_input();
                self.send_query(&text).await;
            }
            UiEvent::KeyPressed { .. } => {}
        }
    }
}

impl<S, A> InteractionController<S, A>
where
    S: UiSurface + 'static,
    A: DocumentApi + 'static,
{
    /// Starts reacting to `events` until the returned handle is shut down or
    /// dropped, or every sender is gone.
    ///
    /// Requests run concurrently with further event handling, so the page
    /// stays responsive while one is outstanding.
    pub fn bind(self: Arc<Self>, mut events: mpsc::Receiver<UiEvent>) -> ControllerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            UiEvent::FileSelected => self.reset_feedback(),
                            event => {
                                let controller = Arc::clone(&self);
                                in_flight.spawn(async move { controller.handle_event(event).await });
                            }
                        }
                    }
                }
            }
            debug!(in_flight = in_flight.len(), "controller unbound");
            in_flight.shutdown().await;
        });
        ControllerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Keeps a bound controller alive; dropping it tears the binding down.
pub struct ControllerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Stops event handling and aborts outstanding requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
