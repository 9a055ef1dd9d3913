use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use client_core::{
    chat::GREETING, HttpDocumentApi, InteractionController, MemorySurface, UiEvent, UiSurface,
    UploadForm,
};
use shared::{
    domain::{ChatMessage, ChatRole, FeedbackFragment, FeedbackKind},
    protocol::{PageState, UPLOAD_SUCCESS_LOCATION, UPLOAD_SUCCESS_MESSAGE},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server_url: String,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

/// Prints page changes to the terminal and forwards navigations to the main loop.
struct TerminalSurface {
    page: MemorySurface,
    navigations: mpsc::UnboundedSender<String>,
}

impl UiSurface for TerminalSurface {
    fn append_message(&self, message: &ChatMessage) {
        if message.role == ChatRole::Bot {
            println!("bot> {}", message.text);
        }
        self.page.append_message(message);
    }

    fn message_count(&self) -> usize {
        self.page.message_count()
    }

    fn remove_oldest_message(&self) {
        self.page.remove_oldest_message();
    }

    fn query_input(&self) -> String {
        self.page.query_input()
    }

    fn clear_query_input(&self) {
        self.page.clear_query_input();
    }

    fn set_loading(&self, visible: bool) {
        if visible {
            println!("uploading...");
        }
        self.page.set_loading(visible);
    }

    fn set_chat_visible(&self, visible: bool) {
        self.page.set_chat_visible(visible);
    }

    fn remove_feedback(&self) {
        self.page.remove_feedback();
    }

    fn show_feedback(&self, fragment: &FeedbackFragment) {
        match fragment.kind {
            FeedbackKind::Error => println!("[error] {}", fragment.text),
            FeedbackKind::Message => println!("[message] {}", fragment.text),
        }
        self.page.show_feedback(fragment);
    }

    fn navigate(&self, location: &str) {
        self.page.navigate(location);
        let _ = self.navigations.send(location.to_string());
    }

    fn set_upload_enabled(&self, enabled: bool) {
        self.page.set_upload_enabled(enabled);
    }

    fn set_query_enabled(&self, enabled: bool) {
        self.page.set_query_enabled(enabled);
    }
}

fn print_page(page: &PageState) {
    if let Some(error) = &page.error {
        println!("[error] {error}");
    }
    if let Some(filename) = &page.current_filename {
        println!("current document: {filename}");
    }
    for chat in &page.recent_chats {
        println!("  recent: {} -> {}", chat.query, chat.response);
    }
    if page.show_chat {
        println!("bot> {GREETING}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();

    let api = Arc::new(HttpDocumentApi::with_timeout(
        &args.server_url,
        Duration::from_secs(args.timeout_secs),
    )?);
    match api.page_state(None).await {
        Ok(page) => print_page(&page),
        Err(err) => warn!(error = %err, "could not load page state"),
    }
    println!("commands: :upload <path>, :quit; any other line is sent as a question");

    let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();
    let surface = Arc::new(TerminalSurface {
        page: MemorySurface::with_greeting(),
        navigations: nav_tx,
    });
    let controller = Arc::new(InteractionController::new(
        Arc::clone(&surface),
        Arc::clone(&api),
    ));
    let (events, rx) = mpsc::channel(16);
    let handle = controller.bind(rx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == ":quit" {
                    break;
                }
                if let Some(path) = line.strip_prefix(":upload ") {
                    let form = match UploadForm::from_path(path.trim()).await {
                        Ok(form) => form,
                        Err(err) => {
                            println!("[error] {err}");
                            continue;
                        }
                    };
                    events.send(UiEvent::FileSelected).await?;
                    events.send(UiEvent::FormSubmitted(form)).await?;
                } else {
                    surface.page.set_query_input(line);
                    events
                        .send(UiEvent::KeyPressed { key: "Enter".to_string() })
                        .await?;
                }
            }
            Some(location) = nav_rx.recv() => {
                let message = (location == UPLOAD_SUCCESS_LOCATION).then_some(UPLOAD_SUCCESS_MESSAGE);
                match api.page_state(message).await {
                    Ok(page) => print_page(&page),
                    Err(err) => warn!(error = %err, %location, "could not reload page"),
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
