use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::protocol::RecentChat;
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/docchat.db")]
    database_url: String,
    /// Folder holding the server's `chats.json` mirror.
    #[arg(long, default_value = "recent_chats")]
    recent_chats_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored question and answer history, oldest first.
    RecentChats {
        #[arg(long)]
        json: bool,
    },
    /// Delete the stored history and empty its JSON mirror.
    ClearChats,
    /// Show the document currently indexed by the server.
    CurrentDocument,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::RecentChats { json } => {
            let chats = storage.list_recent_chats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&chats)?);
            } else if chats.is_empty() {
                println!("no recent chats");
            } else {
                chats.iter().for_each(print_chat);
            }
        }
        Command::ClearChats => {
            let mirror = cli.recent_chats_dir.join("chats.json");
            let removed = clear_chats(&storage, &mirror).await?;
            println!("removed {removed} recent chats");
        }
        Command::CurrentDocument => match storage.current_document().await? {
            Some(document) => println!(
                "document_id={} filename={} size_bytes={} chunks={} uploaded_at={}",
                document.document_id,
                document.filename,
                document.size_bytes,
                document.chunk_count,
                document.uploaded_at.to_rfc3339()
            ),
            None => println!("no document uploaded"),
        },
    }

    Ok(())
}

async fn clear_chats(storage: &Storage, mirror: &Path) -> Result<u64> {
    let removed = storage.clear_recent_chats().await?;
    if let Some(parent) = mirror.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(&Vec::<RecentChat>::new())?;
    tokio::fs::write(mirror, body)
        .await
        .with_context(|| format!("failed to rewrite '{}'", mirror.display()))?;
    Ok(removed)
}

fn print_chat(chat: &RecentChat) {
    println!("[{}] Q: {}", chat.timestamp.to_rfc3339(), chat.query);
    println!("    A: {}", chat.response);
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
