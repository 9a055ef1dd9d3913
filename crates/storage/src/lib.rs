use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::protocol::RecentChat;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub document_id: i64,
    pub filename: String,
    /// Name of the file in the upload folder.
    pub stored_name: String,
    pub size_bytes: u64,
    pub chunk_count: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument<'a> {
    pub filename: &'a str,
    pub stored_name: &'a str,
    pub size_bytes: u64,
    pub chunk_count: u64,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Records `document` as the current one and drops the chat history of the previous one.
    pub async fn replace_current_document(&self, document: NewDocument<'_>) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE documents SET is_current = 0 WHERE is_current = 1")
            .execute(&mut *tx)
            .await
            .context("failed to retire previous document")?;
        sqlx::query("DELETE FROM recent_chats")
            .execute(&mut *tx)
            .await
            .context("failed to reset recent chats")?;
        let rec = sqlx::query(
            "INSERT INTO documents (filename, stored_name, size_bytes, chunk_count, is_current, uploaded_at)
             VALUES (?, ?, ?, ?, 1, ?)
             RETURNING id",
        )
        .bind(document.filename)
        .bind(document.stored_name)
        .bind(document.size_bytes as i64)
        .bind(document.chunk_count as i64)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rec.get::<i64, _>(0))
    }

    pub async fn current_document(&self) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT id, filename, stored_name, size_bytes, chunk_count, uploaded_at
             FROM documents WHERE is_current = 1
             ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| StoredDocument {
            document_id: row.get::<i64, _>("id"),
            filename: row.get::<String, _>("filename"),
            stored_name: row.get::<String, _>("stored_name"),
            size_bytes: row.get::<i64, _>("size_bytes") as u64,
            chunk_count: row.get::<i64, _>("chunk_count") as u64,
            uploaded_at: row.get::<DateTime<Utc>, _>("uploaded_at"),
        }))
    }

    /// Appends a chat and keeps only the newest `keep` entries.
    pub async fn append_recent_chat(&self, chat: &RecentChat, keep: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO recent_chats (query, response, created_at) VALUES (?, ?, ?)")
            .bind(&chat.query)
            .bind(&chat.response)
            .bind(chat.timestamp)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM recent_chats WHERE id NOT IN
             (SELECT id FROM recent_chats ORDER BY id DESC LIMIT ?)",
        )
        .bind(keep as i64)
        .execute(&mut *tx)
        .await
        .context("failed to trim recent chats")?;
        tx.commit().await?;
        Ok(())
    }

    /// Oldest first.
    pub async fn list_recent_chats(&self) -> Result<Vec<RecentChat>> {
        let rows = sqlx::query("SELECT query, response, created_at FROM recent_chats ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| RecentChat {
                query: row.get::<String, _>("query"),
                response: row.get::<String, _>("response"),
                timestamp: row.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect())
    }

    pub async fn clear_recent_chats(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM recent_chats")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
