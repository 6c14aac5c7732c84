//! SQLite 检查点：表 session_checkpoints(session_id PK, snapshot JSON, updated_at)
//!
//! rusqlite 是同步的，所有语句经 spawn_blocking 执行。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::checkpoint::{validate_session_id, CheckpointError, CheckpointStore, SessionSnapshot};

const CHECKPOINT_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS session_checkpoints (
    session_id TEXT PRIMARY KEY,
    snapshot TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CheckpointError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CheckpointError> {
        conn.execute_batch(CHECKPOINT_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CheckpointError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CheckpointError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&guard)
        })
        .await
        .map_err(|e| CheckpointError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), CheckpointError> {
        validate_session_id(&snapshot.session_id)?;
        let id = snapshot.session_id.clone();
        let body = serde_json::to_string(snapshot)?;
        let updated_at = snapshot.updated_at.to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO session_checkpoints (session_id, snapshot, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET snapshot = excluded.snapshot, updated_at = excluded.updated_at",
                params![id, body, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, session_id: &str) -> Result<SessionSnapshot, CheckpointError> {
        let id = session_id.to_string();
        let body: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT snapshot FROM session_checkpoints WHERE session_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Err(CheckpointError::NotFound(session_id.to_string())),
        }
    }

    async fn clear(&self, session_id: &str) -> Result<(), CheckpointError> {
        let id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM session_checkpoints WHERE session_id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}
