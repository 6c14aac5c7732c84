//! 会话检查点
//!
//! 快照 = 会话 ID + 对话日志消息 + 更新时间。编排器每完成一个回合调用一次 save，
//! 恢复时 load 快照并重建 ConversationLog（重放校验）。同一会话 ID 同时只能有一个写者，由调用方保证。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::{ConversationLog, LogError, Message};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint for session {0}")]
    NotFound(String),
    #[error("invalid session id {0:?}")]
    InvalidSessionId(String),
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("checkpoint database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("checkpoint task failed: {0}")]
    Task(String),
}

/// 可序列化的会话快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn capture(session_id: &str, log: &ConversationLog) -> Self {
        Self {
            session_id: session_id.to_string(),
            messages: log.messages().to_vec(),
            updated_at: Utc::now(),
        }
    }

    /// 重建对话日志；快照被篡改或截断时返回 LogError
    pub fn into_log(self) -> Result<ConversationLog, LogError> {
        ConversationLog::from_messages(self.messages)
    }
}

/// 会话 ID 只允许字母数字与 `-` `_` `.`，用于文件名与主键
pub fn validate_session_id(session_id: &str) -> Result<(), CheckpointError> {
    let ok = !session_id.is_empty()
        && session_id.len() <= 128
        && !session_id.starts_with('.')
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CheckpointError::InvalidSessionId(session_id.to_string()))
    }
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 覆盖写入会话快照
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), CheckpointError>;

    /// 读取快照；不存在时返回 NotFound
    async fn load(&self, session_id: &str) -> Result<SessionSnapshot, CheckpointError>;

    /// 删除快照；不存在时视为成功
    async fn clear(&self, session_id: &str) -> Result<(), CheckpointError>;
}

/// 内存检查点（测试与临时会话）
#[derive(Default)]
pub struct MemoryCheckpointStore {
    snapshots: RwLock<HashMap<String, SessionSnapshot>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), CheckpointError> {
        validate_session_id(&snapshot.session_id)?;
        self.snapshots
            .write()
            .await
            .insert(snapshot.session_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<SessionSnapshot, CheckpointError> {
        self.snapshots
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(session_id.to_string()))
    }

    async fn clear(&self, session_id: &str) -> Result<(), CheckpointError> {
        self.snapshots.write().await.remove(session_id);
        Ok(())
    }
}
