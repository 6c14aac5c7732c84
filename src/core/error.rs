//! 编排层错误
//!
//! 工具故障不在这里：它们是 ToolFailure 数据，写进日志给模型看。这里只放会终止一次运行、
//! 需要交给调用方处理的故障。

use thiserror::Error;

use crate::core::state::TransitionError;
use crate::llm::LlmError;
use crate::memory::{CheckpointError, LogError};

#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// 模型回复既不是最终回答也不是合法的工具请求；不重试
    #[error("malformed decision: {0}")]
    MalformedDecision(String),

    #[error("decision call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("checkpoint for session {session_id} cannot be resumed: {reason}")]
    CorruptCheckpoint { session_id: String, reason: String },

    #[error("invalid state transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("conversation log rejected message: {0}")]
    Log(#[from] LogError),
}

impl OrchestrationError {
    pub fn corrupt(session_id: &str, reason: impl ToString) -> Self {
        Self::CorruptCheckpoint {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        }
    }
}
