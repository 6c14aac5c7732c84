//! 决策模型客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / 脚本化）实现 LlmClient：propose 根据对话与工具声明给出下一条
//! assistant 消息；complete 为不带工具的纯文本补全（托管搜索模型使用）。

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::memory::{Message, WireToolCall};
use crate::tools::ToolDeclaration;

/// LLM 调用错误（超时、传输、响应无法解析）
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),
    #[error("LLM response has no choices")]
    EmptyResponse,
    #[error("LLM response could not be decoded: {0}")]
    InvalidResponse(String),
}

/// 模型提议的下一条 assistant 消息（线上格式）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tool_calls: Vec<WireToolCall>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(content: Option<String>, tool_calls: Vec<WireToolCall>) -> Self {
        Self { content, tool_calls }
    }
}

fn null_as_empty<'de, D>(d: D) -> Result<Vec<WireToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<WireToolCall>>::deserialize(d)?.unwrap_or_default())
}

/// 单次决策调用的选项
#[derive(Debug, Clone)]
pub struct DecisionOptions {
    /// 是否允许模型在一条消息里并行请求多个工具；编排层固定为 false
    pub parallel_tool_calls: bool,
}

impl Default for DecisionOptions {
    fn default() -> Self {
        Self {
            parallel_tool_calls: false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 提议下一条 assistant 消息
    async fn propose(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
        options: &DecisionOptions,
    ) -> Result<AssistantReply, LlmError>;

    /// 纯文本补全
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let reply = self.propose(messages, &[], &DecisionOptions::default()).await?;
        Ok(reply.content.unwrap_or_default())
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
