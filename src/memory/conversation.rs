//! 对话日志：只追加的消息序列
//!
//! Message 的序列化形状与决策模型的线上格式一致（role / content / tool_calls / tool_call_id / name），
//! ConversationLog 在追加时校验「工具结果必须对应紧邻的上一条 assistant 消息发出的 call_id」。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// assistant 消息中的一次工具调用请求（线上格式，arguments 为 JSON 字符串）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl WireToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// 工具结果消息上的工具名
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// 请求工具的 assistant 消息；content 可为空
    pub fn assistant_with_calls(content: Option<String>, tool_calls: Vec<WireToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// 追加时违反日志不变量
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogError {
    #[error("tool result without tool_call_id")]
    MissingCallId,
    #[error("tool result for call '{0}' does not answer the preceding assistant message")]
    UnmatchedCallId(String),
    #[error("tool result for call '{0}' appended twice")]
    DuplicateResult(String),
    #[error("assistant message has duplicate call id '{0}'")]
    DuplicateCallId(String),
}

/// 对话日志：只能追加，不能重排或原地修改
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    /// 从快照恢复，逐条重放校验
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, LogError> {
        let mut log = Self::new();
        for m in messages {
            log.append(m)?;
        }
        Ok(log)
    }

    pub fn append(&mut self, msg: Message) -> Result<(), LogError> {
        match msg.role {
            Role::Tool => self.check_tool_result(&msg)?,
            Role::Assistant => {
                let mut seen = std::collections::HashSet::new();
                for call in &msg.tool_calls {
                    if !seen.insert(call.id.as_str()) {
                        return Err(LogError::DuplicateCallId(call.id.clone()));
                    }
                }
            }
            _ => {}
        }
        self.messages.push(msg);
        Ok(())
    }

    fn check_tool_result(&self, msg: &Message) -> Result<(), LogError> {
        let call_id = msg.tool_call_id.as_deref().ok_or(LogError::MissingCallId)?;
        let Some(origin) = self.pending_origin() else {
            return Err(LogError::UnmatchedCallId(call_id.to_string()));
        };
        if !origin.tool_calls.iter().any(|c| c.id == call_id) {
            return Err(LogError::UnmatchedCallId(call_id.to_string()));
        }
        let already = self
            .messages
            .iter()
            .rev()
            .take_while(|m| m.role == Role::Tool)
            .any(|m| m.tool_call_id.as_deref() == Some(call_id));
        if already {
            return Err(LogError::DuplicateResult(call_id.to_string()));
        }
        Ok(())
    }

    /// 紧邻的上一条 assistant 消息（中间只隔着工具结果）
    fn pending_origin(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role != Role::Tool)
            .filter(|m| m.requests_tools())
    }

    /// 最后一条请求工具的 assistant 消息中尚未得到结果的调用
    pub fn unanswered_calls(&self) -> Vec<&WireToolCall> {
        let Some(origin) = self.pending_origin() else {
            return Vec::new();
        };
        let answered: Vec<&str> = self
            .messages
            .iter()
            .rev()
            .take_while(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        origin
            .tool_calls
            .iter()
            .filter(|c| !answered.contains(&c.id.as_str()))
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 最近一条非空的 assistant 文本（迭代上限截断时作为部分结果）
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .filter_map(|m| m.content.as_deref())
            .find(|c| !c.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
