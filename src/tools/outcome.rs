//! 工具调用与结果：成功载荷或结构化失败
//!
//! 失败是数据而不是 Err：执行器把所有故障都归为 ToolFailure，序列化后与成功结果一样写入对话日志。

use serde::Serialize;
use serde_json::Value;

/// 工具失败类别（对模型可见）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ToolFailure {
    UnknownTool { error_message: String },
    InvalidArguments { error_message: String },
    HandlerFailed { error_message: String },
    TimedOut { error_message: String },
}

impl ToolFailure {
    pub fn unknown_tool(name: &str) -> Self {
        Self::UnknownTool {
            error_message: format!("Unknown tool: {name}"),
        }
    }

    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments {
            error_message: msg.into(),
        }
    }

    pub fn handler_failed(msg: impl Into<String>) -> Self {
        Self::HandlerFailed {
            error_message: msg.into(),
        }
    }

    pub fn timed_out(tool: &str, secs: u64) -> Self {
        Self::TimedOut {
            error_message: format!("{tool} did not finish within {secs}s"),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::UnknownTool { error_message }
            | Self::InvalidArguments { error_message }
            | Self::HandlerFailed { error_message }
            | Self::TimedOut { error_message } => error_message,
        }
    }

    /// 审计日志里的 outcome 字段
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::TimedOut { .. } => "timeout",
        }
    }
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

/// 单次调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// 文本或结构化载荷
    Success(Value),
    Failure(ToolFailure),
}

impl ToolOutcome {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Success(Value::String(s.into()))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// 写入 tool 消息的 content：字符串原样输出，其余为格式化 JSON
    pub fn to_content(&self) -> String {
        match self {
            Self::Success(Value::String(s)) => s.clone(),
            Self::Success(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            Self::Failure(f) => serde_json::to_string(f).unwrap_or_else(|_| f.to_string()),
        }
    }
}

impl From<Result<Value, ToolFailure>> for ToolOutcome {
    fn from(r: Result<Value, ToolFailure>) -> Self {
        match r {
            Ok(v) => Self::Success(v),
            Err(f) => Self::Failure(f),
        }
    }
}

/// 解析后的工具调用请求
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// 本轮内唯一
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// 与原调用关联的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}
