//! 编排过程事件：供 CLI 等前端展示回合进度、工具调用、观察与终止原因

use serde::Serialize;

use crate::core::TerminalReason;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 工具轮数更新（当前第几轮）
    RoundUpdate { round: usize, max_rounds: Option<usize> },
    /// 正在调用模型
    Thinking,
    /// 模型的文本（最终回答，或工具请求附带的说明）
    AssistantText { text: String },
    /// 调用工具
    ToolCall {
        call_id: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        call_id: String,
        tool: String,
        ok: bool,
        preview: String,
    },
    /// 回合结束后写入了检查点
    CheckpointSaved { session_id: String, messages: usize },
    /// 交互会话等待下一条用户输入
    AwaitingInput,
    Terminated { reason: TerminalReason },
    /// Token 使用统计（本次运行增量 + 累计）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        cumulative_total: u64,
    },
    Error { text: String },
}
