//! 编排状态机
//!
//! 纯函数 transition(state, ctx, event)：不做 I/O，只根据当前状态、终止策略与事件给出下一状态。
//! 编排器负责执行副作用（调用模型、执行工具、写检查点），再把结果作为事件喂回来。
//!
//! 计数规则：一次 Deciding -> Executing 记为一轮；工具结果全部写入后若已达上限则终止，
//! 因此在上限 N 下轮数永远不超过 N。哨兵检查先于上限检查。

use serde::Serialize;
use thiserror::Error;

use crate::memory::{ConversationLog, Role};

/// 两种终止策略都未配置时的兜底轮数上限
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminalReason {
    /// 非交互会话中模型给出最终回答
    Final { content: String },
    /// 工具结果中出现了哨兵工具
    SentinelInvoked,
    /// 达到轮数上限；partial 为最近一条 assistant 文本
    IterationCapReached { partial: Option<String> },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    Deciding,
    Executing,
    AwaitingInput,
    Terminal(TerminalReason),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Terminal(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoopState::Deciding => "deciding",
            LoopState::Executing => "executing",
            LoopState::AwaitingInput => "awaiting_input",
            LoopState::Terminal(_) => "terminal",
        }
    }
}

/// 终止策略：轮数上限与哨兵终止，可同时启用
///
/// sentinel 决定是否向模型提供哨兵工具；哨兵结果一旦出现总会终止，与此标志和上限无关。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    max_tool_rounds: Option<usize>,
    sentinel: bool,
}

impl TerminationPolicy {
    /// max_tool_rounds 为 0 视为不设上限；两者都关闭时退回默认上限
    pub fn new(max_tool_rounds: Option<usize>, sentinel: bool) -> Self {
        let cap = max_tool_rounds.filter(|n| *n > 0);
        let cap = if cap.is_none() && !sentinel {
            Some(DEFAULT_MAX_TOOL_ROUNDS)
        } else {
            cap
        };
        Self {
            max_tool_rounds: cap,
            sentinel,
        }
    }

    pub fn capped(n: usize) -> Self {
        Self::new(Some(n), false)
    }

    pub fn sentinel_only() -> Self {
        Self::new(None, true)
    }

    pub fn max_tool_rounds(&self) -> Option<usize> {
        self.max_tool_rounds
    }

    pub fn sentinel(&self) -> bool {
        self.sentinel
    }
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self::new(None, false)
    }
}

/// 状态机输入
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 模型给出最终回答（已写入日志）
    FinalAnswer { content: String },
    /// 模型请求工具（已写入日志）
    ToolsRequested { count: usize },
    /// 本轮全部工具结果已写入
    ToolsCompleted { sentinel_invoked: bool },
    /// 调用方追加了 user 消息
    UserInput,
    Cancel,
}

/// transition 的只读上下文
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub policy: TerminationPolicy,
    pub interactive: bool,
    /// 本次运行已完成的 Deciding -> Executing 轮数
    pub rounds: usize,
    /// 截止目前最近一条 assistant 文本，用于上限终止时的部分结果
    pub last_assistant_text: Option<String>,
}

impl LoopContext {
    pub fn new(policy: TerminationPolicy, interactive: bool) -> Self {
        Self {
            policy,
            interactive,
            rounds: 0,
            last_assistant_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub state: LoopState,
    pub rounds: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("session already terminated")]
    AlreadyTerminal,
    #[error("event {event} is not valid in state {state}")]
    Invalid { state: &'static str, event: String },
}

pub fn transition(
    state: &LoopState,
    ctx: &LoopContext,
    event: LoopEvent,
) -> Result<TransitionResult, TransitionError> {
    let stay = |state: LoopState| TransitionResult {
        state,
        rounds: ctx.rounds,
    };

    match (state, event) {
        (LoopState::Terminal(_), _) => Err(TransitionError::AlreadyTerminal),

        (_, LoopEvent::Cancel) => Ok(stay(LoopState::Terminal(TerminalReason::Cancelled))),

        (LoopState::Deciding, LoopEvent::FinalAnswer { content }) => {
            if ctx.interactive {
                Ok(stay(LoopState::AwaitingInput))
            } else {
                Ok(stay(LoopState::Terminal(TerminalReason::Final { content })))
            }
        }

        (LoopState::Deciding, LoopEvent::ToolsRequested { count }) if count > 0 => Ok(TransitionResult {
            state: LoopState::Executing,
            rounds: ctx.rounds + 1,
        }),

        (LoopState::Executing, LoopEvent::ToolsCompleted { sentinel_invoked }) => {
            if sentinel_invoked {
                return Ok(stay(LoopState::Terminal(TerminalReason::SentinelInvoked)));
            }
            match ctx.policy.max_tool_rounds() {
                Some(cap) if ctx.rounds >= cap => Ok(stay(LoopState::Terminal(
                    TerminalReason::IterationCapReached {
                        partial: ctx.last_assistant_text.clone(),
                    },
                ))),
                _ => Ok(stay(LoopState::Deciding)),
            }
        }

        (LoopState::AwaitingInput, LoopEvent::UserInput) => Ok(stay(LoopState::Deciding)),

        (state, event) => Err(TransitionError::Invalid {
            state: state.name(),
            event: format!("{event:?}"),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResumeError {
    #[error("log ends with an assistant message whose tool calls were never answered")]
    UnansweredCalls,
    #[error("log is empty")]
    Empty,
}

/// 从日志推断恢复后的状态
///
/// - 末尾的工具结果中有哨兵：终止（与上限无关）
/// - 末尾是 user 或工具结果：重新进入 Deciding
/// - 末尾是最终回答或只有 system：交互会话等待输入，否则以最终回答终止
/// - 末尾是尚未得到结果的工具请求：日志不完整
pub fn resume_state(
    log: &ConversationLog,
    sentinel: Option<&str>,
    interactive: bool,
) -> Result<LoopState, ResumeError> {
    let last = log.last().ok_or(ResumeError::Empty)?;
    match last.role {
        Role::Tool => {
            let sentinel_answered = sentinel.is_some()
                && log
                    .messages()
                    .iter()
                    .rev()
                    .take_while(|m| m.role == Role::Tool)
                    .any(|m| m.tool_name.as_deref() == sentinel);
            if sentinel_answered {
                Ok(LoopState::Terminal(TerminalReason::SentinelInvoked))
            } else if log.unanswered_calls().is_empty() {
                Ok(LoopState::Deciding)
            } else {
                Err(ResumeError::UnansweredCalls)
            }
        }
        Role::User => Ok(LoopState::Deciding),
        Role::Assistant if last.requests_tools() => Err(ResumeError::UnansweredCalls),
        Role::Assistant | Role::System => {
            if interactive {
                Ok(LoopState::AwaitingInput)
            } else {
                Ok(LoopState::Terminal(TerminalReason::Final {
                    content: last.text().to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Message, WireToolCall};

    fn ctx(policy: TerminationPolicy, interactive: bool, rounds: usize) -> LoopContext {
        LoopContext {
            policy,
            interactive,
            rounds,
            last_assistant_text: Some("partial".into()),
        }
    }

    #[test]
    fn test_final_answer_routes_by_mode() {
        let final_answer = LoopEvent::FinalAnswer {
            content: "done".into(),
        };
        let r = transition(&LoopState::Deciding, &ctx(TerminationPolicy::default(), false, 0), final_answer.clone())
            .unwrap();
        assert_eq!(
            r.state,
            LoopState::Terminal(TerminalReason::Final {
                content: "done".into()
            })
        );
        let r = transition(&LoopState::Deciding, &ctx(TerminationPolicy::default(), true, 0), final_answer).unwrap();
        assert_eq!(r.state, LoopState::AwaitingInput);
    }

    #[test]
    fn test_round_trip_counts_and_cap() {
        let policy = TerminationPolicy::capped(2);
        let r = transition(&LoopState::Deciding, &ctx(policy, false, 1), LoopEvent::ToolsRequested { count: 1 }).unwrap();
        assert_eq!(r, TransitionResult { state: LoopState::Executing, rounds: 2 });

        let r = transition(
            &LoopState::Executing,
            &ctx(policy, false, 2),
            LoopEvent::ToolsCompleted { sentinel_invoked: false },
        )
        .unwrap();
        assert_eq!(
            r.state,
            LoopState::Terminal(TerminalReason::IterationCapReached {
                partial: Some("partial".into())
            })
        );

        let r = transition(
            &LoopState::Executing,
            &ctx(policy, false, 1),
            LoopEvent::ToolsCompleted { sentinel_invoked: false },
        )
        .unwrap();
        assert_eq!(r.state, LoopState::Deciding);
    }

    #[test]
    fn test_sentinel_wins_over_cap() {
        let policy = TerminationPolicy::new(Some(1), true);
        let r = transition(
            &LoopState::Executing,
            &ctx(policy, true, 1),
            LoopEvent::ToolsCompleted { sentinel_invoked: true },
        )
        .unwrap();
        assert_eq!(r.state, LoopState::Terminal(TerminalReason::SentinelInvoked));

        let r = transition(
            &LoopState::Executing,
            &ctx(TerminationPolicy::capped(5), false, 1),
            LoopEvent::ToolsCompleted { sentinel_invoked: true },
        )
        .unwrap();
        assert_eq!(r.state, LoopState::Terminal(TerminalReason::SentinelInvoked));
    }

    #[test]
    fn test_policy_falls_back_to_default_cap() {
        assert_eq!(TerminationPolicy::new(None, false).max_tool_rounds(), Some(DEFAULT_MAX_TOOL_ROUNDS));
        assert_eq!(TerminationPolicy::new(Some(0), false).max_tool_rounds(), Some(DEFAULT_MAX_TOOL_ROUNDS));
        assert_eq!(TerminationPolicy::sentinel_only().max_tool_rounds(), None);
        assert_eq!(TerminationPolicy::new(Some(3), true).max_tool_rounds(), Some(3));
    }

    #[test]
    fn test_invalid_events_are_rejected() {
        let c = ctx(TerminationPolicy::default(), true, 0);
        assert!(matches!(
            transition(&LoopState::Deciding, &c, LoopEvent::UserInput),
            Err(TransitionError::Invalid { .. })
        ));
        assert!(matches!(
            transition(&LoopState::Deciding, &c, LoopEvent::ToolsRequested { count: 0 }),
            Err(TransitionError::Invalid { .. })
        ));
        assert_eq!(
            transition(&LoopState::Terminal(TerminalReason::Cancelled), &c, LoopEvent::Cancel),
            Err(TransitionError::AlreadyTerminal)
        );
        let r = transition(&LoopState::AwaitingInput, &c, LoopEvent::Cancel).unwrap();
        assert_eq!(r.state, LoopState::Terminal(TerminalReason::Cancelled));
    }

    fn log_with_tool_result(tool: &str) -> ConversationLog {
        let mut log = ConversationLog::with_system("sys");
        log.append(Message::user("bye")).unwrap();
        log.append(Message::assistant_with_calls(None, vec![WireToolCall::function("c1", tool, "{}")]))
            .unwrap();
        log.append(Message::tool_result("c1", tool, "")).unwrap();
        log
    }

    #[test]
    fn test_resume_state_from_log() {
        let log = log_with_tool_result("exit_program");
        assert_eq!(
            resume_state(&log, Some("exit_program"), true),
            Ok(LoopState::Terminal(TerminalReason::SentinelInvoked))
        );
        let log = log_with_tool_result("select_topics_from_db");
        assert_eq!(resume_state(&log, Some("exit_program"), true), Ok(LoopState::Deciding));

        let log = ConversationLog::with_system("sys");
        assert_eq!(resume_state(&log, None, true), Ok(LoopState::AwaitingInput));

        let mut log = ConversationLog::with_system("sys");
        log.append(Message::user("q")).unwrap();
        log.append(Message::assistant_with_calls(None, vec![WireToolCall::function("c1", "x", "{}")]))
            .unwrap();
        assert_eq!(resume_state(&log, None, false), Err(ResumeError::UnansweredCalls));

        assert_eq!(resume_state(&ConversationLog::new(), None, false), Err(ResumeError::Empty));
    }
}
