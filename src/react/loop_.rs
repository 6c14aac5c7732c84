//! 编排主循环
//!
//! Deciding -> (Final | ToolRequest) -> Executing -> Deciding ... 直到最终回答、哨兵工具或轮数上限。
//! 状态转移全部交给纯函数 core::transition；这里只负责副作用：调用模型、顺序执行工具、
//! 追加日志、每个完成的回合写一次检查点、推送进度事件。
//!
//! 取消只在进入 Deciding 前检查：一次「决策 + 工具执行」作为整体完成，日志不会停在未应答的工具请求上。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{
    resume_state, transition, LoopContext, LoopEvent, LoopState, OrchestrationError, TerminalReason,
    TerminationPolicy,
};
use crate::memory::{CheckpointError, CheckpointStore, ConversationLog, Message, SessionSnapshot};
use crate::react::planner::{parse_wire_call, Decision, DecisionStep};
use crate::react::ReactEvent;
use crate::tools::{ToolCall, ToolDeclaration, ToolExecutor};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 一个会话：ID、对话日志与当前状态
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    log: ConversationLog,
    state: LoopState,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }
}

/// run 返回时的停止点
#[derive(Debug, Clone, PartialEq)]
pub enum RunStop {
    /// 交互会话：控制权交还调用方，reply 为刚给出的回答
    AwaitingInput { reply: Option<String> },
    Terminated(TerminalReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub stop: RunStop,
    /// 本次运行完成的工具轮数
    pub rounds: usize,
}

pub struct Orchestrator {
    decision: DecisionStep,
    executor: ToolExecutor,
    declarations: Vec<ToolDeclaration>,
    policy: TerminationPolicy,
    interactive: bool,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl Orchestrator {
    pub fn new(decision: DecisionStep, executor: ToolExecutor, policy: TerminationPolicy, interactive: bool) -> Self {
        let declarations = executor.registry().declarations();
        Self {
            decision,
            executor,
            declarations,
            policy,
            interactive,
            checkpoint: None,
            event_tx: None,
        }
    }

    pub fn with_checkpoint(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint = Some(store);
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn policy(&self) -> TerminationPolicy {
        self.policy
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// 注册表中的哨兵工具名；它的结果总会终止会话
    fn sentinel_name(&self) -> Option<&'static str> {
        self.executor.registry().sentinel().map(|k| k.name())
    }

    /// 新会话：日志只有 system（和可选的首条 user 消息）
    pub fn start_session(
        &self,
        session_id: impl Into<String>,
        system_prompt: impl Into<String>,
        initial_input: Option<String>,
    ) -> Result<Session, OrchestrationError> {
        let mut log = ConversationLog::with_system(system_prompt);
        let state = match initial_input {
            Some(input) => {
                log.append(Message::user(input))?;
                LoopState::Deciding
            }
            None if self.interactive => LoopState::AwaitingInput,
            None => LoopState::Deciding,
        };
        Ok(Session {
            id: session_id.into(),
            log,
            state,
        })
    }

    /// 从检查点恢复；没有检查点时返回 None
    pub async fn resume_session(&self, session_id: &str) -> Result<Option<Session>, OrchestrationError> {
        let Some(store) = &self.checkpoint else {
            return Ok(None);
        };
        let snapshot = match store.load(session_id).await {
            Ok(s) => s,
            Err(CheckpointError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let log = snapshot
            .into_log()
            .map_err(|e| OrchestrationError::corrupt(session_id, e))?;
        let state = resume_state(&log, self.sentinel_name(), self.interactive)
            .map_err(|e| OrchestrationError::corrupt(session_id, e))?;
        tracing::info!(session_id, messages = log.len(), state = state.name(), "session resumed");
        Ok(Some(Session {
            id: session_id.to_string(),
            log,
            state,
        }))
    }

    /// 有检查点则恢复，否则新建
    pub async fn resume_or_start(
        &self,
        session_id: &str,
        system_prompt: &str,
        initial_input: Option<String>,
    ) -> Result<Session, OrchestrationError> {
        match self.resume_session(session_id).await? {
            Some(mut session) => {
                if let Some(input) = initial_input {
                    if session.state == LoopState::AwaitingInput {
                        self.submit_user_input(&mut session, input)?;
                    } else {
                        tracing::warn!(session_id, state = session.state.name(), "resumed session is not waiting for input, input ignored");
                    }
                }
                Ok(session)
            }
            None => self.start_session(session_id, system_prompt, initial_input),
        }
    }

    /// AwaitingInput 时追加用户消息并回到 Deciding
    pub fn submit_user_input(&self, session: &mut Session, input: impl Into<String>) -> Result<(), OrchestrationError> {
        let ctx = LoopContext::new(self.policy, self.interactive);
        let next = transition(&session.state, &ctx, LoopEvent::UserInput)?;
        session.log.append(Message::user(input))?;
        session.state = next.state;
        Ok(())
    }

    /// 调用方请求结束会话（如交互模式下输入 EOF）
    pub fn cancel_session(&self, session: &mut Session) -> Result<(), OrchestrationError> {
        let ctx = LoopContext::new(self.policy, self.interactive);
        session.state = transition(&session.state, &ctx, LoopEvent::Cancel)?.state;
        self.send(ReactEvent::Terminated {
            reason: TerminalReason::Cancelled,
        });
        Ok(())
    }

    /// 驱动会话直到等待输入或终止
    pub async fn run(
        &self,
        session: &mut Session,
        cancel_token: &CancellationToken,
    ) -> Result<RunOutcome, OrchestrationError> {
        let mut ctx = LoopContext::new(self.policy, self.interactive);
        ctx.last_assistant_text = session.log.last_assistant_text().map(String::from);
        let (init_prompt, init_completion, _) = self.decision.token_usage();

        let result = self.drive(session, &mut ctx, cancel_token).await;

        let (prompt, completion, total) = self.decision.token_usage();
        self.send(ReactEvent::TokenUsage {
            prompt_tokens: prompt.saturating_sub(init_prompt),
            completion_tokens: completion.saturating_sub(init_completion),
            cumulative_total: total,
        });

        match result {
            Ok(stop) => Ok(RunOutcome {
                stop,
                rounds: ctx.rounds,
            }),
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "run failed");
                self.send(ReactEvent::Error { text: e.to_string() });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        ctx: &mut LoopContext,
        cancel_token: &CancellationToken,
    ) -> Result<RunStop, OrchestrationError> {
        loop {
            let current = session.state.clone();
            let event = match &current {
                LoopState::Terminal(reason) => {
                    tracing::info!(session_id = %session.id, reason = ?reason, rounds = ctx.rounds, "session terminated");
                    self.send(ReactEvent::Terminated { reason: reason.clone() });
                    return Ok(RunStop::Terminated(reason.clone()));
                }
                LoopState::AwaitingInput => {
                    self.send(ReactEvent::AwaitingInput);
                    return Ok(RunStop::AwaitingInput {
                        reply: session.log.last_assistant_text().map(String::from),
                    });
                }
                LoopState::Deciding if cancel_token.is_cancelled() => LoopEvent::Cancel,
                LoopState::Deciding => self.decide(session, ctx).await?,
                LoopState::Executing => self.execute(session).await?,
            };

            let next = transition(&session.state, ctx, event)?;
            tracing::debug!(from = session.state.name(), to = next.state.name(), rounds = next.rounds, "transition");
            ctx.rounds = next.rounds;
            if next.state == LoopState::Executing {
                self.send(ReactEvent::RoundUpdate {
                    round: ctx.rounds,
                    max_rounds: self.policy.max_tool_rounds(),
                });
            }
            session.state = next.state;
        }
    }

    /// Deciding：调用模型，把回复写入日志，返回对应事件
    async fn decide(&self, session: &mut Session, ctx: &mut LoopContext) -> Result<LoopEvent, OrchestrationError> {
        self.send(ReactEvent::Thinking);
        let decision = self.decision.decide(&session.log, &self.declarations).await?;
        match decision {
            Decision::Final { content, message } => {
                session.log.append(message)?;
                self.send(ReactEvent::AssistantText { text: content.clone() });
                ctx.last_assistant_text = Some(content.clone());
                self.save_checkpoint(session).await?;
                Ok(LoopEvent::FinalAnswer { content })
            }
            Decision::ToolRequest { calls, message } => {
                if calls.len() > 1 {
                    tracing::warn!(count = calls.len(), "model requested several tools in one turn, running them in order");
                }
                if let Some(text) = message.content.clone() {
                    self.send(ReactEvent::AssistantText { text: text.clone() });
                    ctx.last_assistant_text = Some(text);
                }
                session.log.append(message)?;
                Ok(LoopEvent::ToolsRequested { count: calls.len() })
            }
        }
    }

    /// Executing：按顺序执行最后一条 assistant 消息中尚未应答的调用
    async fn execute(&self, session: &mut Session) -> Result<LoopEvent, OrchestrationError> {
        let calls: Vec<ToolCall> = session
            .log
            .unanswered_calls()
            .into_iter()
            .map(parse_wire_call)
            .collect::<Result<_, _>>()
            .map_err(OrchestrationError::MalformedDecision)?;

        let sentinel = self.sentinel_name();
        let mut sentinel_invoked = false;
        for call in &calls {
            self.send(ReactEvent::ToolCall {
                call_id: call.call_id.clone(),
                tool: call.tool_name.clone(),
                args: call.arguments.clone(),
            });
            let result = self.executor.execute(call).await;
            let content = result.outcome.to_content();
            self.send(ReactEvent::Observation {
                call_id: result.call_id.clone(),
                tool: result.tool_name.clone(),
                ok: result.outcome.is_success(),
                preview: preview(&content),
            });
            session
                .log
                .append(Message::tool_result(result.call_id, result.tool_name.clone(), content))?;
            if sentinel == Some(result.tool_name.as_str()) {
                sentinel_invoked = true;
            }
        }

        self.save_checkpoint(session).await?;
        Ok(LoopEvent::ToolsCompleted { sentinel_invoked })
    }

    async fn save_checkpoint(&self, session: &Session) -> Result<(), OrchestrationError> {
        let Some(store) = &self.checkpoint else {
            return Ok(());
        };
        store.save(&SessionSnapshot::capture(&session.id, &session.log)).await?;
        self.send(ReactEvent::CheckpointSaved {
            session_id: session.id.clone(),
            messages: session.log.len(),
        });
        Ok(())
    }

    fn send(&self, event: ReactEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() > OBSERVATION_PREVIEW_CHARS {
        let head: String = content.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}
