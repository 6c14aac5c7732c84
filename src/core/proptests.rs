//! 状态机性质测试
//!
//! 随机生成模型决策序列与终止策略，驱动纯 transition 函数，检查轮数上限与哨兵吸收。

use proptest::prelude::*;

use super::state::*;
use crate::memory::{ConversationLog, Message, WireToolCall};

const SENTINEL: &str = "exit_program";

/// 一次模型决策：最终回答，或一轮工具请求（是否包含哨兵）
#[derive(Debug, Clone)]
enum Decision {
    Final,
    Tools { count: usize, sentinel: bool },
}

fn arb_decision() -> impl Strategy<Value = Decision> {
    prop_oneof![
        1 => Just(Decision::Final),
        4 => (1usize..4, any::<bool>()).prop_map(|(count, sentinel)| Decision::Tools { count, sentinel }),
    ]
}

fn arb_policy() -> impl Strategy<Value = TerminationPolicy> {
    (proptest::option::of(0usize..8), any::<bool>()).prop_map(|(cap, sentinel)| TerminationPolicy::new(cap, sentinel))
}

struct Trace {
    final_state: LoopState,
    max_rounds_seen: usize,
    sentinel_seen_at_round: Option<usize>,
}

/// 按决策脚本驱动状态机；脚本耗尽时停在当前状态
fn drive(policy: TerminationPolicy, interactive: bool, script: &[Decision]) -> Trace {
    let mut state = LoopState::Deciding;
    let mut ctx = LoopContext::new(policy, interactive);
    let mut max_rounds_seen = 0;
    let mut sentinel_seen_at_round = None;
    let mut decisions = script.iter();

    while !state.is_terminal() {
        let event = match &state {
            LoopState::Deciding => match decisions.next() {
                None => break,
                Some(Decision::Final) => LoopEvent::FinalAnswer {
                    content: "answer".into(),
                },
                Some(Decision::Tools { count, sentinel }) => {
                    if *sentinel && sentinel_seen_at_round.is_none() {
                        sentinel_seen_at_round = Some(ctx.rounds + 1);
                    }
                    ctx.last_assistant_text = Some(format!("round {}", ctx.rounds + 1));
                    LoopEvent::ToolsRequested { count: *count }
                }
            },
            LoopState::Executing => {
                let sentinel = sentinel_seen_at_round == Some(ctx.rounds);
                LoopEvent::ToolsCompleted {
                    sentinel_invoked: sentinel,
                }
            }
            LoopState::AwaitingInput => LoopEvent::UserInput,
            LoopState::Terminal(_) => unreachable!(),
        };
        let result = transition(&state, &ctx, event).expect("generated events are valid");
        state = result.state;
        ctx.rounds = result.rounds;
        max_rounds_seen = max_rounds_seen.max(ctx.rounds);
    }

    Trace {
        final_state: state,
        max_rounds_seen,
        sentinel_seen_at_round,
    }
}

proptest! {
    #[test]
    fn rounds_never_exceed_cap(
        policy in arb_policy(),
        interactive in any::<bool>(),
        script in proptest::collection::vec(arb_decision(), 0..40),
    ) {
        let trace = drive(policy, interactive, &script);
        if let Some(cap) = policy.max_tool_rounds() {
            prop_assert!(trace.max_rounds_seen <= cap, "rounds {} > cap {}", trace.max_rounds_seen, cap);
            if trace.max_rounds_seen == cap && !matches!(trace.final_state, LoopState::Terminal(TerminalReason::SentinelInvoked)) {
                let capped = matches!(trace.final_state, LoopState::Terminal(TerminalReason::IterationCapReached { .. }));
                prop_assert!(capped, "reached cap but ended in {:?}", trace.final_state);
            }
        }
    }

    #[test]
    fn sentinel_round_always_terminates(
        policy in arb_policy(),
        interactive in any::<bool>(),
        script in proptest::collection::vec(arb_decision(), 0..40),
    ) {
        let trace = drive(policy, interactive, &script);
        if let Some(round) = trace.sentinel_seen_at_round {
            let within_cap = policy.max_tool_rounds().map_or(true, |cap| round <= cap);
            if within_cap {
                prop_assert_eq!(trace.final_state, LoopState::Terminal(TerminalReason::SentinelInvoked));
                prop_assert_eq!(trace.max_rounds_seen, round);
            }
        }
    }

    #[test]
    fn terminal_absorbs_every_event(
        event in prop_oneof![
            Just(LoopEvent::UserInput),
            Just(LoopEvent::Cancel),
            (1usize..3).prop_map(|count| LoopEvent::ToolsRequested { count }),
            any::<bool>().prop_map(|s| LoopEvent::ToolsCompleted { sentinel_invoked: s }),
        ],
    ) {
        let ctx = LoopContext::new(TerminationPolicy::default(), true);
        let state = LoopState::Terminal(TerminalReason::SentinelInvoked);
        prop_assert_eq!(transition(&state, &ctx, event), Err(TransitionError::AlreadyTerminal));
    }

    #[test]
    fn log_ending_in_sentinel_resumes_terminal(
        rounds in 0usize..5,
        interactive in any::<bool>(),
    ) {
        let mut log = ConversationLog::with_system("sys");
        log.append(Message::user("hi")).unwrap();
        for i in 0..rounds {
            let id = format!("call_{i}");
            log.append(Message::assistant_with_calls(None, vec![WireToolCall::function(&id, "select_topics_from_db", "{}")])).unwrap();
            log.append(Message::tool_result(&id, "select_topics_from_db", "[]")).unwrap();
        }
        log.append(Message::assistant_with_calls(None, vec![WireToolCall::function("bye", SENTINEL, "{}")])).unwrap();
        log.append(Message::tool_result("bye", SENTINEL, "")).unwrap();

        prop_assert_eq!(
            resume_state(&log, Some(SENTINEL), interactive),
            Ok(LoopState::Terminal(TerminalReason::SentinelInvoked))
        );
    }
}
