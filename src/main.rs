//! Quiz Agent 命令行入口
//!
//! 用法：`quiz-agent [--config <file>] [--recreate-store] [问题...]`
//! 交互 profile 读取 stdin 逐行对话（EOF 结束会话）；单次 profile 以命令行剩余参数作为问题。

use std::path::PathBuf;

use anyhow::Context;
use quiz_agent::agent::create_agent_components;
use quiz_agent::config::load_config;
use quiz_agent::core::{SessionSupervisor, TerminalReason};
use quiz_agent::observability;
use quiz_agent::react::{ReactEvent, RunStop};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

struct CliArgs {
    config_path: Option<PathBuf>,
    recreate_store: bool,
    input: Option<String>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    let mut recreate_store = false;
    let mut words = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a file path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--recreate-store" => recreate_store = true,
            _ => words.push(arg),
        }
    }
    let input = Some(words.join(" ")).filter(|s| !s.trim().is_empty());
    Ok(CliArgs {
        config_path,
        recreate_store,
        input,
    })
}

/// 把过程事件打印出来：回答到 stdout，工具进度到 stderr
async fn print_events(mut rx: mpsc::UnboundedReceiver<ReactEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ReactEvent::RoundUpdate { round, max_rounds } => match max_rounds {
                Some(max) => eprintln!("[round {round}/{max}]"),
                None => eprintln!("[round {round}]"),
            },
            ReactEvent::Thinking => eprintln!("[thinking]"),
            ReactEvent::AssistantText { text } => println!("Assistant: {text}"),
            ReactEvent::ToolCall { tool, args, .. } => eprintln!("[tool] {tool} {args}"),
            ReactEvent::Observation { tool, ok, preview, .. } => {
                let mark = if ok { "ok" } else { "failed" };
                eprintln!("[observation] {tool} ({mark}): {preview}");
            }
            ReactEvent::CheckpointSaved { .. } | ReactEvent::AwaitingInput => {}
            ReactEvent::Terminated { reason } => eprintln!("[terminated] {}", describe(&reason)),
            ReactEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
                cumulative_total,
            } => tracing::debug!(prompt_tokens, completion_tokens, cumulative_total, "token usage"),
            ReactEvent::Error { text } => eprintln!("[error] {text}"),
        }
    }
}

fn describe(reason: &TerminalReason) -> String {
    match reason {
        TerminalReason::Final { .. } => "final answer".to_string(),
        TerminalReason::SentinelInvoked => "exit requested".to_string(),
        TerminalReason::IterationCapReached { partial } => match partial {
            Some(text) => format!("tool round limit reached, partial answer: {text}"),
            None => "tool round limit reached".to_string(),
        },
        TerminalReason::Cancelled => "cancelled".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args()?;
    let mut cfg = load_config(args.config_path).context("Failed to load config")?;
    if args.recreate_store {
        cfg.store.force_recreate = true;
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let components = create_agent_components(&cfg, Some(event_tx)).context("Failed to create agent")?;
    let printer = tokio::spawn(print_events(event_rx));

    let supervisor = SessionSupervisor::new();
    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl+C received, stopping after the current step");
                supervisor.cancel();
            }
        });
    }

    tracing::info!(session_id = %components.session_id, profile = cfg.app.profile.name(), "session starting");
    let orchestrator = &components.orchestrator;
    let mut session = components
        .open_session(args.input)
        .await
        .context("Failed to open session")?;
    let token = supervisor.child_token();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let reason = loop {
        let outcome = orchestrator
            .run(&mut session, &token)
            .await
            .context("Orchestration failed")?;
        match outcome.stop {
            RunStop::Terminated(reason) => break reason,
            RunStop::AwaitingInput { .. } => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;
                let line = tokio::select! {
                    _ = token.cancelled() => None,
                    line = stdin.next_line() => line.context("Failed to read stdin")?,
                };
                match line {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => orchestrator.submit_user_input(&mut session, line)?,
                    None => {
                        orchestrator.cancel_session(&mut session)?;
                        break TerminalReason::Cancelled;
                    }
                }
            }
        }
    };
    tracing::info!(session_id = %session.id(), reason = ?reason, "session finished");

    drop(components);
    let _ = printer.await;
    Ok(())
}
