//! 工具执行器
//!
//! 持有只读的 ToolRegistry 与 I/O 超时。execute(call) 依次做：解析工具名 -> 按 Schema 校验参数 ->
//! 调用处理函数（网络类加超时、panic 被捕获），任何故障都转为 ToolFailure 放进结果，从不向上传播。
//! 每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::time::timeout;

use crate::tools::schema::validate_arguments;
use crate::tools::{ToolCall, ToolFailure, ToolOutcome, ToolRegistry, ToolResult};

/// 审计日志中参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 执行单个调用，结果总是与 call_id 关联
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let outcome: ToolOutcome = self.run(call).await.into();

        let (ok, kind) = match &outcome {
            ToolOutcome::Success(_) => (true, "ok"),
            ToolOutcome::Failure(f) => (false, f.kind()),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool_name,
            "call_id": call.call_id,
            "ok": ok,
            "outcome": kind,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        ToolResult {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            outcome,
        }
    }

    async fn run(&self, call: &ToolCall) -> Result<serde_json::Value, ToolFailure> {
        let kind = self.registry.resolve(&call.tool_name)?;
        validate_arguments(&kind.parameters_schema(), &call.arguments).map_err(ToolFailure::invalid_arguments)?;

        let handler = AssertUnwindSafe(self.registry.dispatch(kind, call.arguments.clone())).catch_unwind();
        let joined = if kind.is_time_bounded() {
            match timeout(self.timeout, handler).await {
                Ok(joined) => joined,
                Err(_) => return Err(ToolFailure::timed_out(kind.name(), self.timeout.as_secs())),
            }
        } else {
            handler.await
        };

        match joined {
            Ok(result) => result,
            Err(panic) => Err(ToolFailure::handler_failed(format!(
                "{} panicked: {}",
                kind.name(),
                panic_message(panic.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
