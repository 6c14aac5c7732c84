//! 决策步骤：对当前日志调用一次模型，并把回复分类为最终回答或工具请求
//!
//! 分类规则：
//! - 有 tool_calls：每个调用必须是 function 类型、id 与名字非空、id 不重复、arguments 是合法 JSON，
//!   否则整条回复视为畸形
//! - 无 tool_calls：content 去空白后非空即为最终回答
//! - 其余（空回复）都是畸形决策，直接上报，不重试

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::OrchestrationError;
use crate::llm::{AssistantReply, DecisionOptions, LlmClient, LlmError};
use crate::memory::{ConversationLog, Message, WireToolCall};
use crate::tools::{ToolCall, ToolDeclaration};

/// 分类后的决策；message 为要追加到日志的 assistant 消息
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Final { content: String, message: Message },
    ToolRequest { calls: Vec<ToolCall>, message: Message },
}

/// 把线上格式的调用解析为 ToolCall；空 arguments 视为 {}
pub fn parse_wire_call(call: &WireToolCall) -> Result<ToolCall, String> {
    if call.kind != "function" {
        return Err(format!("tool call {} has unsupported type '{}'", call.id, call.kind));
    }
    if call.id.trim().is_empty() {
        return Err("tool call without id".to_string());
    }
    if call.function.name.trim().is_empty() {
        return Err(format!("tool call {} has no function name", call.id));
    }
    let raw = call.function.arguments.trim();
    let arguments = if raw.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(raw)
            .map_err(|e| format!("tool call {} has arguments that are not JSON: {e}", call.id))?
    };
    Ok(ToolCall {
        call_id: call.id.clone(),
        tool_name: call.function.name.clone(),
        arguments,
    })
}

pub fn classify(reply: AssistantReply) -> Result<Decision, OrchestrationError> {
    if !reply.tool_calls.is_empty() {
        let mut seen = HashSet::new();
        let mut calls = Vec::with_capacity(reply.tool_calls.len());
        for wire in &reply.tool_calls {
            if !seen.insert(wire.id.as_str()) {
                return Err(OrchestrationError::MalformedDecision(format!(
                    "duplicate tool call id {}",
                    wire.id
                )));
            }
            calls.push(parse_wire_call(wire).map_err(OrchestrationError::MalformedDecision)?);
        }
        let content = reply.content.filter(|c| !c.trim().is_empty());
        return Ok(Decision::ToolRequest {
            calls,
            message: Message::assistant_with_calls(content, reply.tool_calls),
        });
    }

    match reply.content {
        Some(content) if !content.trim().is_empty() => Ok(Decision::Final {
            message: Message::assistant(content.clone()),
            content,
        }),
        _ => Err(OrchestrationError::MalformedDecision(
            "response has neither content nor tool calls".to_string(),
        )),
    }
}

/// 决策步骤：持有决策客户端与调用超时
pub struct DecisionStep {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
    options: DecisionOptions,
}

impl DecisionStep {
    pub fn new(llm: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            llm,
            timeout: Duration::from_secs(timeout_secs),
            options: DecisionOptions::default(),
        }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub async fn decide(
        &self,
        log: &ConversationLog,
        tools: &[ToolDeclaration],
    ) -> Result<Decision, OrchestrationError> {
        let reply = tokio::time::timeout(self.timeout, self.llm.propose(log.messages(), tools, &self.options))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))??;
        classify(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str, args: &str) -> WireToolCall {
        WireToolCall::function(id, name, args)
    }

    #[test]
    fn test_final_answer() {
        let d = classify(AssistantReply::text("Topics: kočka, astronomie")).unwrap();
        match d {
            Decision::Final { content, message } => {
                assert_eq!(content, "Topics: kočka, astronomie");
                assert_eq!(message, Message::assistant("Topics: kočka, astronomie"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tool_request_parses_arguments() {
        let reply = AssistantReply::tool_calls(
            None,
            vec![call("call_1", "select_topics_from_db", r#"{"sql_query":"SELECT * FROM topics"}"#)],
        );
        match classify(reply).unwrap() {
            Decision::ToolRequest { calls, message } => {
                assert_eq!(calls[0].arguments, json!({"sql_query": "SELECT * FROM topics"}));
                assert!(message.requests_tools());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_arguments_mean_no_arguments() {
        let reply = AssistantReply::tool_calls(None, vec![call("c", "exit_program", "")]);
        let Decision::ToolRequest { calls, .. } = classify(reply).unwrap() else {
            panic!("expected tool request");
        };
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn test_malformed_replies() {
        for reply in [
            AssistantReply::default(),
            AssistantReply::text("   "),
            AssistantReply::tool_calls(None, vec![call("c", "select_topics_from_db", "{not json")]),
            AssistantReply::tool_calls(None, vec![call("", "select_topics_from_db", "{}")]),
            AssistantReply::tool_calls(None, vec![call("c", "a", "{}"), call("c", "b", "{}")]),
        ] {
            assert!(matches!(classify(reply), Err(OrchestrationError::MalformedDecision(_))));
        }

        let mut odd = call("c", "exit_program", "{}");
        odd.kind = "retrieval".into();
        assert!(matches!(
            classify(AssistantReply::tool_calls(None, vec![odd])),
            Err(OrchestrationError::MalformedDecision(_))
        ));
    }
}
