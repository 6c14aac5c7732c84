//! 托管搜索模型：把问题作为纯文本补全交给带联网能力的模型

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::ToolFailure;

pub const SEARCH_INSTRUCTION: &str =
    "Answer in very short, concise sentences. No explanations, no URLs, no extra text.";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// Query for web search, e.g. "current CZK to USD exchange rate" or "current ETC price in USD"
    pub query: String,
}

pub async fn search(client: &Arc<dyn LlmClient>, args: WebSearchArgs) -> Result<Value, ToolFailure> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(ToolFailure::invalid_arguments("query must not be empty"));
    }
    let messages = [Message::system(SEARCH_INSTRUCTION), Message::user(query)];
    let answer = client
        .complete(&messages)
        .await
        .map_err(|e| ToolFailure::handler_failed(format!("web search failed: {e}")))?;
    Ok(Value::String(answer.trim().to_string()))
}
