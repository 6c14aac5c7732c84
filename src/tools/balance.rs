//! ETC 地址余额查询（Blockscout API）
//!
//! 单次 GET，带超时；传输错误或非 2xx 状态直接转为失败结果，不重试（由外层决定是否再问）。

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::ToolFailure;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BalanceArgs {
    /// The address of the ETC account in hexadecimal format, starting with '0x'
    pub etc_address: String,
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static address pattern"))
}

/// Blockscout 地址接口客户端
pub struct BlockscoutClient {
    client: Client,
    base_url: String,
}

impl BlockscoutClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://etc.blockscout.com";

    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn address_info(&self, address: &str) -> Result<Value, String> {
        let url = format!("{}/api/v2/addresses/{}", self.base_url, address);
        tracing::info!(url = %url, "blockscout lookup");
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| format!("blockscout API call error: {e}"))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| format!("blockscout API call error: {e}"))?;
        resp.json::<Value>()
            .await
            .map_err(|e| format!("blockscout API returned invalid JSON: {e}"))
    }
}

/// 工具入口
pub async fn lookup(client: &BlockscoutClient, args: BalanceArgs) -> Result<Value, ToolFailure> {
    let address = args.etc_address.trim();
    if !address_pattern().is_match(address) {
        return Err(ToolFailure::invalid_arguments(format!(
            "'{address}' is not a hexadecimal ETC address (0x + 40 hex digits)"
        )));
    }
    client
        .address_info(address)
        .await
        .map_err(ToolFailure::handler_failed)
}
