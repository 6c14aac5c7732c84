//! Wikipedia 工具：按语言顺序查询词条摘要
//!
//! 使用 REST summary 接口（/api/rest_v1/page/summary/{title}）；404 与消歧义页视为未找到，
//! 依次尝试下一个语言。全部未找到时返回说明文字（成功结果），传输错误则为失败结果。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::ToolFailure;

/// 知识库查询：lookup(term, lang) -> 文本或未找到
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn lookup(&self, term: &str, lang: &str) -> Result<Option<String>, String>;
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WikipediaArgs {
    /// Exact topic name in nominative singular form, e.g. "kočka" (not "kočky"), "astronomie" (not "hvězdy")
    pub query: String,
}

#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    extract: String,
}

/// Wikipedia REST 客户端
pub struct WikipediaClient {
    client: Client,
    /// 形如 https://{lang}.wikipedia.org，{lang} 会被替换
    base_url: String,
}

impl WikipediaClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://{lang}.wikipedia.org";

    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("quiz-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn summary_url(&self, term: &str, lang: &str) -> Result<Url, String> {
        let base = self.base_url.replace("{lang}", lang);
        let mut url = Url::parse(&base).map_err(|e| format!("invalid wikipedia url {base}: {e}"))?;
        url.path_segments_mut()
            .map_err(|_| format!("wikipedia url cannot be a base: {base}"))?
            .pop_if_empty()
            .extend(["api", "rest_v1", "page", "summary", term]);
        Ok(url)
    }
}

#[async_trait]
impl KnowledgeSource for WikipediaClient {
    async fn lookup(&self, term: &str, lang: &str) -> Result<Option<String>, String> {
        let url = self.summary_url(term, lang)?;
        tracing::info!(url = %url, "wikipedia lookup");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let summary: SummaryResponse = resp
            .json()
            .await
            .map_err(|e| format!("Read body: {e}"))?;
        if summary.kind == "disambiguation" || summary.extract.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(summary.extract))
    }
}

/// 工具入口：按 languages 顺序查找，摘要截断为 max_chars 个字符
pub async fn lookup(
    source: &Arc<dyn KnowledgeSource>,
    languages: &[String],
    max_chars: usize,
    args: WikipediaArgs,
) -> Result<Value, ToolFailure> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(ToolFailure::invalid_arguments("query must not be empty"));
    }
    let mut last_error = None;
    for lang in languages {
        match source.lookup(query, lang).await {
            Ok(Some(text)) => {
                let summary: String = text.chars().take(max_chars).collect();
                return Ok(Value::String(summary));
            }
            Ok(None) => tracing::debug!(query, lang = %lang, "wikipedia page not found"),
            Err(e) => {
                tracing::warn!(query, lang = %lang, error = %e, "wikipedia lookup failed");
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) => Err(ToolFailure::handler_failed(format!("Wikipedia lookup for '{query}' failed: {e}"))),
        None => Ok(Value::String(format!("Topic '{query}' was not found on Wikipedia."))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeWiki {
        pages: HashMap<(String, String), Result<Option<String>, String>>,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KnowledgeSource for FakeWiki {
        async fn lookup(&self, term: &str, lang: &str) -> Result<Option<String>, String> {
            self.asked.lock().unwrap().push(lang.to_string());
            self.pages
                .get(&(term.to_string(), lang.to_string()))
                .cloned()
                .unwrap_or(Ok(None))
        }
    }

    fn langs() -> Vec<String> {
        vec!["cs".into(), "en".into()]
    }

    #[tokio::test]
    async fn test_falls_back_to_second_language_and_truncates() {
        let mut pages = HashMap::new();
        pages.insert(
            ("Python programming language".to_string(), "en".to_string()),
            Ok(Some("x".repeat(500))),
        );
        let fake = Arc::new(FakeWiki {
            pages,
            asked: Mutex::new(vec![]),
        });
        let source: Arc<dyn KnowledgeSource> = fake.clone();
        let out = lookup(
            &source,
            &langs(),
            200,
            WikipediaArgs {
                query: "Python programming language".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out.as_str().unwrap().chars().count(), 200);
        assert_eq!(*fake.asked.lock().unwrap(), vec!["cs", "en"]);
    }

    #[tokio::test]
    async fn test_not_found_is_a_textual_success() {
        let source: Arc<dyn KnowledgeSource> = Arc::new(FakeWiki {
            pages: HashMap::new(),
            asked: Mutex::new(vec![]),
        });
        let out = lookup(&source, &langs(), 200, WikipediaArgs { query: "qwzx".into() })
            .await
            .unwrap();
        assert!(out.as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_failure() {
        let mut pages = HashMap::new();
        pages.insert(("kočka".to_string(), "cs".to_string()), Err("timeout".to_string()));
        let source: Arc<dyn KnowledgeSource> = Arc::new(FakeWiki {
            pages,
            asked: Mutex::new(vec![]),
        });
        let err = lookup(&source, &langs(), 200, WikipediaArgs { query: "kočka".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::HandlerFailed { .. }));
    }

    #[test]
    fn test_summary_url_encodes_title() {
        let client = WikipediaClient::new(WikipediaClient::DEFAULT_BASE_URL, 5).unwrap();
        let url = client.summary_url("Python programming language", "en").unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/Python%20programming%20language"
        );
    }
}
