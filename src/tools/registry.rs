//! 工具注册表
//!
//! 工具集合是封闭的：每个工具是 ToolKind 的一个变体，参数 Schema 由对应参数结构体派生，
//! 分发用穷尽 match；模型给出的名字解析不到任何变体时返回 UnknownTool，而不是报错退出。
//! 注册表在初始化后只读，可在多个会话间共享（Arc<ToolRegistry>）。

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::llm::LlmClient;
use crate::store::QuizStore;
use crate::tools::balance::{self, BalanceArgs, BlockscoutClient};
use crate::tools::exit::{self, ExitArgs};
use crate::tools::schema::{decode_arguments, parameters_schema};
use crate::tools::sql::{self, SqlQueryArgs, TopicWithQuestionsArgs};
use crate::tools::web_search::{self, WebSearchArgs};
use crate::tools::wikipedia::{self, KnowledgeSource, WikipediaArgs};
use crate::tools::ToolFailure;

/// 工具的副作用类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// 无副作用（哨兵）
    None,
    StoreRead,
    StoreWrite,
    Network,
}

/// 全部已知工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SelectTopics,
    SelectQuestions,
    InsertQuestions,
    InsertTopicWithQuestions,
    Wikipedia,
    EtcBalance,
    WebSearch,
    ExitProgram,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::SelectTopics,
        ToolKind::SelectQuestions,
        ToolKind::InsertQuestions,
        ToolKind::InsertTopicWithQuestions,
        ToolKind::Wikipedia,
        ToolKind::EtcBalance,
        ToolKind::WebSearch,
        ToolKind::ExitProgram,
    ];

    /// 对模型公开的名字
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::SelectTopics => "select_topics_from_db",
            ToolKind::SelectQuestions => "select_questions_from_db",
            ToolKind::InsertQuestions => "insert_questions_to_db",
            ToolKind::InsertTopicWithQuestions => "insert_new_topic_to_db_and_questions",
            ToolKind::Wikipedia => "get_text_from_wikipedia",
            ToolKind::EtcBalance => "get_etc_balance_by_address",
            ToolKind::WebSearch => "get_info_from_web_search",
            ToolKind::ExitProgram => "exit_program",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolKind> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::SelectTopics => {
                "Search topics in database by SQL query. Can be used for finding similar topics."
            }
            ToolKind::SelectQuestions => "Search questions in database by SQL query.",
            ToolKind::InsertQuestions => "Insert questions to database using SQL INSERT query.",
            ToolKind::InsertTopicWithQuestions => {
                "Insert new topic and its questions using SQL queries. In insert_query_questions use the \
                 string [topic_id] (without quotes) wherever the new topic id belongs; it is replaced with \
                 the id of the inserted topic."
            }
            ToolKind::Wikipedia => {
                "Search information about topic on Wikipedia. Use the exact topic name in nominative \
                 singular form, e.g. \"kočka\" (not \"kočky\"), \"Python programming language\" (not \"Python\")."
            }
            ToolKind::EtcBalance => {
                "Returns information about an Ethereum Classic (ETC) account based on its address. \
                 The result includes fields such as:\n\
                 - `coin_balance`: string, the balance is calculated as (coin_balance / 10^18).\n\
                 - `exchange_rate`: string, current ETC to USD rate\n\
                 Other fields provide metadata."
            }
            ToolKind::WebSearch => {
                "Performs a web search using a powerful AI-enabled search engine to retrieve up-to-date \
                 information from the internet, such as exchange rates, news, or other live data."
            }
            ToolKind::ExitProgram => "Virtual tool. Exit the agent program.",
        }
    }

    pub fn parameters_schema(self) -> Value {
        match self {
            ToolKind::SelectTopics | ToolKind::SelectQuestions | ToolKind::InsertQuestions => {
                parameters_schema::<SqlQueryArgs>()
            }
            ToolKind::InsertTopicWithQuestions => parameters_schema::<TopicWithQuestionsArgs>(),
            ToolKind::Wikipedia => parameters_schema::<WikipediaArgs>(),
            ToolKind::EtcBalance => parameters_schema::<BalanceArgs>(),
            ToolKind::WebSearch => parameters_schema::<WebSearchArgs>(),
            ToolKind::ExitProgram => parameters_schema::<ExitArgs>(),
        }
    }

    pub fn side_effect(self) -> SideEffect {
        match self {
            ToolKind::SelectTopics | ToolKind::SelectQuestions => SideEffect::StoreRead,
            ToolKind::InsertQuestions | ToolKind::InsertTopicWithQuestions => SideEffect::StoreWrite,
            ToolKind::Wikipedia | ToolKind::EtcBalance | ToolKind::WebSearch => SideEffect::Network,
            ToolKind::ExitProgram => SideEffect::None,
        }
    }

    /// 外层超时只套在网络工具上；题库工具的等锁时间由存储的 busy_timeout 限定
    pub fn is_time_bounded(self) -> bool {
        self.side_effect() == SideEffect::Network
    }

    pub fn is_sentinel(self) -> bool {
        self == ToolKind::ExitProgram
    }

    pub fn declaration(self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// 发给模型的工具声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 处理函数依赖的外部协作者，启动时构造一次
#[derive(Clone)]
pub struct ToolContext {
    pub store: Option<Arc<dyn QuizStore>>,
    pub knowledge: Option<Arc<dyn KnowledgeSource>>,
    pub wikipedia_languages: Vec<String>,
    pub wikipedia_max_chars: usize,
    pub blockscout: Option<Arc<BlockscoutClient>>,
    pub search: Option<Arc<dyn LlmClient>>,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            store: None,
            knowledge: None,
            wikipedia_languages: vec!["cs".to_string(), "en".to_string()],
            wikipedia_max_chars: 200,
            blockscout: None,
            search: None,
        }
    }
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn QuizStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_knowledge(mut self, source: Arc<dyn KnowledgeSource>, languages: Vec<String>, max_chars: usize) -> Self {
        self.knowledge = Some(source);
        self.wikipedia_languages = languages;
        self.wikipedia_max_chars = max_chars;
        self
    }

    pub fn with_blockscout(mut self, client: Arc<BlockscoutClient>) -> Self {
        self.blockscout = Some(client);
        self
    }

    pub fn with_search(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.search = Some(client);
        self
    }

    /// 工具缺少的协作者名；None 表示可以注册
    fn missing_for(&self, kind: ToolKind) -> Option<&'static str> {
        match kind {
            ToolKind::SelectTopics
            | ToolKind::SelectQuestions
            | ToolKind::InsertQuestions
            | ToolKind::InsertTopicWithQuestions => self.store.is_none().then_some("quiz store"),
            ToolKind::Wikipedia => self.knowledge.is_none().then_some("knowledge source"),
            ToolKind::EtcBalance => self.blockscout.is_none().then_some("blockscout client"),
            ToolKind::WebSearch => self.search.is_none().then_some("search model"),
            ToolKind::ExitProgram => None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("tool {tool} needs a {needs}, none was configured")]
    MissingCollaborator { tool: &'static str, needs: &'static str },
}

/// 工具注册表：有序的 ToolKind 集合 + 共享的 ToolContext
pub struct ToolRegistry {
    tools: Vec<ToolKind>,
    context: ToolContext,
}

impl ToolRegistry {
    pub fn new(context: ToolContext) -> Self {
        Self {
            tools: Vec::new(),
            context,
        }
    }

    /// 注册工具；重复注册是无操作
    pub fn register(&mut self, kind: ToolKind) -> Result<(), RegistryError> {
        if let Some(needs) = self.context.missing_for(kind) {
            return Err(RegistryError::MissingCollaborator {
                tool: kind.name(),
                needs,
            });
        }
        if !self.tools.contains(&kind) {
            self.tools.push(kind);
        }
        Ok(())
    }

    pub fn with_tools(context: ToolContext, kinds: &[ToolKind]) -> Result<Self, RegistryError> {
        let mut registry = Self::new(context);
        for kind in kinds {
            registry.register(*kind)?;
        }
        Ok(registry)
    }

    /// 按名解析；未注册或未知的名字都是 UnknownTool
    pub fn resolve(&self, name: &str) -> Result<ToolKind, ToolFailure> {
        ToolKind::from_name(name)
            .filter(|k| self.tools.contains(k))
            .ok_or_else(|| ToolFailure::unknown_tool(name))
    }

    /// 已注册的哨兵工具
    pub fn sentinel(&self) -> Option<ToolKind> {
        self.tools.iter().copied().find(|k| k.is_sentinel())
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|k| k.name()).collect()
    }

    /// 全部声明（含哨兵），按注册顺序
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|k| k.declaration()).collect()
    }

    /// 调用处理函数；参数已由执行器按 Schema 校验
    pub async fn dispatch(&self, kind: ToolKind, args: Value) -> Result<Value, ToolFailure> {
        let ctx = &self.context;
        match kind {
            ToolKind::SelectTopics | ToolKind::SelectQuestions => {
                sql::select(require(&ctx.store, kind)?, decode_arguments(args)?).await
            }
            ToolKind::InsertQuestions => {
                sql::insert_questions(require(&ctx.store, kind)?, decode_arguments(args)?).await
            }
            ToolKind::InsertTopicWithQuestions => {
                sql::insert_topic_with_questions(require(&ctx.store, kind)?, decode_arguments(args)?).await
            }
            ToolKind::Wikipedia => {
                wikipedia::lookup(
                    require(&ctx.knowledge, kind)?,
                    &ctx.wikipedia_languages,
                    ctx.wikipedia_max_chars,
                    decode_arguments(args)?,
                )
                .await
            }
            ToolKind::EtcBalance => balance::lookup(require(&ctx.blockscout, kind)?, decode_arguments(args)?).await,
            ToolKind::WebSearch => web_search::search(require(&ctx.search, kind)?, decode_arguments(args)?).await,
            ToolKind::ExitProgram => Ok(exit::exit_program(decode_arguments(args)?)),
        }
    }
}

fn require<T: ?Sized>(slot: &Option<Arc<T>>, kind: ToolKind) -> Result<&Arc<T>, ToolFailure> {
    slot.as_ref()
        .ok_or_else(|| ToolFailure::handler_failed(format!("{} is not configured", kind.name())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteQuizStore;
    use serde_json::json;

    fn quiz_registry() -> ToolRegistry {
        let store: Arc<dyn QuizStore> = Arc::new(SqliteQuizStore::open_in_memory().unwrap());
        ToolRegistry::with_tools(
            ToolContext::new().with_store(store),
            &[
                ToolKind::SelectTopics,
                ToolKind::SelectQuestions,
                ToolKind::InsertQuestions,
                ToolKind::InsertTopicWithQuestions,
                ToolKind::ExitProgram,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("launch_rocket"), None);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = quiz_registry();
        let first = registry.resolve("select_topics_from_db").unwrap();
        for _ in 0..10 {
            assert_eq!(registry.resolve("select_topics_from_db").unwrap(), first);
        }
        assert_eq!(registry.resolve("launch_rocket"), Err(ToolFailure::unknown_tool("launch_rocket")));
    }

    #[test]
    fn test_unregistered_known_tool_is_unknown() {
        let registry = quiz_registry();
        let err = registry.resolve("get_etc_balance_by_address").unwrap_err();
        assert!(matches!(err, ToolFailure::UnknownTool { .. }));
    }

    #[test]
    fn test_register_requires_collaborator() {
        let mut registry = ToolRegistry::new(ToolContext::new());
        assert_eq!(
            registry.register(ToolKind::SelectTopics),
            Err(RegistryError::MissingCollaborator {
                tool: "select_topics_from_db",
                needs: "quiz store"
            })
        );
        registry.register(ToolKind::ExitProgram).unwrap();
        registry.register(ToolKind::ExitProgram).unwrap();
        assert_eq!(registry.tool_names(), vec!["exit_program"]);
        assert_eq!(registry.sentinel(), Some(ToolKind::ExitProgram));
    }

    #[test]
    fn test_declarations_include_sentinel() {
        let decls = quiz_registry().declarations();
        assert_eq!(decls.len(), 5);
        let exit = decls.iter().find(|d| d.name == "exit_program").unwrap();
        assert_eq!(exit.parameters["required"], json!([]));
        let topic = decls
            .iter()
            .find(|d| d.name == "insert_new_topic_to_db_and_questions")
            .unwrap();
        let mut required: Vec<&str> = topic.parameters["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        required.sort_unstable();
        assert_eq!(required, vec!["insert_query_questions", "insert_query_topic"]);
    }

    #[tokio::test]
    async fn test_dispatch_sentinel_is_noop() {
        let registry = quiz_registry();
        let out = registry.dispatch(ToolKind::ExitProgram, json!({})).await.unwrap();
        assert_eq!(out, Value::String(String::new()));
    }
}
