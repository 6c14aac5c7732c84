//! Agent 组装
//!
//! 从 AppConfig 构建一次性的上下文对象：决策客户端、题库、HTTP 客户端、检查点后端与超时，
//! 再组装成 Orchestrator。没有全局状态，所有协作者都通过这里注入。

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{AppConfig, CheckpointBackend, Profile};
use crate::core::OrchestrationError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{
    CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore,
};
use crate::react::{DecisionStep, Orchestrator, ReactEvent};
use crate::store::sqlite::StoreError;
use crate::store::{initialize_database, QuizStore, SqliteQuizStore};
use crate::tools::{
    BlockscoutClient, KnowledgeSource, RegistryError, ToolContext, ToolExecutor, ToolKind, ToolRegistry,
    WikipediaClient,
};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("quiz store: {0}")]
    Store(#[from] StoreError),
    #[error("checkpoint store: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("tool registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// 预构建的组件，可供一个会话使用
pub struct AgentComponents {
    pub orchestrator: Orchestrator,
    pub system_prompt: String,
    pub session_id: String,
}

impl AgentComponents {
    /// 恢复检查点，没有则新建会话
    pub async fn open_session(&self, initial_input: Option<String>) -> Result<crate::react::Session, OrchestrationError> {
        self.orchestrator
            .resume_or_start(&self.session_id, &self.system_prompt, initial_input)
            .await
    }
}

/// profile 对应的工具集合（含哨兵）
pub fn profile_tools(profile: Profile) -> &'static [ToolKind] {
    match profile {
        Profile::Quiz => &[
            ToolKind::SelectTopics,
            ToolKind::SelectQuestions,
            ToolKind::InsertQuestions,
            ToolKind::InsertTopicWithQuestions,
            ToolKind::Wikipedia,
            ToolKind::ExitProgram,
        ],
        Profile::Finance => &[ToolKind::EtcBalance, ToolKind::WebSearch],
    }
}

fn api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())
}

/// 决策客户端：provider=mock 或没有 API Key 时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    create_client(cfg, &cfg.llm.model)
}

/// 网页搜索工具用的托管搜索模型
pub fn create_search_llm(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    create_client(cfg, &cfg.llm.search_model)
}

fn create_client(cfg: &AppConfig, model: &str) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    match api_key() {
        Some(key) if provider != "mock" => {
            tracing::info!(model, "using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), model, Some(&key)))
        }
        _ => {
            tracing::warn!(provider = %provider, "no API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 按 profile 构建工具上下文与注册表
pub fn create_tool_registry(cfg: &AppConfig) -> Result<ToolRegistry, SetupError> {
    let mut ctx = ToolContext::new();
    match cfg.app.profile {
        Profile::Quiz => {
            initialize_database(&cfg.store.path, cfg.store.force_recreate)?;
            let store: Arc<dyn QuizStore> = Arc::new(SqliteQuizStore::open(&cfg.store.path)?);
            let wiki = &cfg.tools.wikipedia;
            let source: Arc<dyn KnowledgeSource> = Arc::new(WikipediaClient::new(wiki.base_url.clone(), wiki.timeout_secs)?);
            ctx = ctx
                .with_store(store)
                .with_knowledge(source, wiki.languages.clone(), wiki.max_summary_chars);
        }
        Profile::Finance => {
            let bs = &cfg.tools.blockscout;
            ctx = ctx
                .with_blockscout(Arc::new(BlockscoutClient::new(bs.base_url.clone(), bs.timeout_secs)?))
                .with_search(create_search_llm(cfg));
        }
    }
    // 关闭哨兵终止时不向模型提供哨兵工具
    let offer_sentinel = cfg.termination_policy().sentinel();
    let kinds: Vec<ToolKind> = profile_tools(cfg.app.profile)
        .iter()
        .copied()
        .filter(|k| offer_sentinel || !k.is_sentinel())
        .collect();
    Ok(ToolRegistry::with_tools(ctx, &kinds)?)
}

pub fn create_checkpoint_store(cfg: &AppConfig) -> Result<Option<Arc<dyn CheckpointStore>>, SetupError> {
    let store: Option<Arc<dyn CheckpointStore>> = match cfg.session.checkpoint {
        CheckpointBackend::None => None,
        CheckpointBackend::Memory => Some(Arc::new(MemoryCheckpointStore::new())),
        CheckpointBackend::File => Some(Arc::new(FileCheckpointStore::new(&cfg.session.checkpoint_dir))),
        CheckpointBackend::Sqlite => Some(Arc::new(SqliteCheckpointStore::open(&cfg.session.checkpoint_db)?)),
    };
    Ok(store)
}

/// 创建 Agent 组件；event_tx 用于把过程事件推给前端
pub fn create_agent_components(
    cfg: &AppConfig,
    event_tx: Option<mpsc::UnboundedSender<ReactEvent>>,
) -> Result<AgentComponents, SetupError> {
    let registry = Arc::new(create_tool_registry(cfg)?);
    tracing::info!(profile = cfg.app.profile.name(), tools = ?registry.tool_names(), "tools registered");

    let decision = DecisionStep::new(create_llm_from_config(cfg), cfg.llm.timeouts.request);
    let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs);
    let mut orchestrator = Orchestrator::new(
        decision,
        executor,
        cfg.termination_policy(),
        cfg.app.is_interactive(),
    );
    if let Some(store) = create_checkpoint_store(cfg)? {
        orchestrator = orchestrator.with_checkpoint(store);
    }
    if let Some(tx) = event_tx {
        orchestrator = orchestrator.with_event_tx(tx);
    }

    let session_id = cfg
        .session
        .id
        .clone()
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    Ok(AgentComponents {
        orchestrator,
        system_prompt: crate::config::load_system_prompt(&cfg.app),
        session_id,
    })
}
