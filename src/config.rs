//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `QUIZ__*` 覆盖（双下划线表示嵌套，如 `QUIZ__LLM__PROVIDER=openai`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::TerminationPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub store: StoreSection,
    pub session: SessionSection,
    pub orchestration: OrchestrationSection,
}

/// 工具集合与默认终止方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// 题库助手：交互式，哨兵终止
    #[default]
    Quiz,
    /// ETC 余额 + 网页搜索：单次问答，轮数上限
    Finance,
}

impl Profile {
    pub fn name(self) -> &'static str {
        match self {
            Profile::Quiz => "quiz",
            Profile::Finance => "finance",
        }
    }
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub profile: Profile,
    /// 是否交互式；未设置时 quiz 为交互式，finance 为单次
    pub interactive: Option<bool>,
    /// system prompt 文件；未设置时查找 config/prompts/<profile>.txt
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            profile: Profile::Quiz,
            interactive: None,
            system_prompt_path: None,
        }
    }
}

impl AppSection {
    pub fn is_interactive(&self) -> bool {
        self.interactive.unwrap_or(self.profile == Profile::Quiz)
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock；openai 且没有 API Key 时退回 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 网页搜索工具使用的托管搜索模型
    pub search_model: String,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            search_model: "gpt-4o-search-preview".to_string(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次决策调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 访问网络或磁盘的工具单次调用超时（秒）
    pub tool_timeout_secs: u64,
    pub wikipedia: WikipediaSection,
    pub blockscout: BlockscoutSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            wikipedia: WikipediaSection::default(),
            blockscout: BlockscoutSection::default(),
        }
    }
}

/// [tools.wikipedia] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WikipediaSection {
    /// 形如 https://{lang}.wikipedia.org
    pub base_url: String,
    /// 依次尝试的语言
    pub languages: Vec<String>,
    pub max_summary_chars: usize,
    pub timeout_secs: u64,
}

impl Default for WikipediaSection {
    fn default() -> Self {
        Self {
            base_url: crate::tools::WikipediaClient::DEFAULT_BASE_URL.to_string(),
            languages: vec!["cs".to_string(), "en".to_string()],
            max_summary_chars: 200,
            timeout_secs: 10,
        }
    }
}

/// [tools.blockscout] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlockscoutSection {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BlockscoutSection {
    fn default() -> Self {
        Self {
            base_url: crate::tools::BlockscoutClient::DEFAULT_BASE_URL.to_string(),
            timeout_secs: 5,
        }
    }
}

/// [store] 段：题库 SQLite 文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
    /// 启动时删除并重建
    pub force_recreate: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/quiz.db"),
            force_recreate: false,
        }
    }
}

/// 检查点后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    None,
    Memory,
    #[default]
    File,
    Sqlite,
}

/// [session] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// 会话 ID；未设置时每次启动生成新的
    pub id: Option<String>,
    pub checkpoint: CheckpointBackend,
    /// file 后端的目录
    pub checkpoint_dir: PathBuf,
    /// sqlite 后端的数据库文件
    pub checkpoint_db: PathBuf,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            id: None,
            checkpoint: CheckpointBackend::File,
            checkpoint_dir: PathBuf::from("data/sessions"),
            checkpoint_db: PathBuf::from("data/checkpoints.db"),
        }
    }
}

/// [orchestration] 段：终止策略；未设置时按 profile 取默认值
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrchestrationSection {
    /// 工具轮数上限；0 表示不设上限
    pub max_tool_rounds: Option<usize>,
    /// 是否在哨兵工具被调用后终止
    pub sentinel_termination: Option<bool>,
}

impl AppConfig {
    /// 按 profile 补齐默认值后的终止策略
    pub fn termination_policy(&self) -> TerminationPolicy {
        let (default_cap, default_sentinel) = match self.app.profile {
            Profile::Quiz => (None, true),
            Profile::Finance => (Some(3), false),
        };
        TerminationPolicy::new(
            self.orchestration.max_tool_rounds.or(default_cap),
            self.orchestration.sentinel_termination.unwrap_or(default_sentinel),
        )
    }
}

/// 从 config 目录加载配置，环境变量 QUIZ__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 QUIZ__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("QUIZ")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

const QUIZ_PROMPT: &str = "You are Question Generator Agent, an assistant that creates quiz questions in Czech \
and stores them in a database with tables topics(id, name UNIQUE, description) and questions(id, topic_id, \
question_text). Use the SQL tools to look up and save topics and questions, get_text_from_wikipedia to learn \
about a topic, and exit_program when the user wants to quit.";

const FINANCE_PROMPT: &str = "You are a helpful assistant. Use get_etc_balance_by_address to look up Ethereum \
Classic balances and get_info_from_web_search for live data such as exchange rates. Answer concisely.";

/// 读取 system prompt：显式路径 > config/prompts/<profile>.txt > 内置默认
pub fn load_system_prompt(app: &AppSection) -> String {
    if let Some(path) = &app.system_prompt_path {
        match std::fs::read_to_string(path) {
            Ok(text) => return text,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "system prompt file unreadable, using default"),
        }
    }
    let name = app.profile.name();
    [
        format!("config/prompts/{name}.txt"),
        format!("../config/prompts/{name}.txt"),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .unwrap_or_else(|| match app.profile {
        Profile::Quiz => QUIZ_PROMPT.to_string(),
        Profile::Finance => FINANCE_PROMPT.to_string(),
    })
}
