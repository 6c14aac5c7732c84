//! 题库存储：外部关系库的最小访问契约
//!
//! 核心只通过 QuizStore::execute 访问存储；驱动层故障在存储边界被捕获为 QueryOutcome::Error，
//! 不以 Err 形式向上抛出。

pub mod sqlite;

use serde::Serialize;
use serde_json::{Map, Value};

pub use sqlite::{initialize_database, SqliteQuizStore};

/// 一次查询的统一结果信封
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    /// 读语句：结果行（列名 -> 值）
    Rows(Vec<Map<String, Value>>),
    /// 写语句
    Write {
        affected_rows: usize,
        last_inserted_id: i64,
    },
    Error { error: String },
}

impl QueryOutcome {
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error { error: msg.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// 关系存储：execute(sql, params) -> 行 / 写结果 / 错误
///
/// 同步接口；异步调用方通过 spawn_blocking 使用。
pub trait QuizStore: Send + Sync {
    fn execute(&self, sql: &str, params: &[Value]) -> QueryOutcome;
}

/// 表结构（topics / questions + 外键索引）
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);
CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL,
    question_text TEXT NOT NULL,
    FOREIGN KEY (topic_id) REFERENCES topics (id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_questions_topic ON questions(topic_id);
";
