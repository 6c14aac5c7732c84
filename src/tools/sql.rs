//! 题库 SQL 工具：查询主题 / 查询问题 / 插入问题 / 新建主题并插入问题
//!
//! 存储调用是同步的，统一经 spawn_blocking 执行。
//! 新建主题 + 问题是两条语句：先插主题，失败则不执行第二条；成功后把问题语句里的 [topic_id]
//! 占位符替换为新主题 ID 再执行。问题插入失败时不回滚已创建的主题，结果中会注明主题 ID。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::{QueryOutcome, QuizStore};
use crate::tools::ToolFailure;

/// 问题插入语句中代表新主题 ID 的占位符
pub const TOPIC_ID_PLACEHOLDER: &str = "[topic_id]";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SqlQueryArgs {
    /// SQL query to execute against the quiz database
    pub sql_query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TopicWithQuestionsArgs {
    /// INSERT statement creating the topic row
    pub insert_query_topic: String,
    /// INSERT statement for the questions; write the literal token [topic_id] (without quotes) where the new topic id belongs
    pub insert_query_questions: String,
}

/// 在阻塞线程池中执行一条语句
async fn run_blocking(store: &Arc<dyn QuizStore>, sql: &str) -> QueryOutcome {
    let store = store.clone();
    let sql = sql.to_string();
    match tokio::task::spawn_blocking(move || store.execute(&sql, &[])).await {
        Ok(outcome) => outcome,
        Err(e) => QueryOutcome::error(format!("store task failed: {e}")),
    }
}

fn first_keyword(sql: &str) -> String {
    sql.trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// 查询类工具只接受读语句
pub async fn select(store: &Arc<dyn QuizStore>, args: SqlQueryArgs) -> Result<Value, ToolFailure> {
    let keyword = first_keyword(&args.sql_query);
    if keyword != "SELECT" && keyword != "WITH" {
        return Err(ToolFailure::invalid_arguments(format!(
            "only SELECT queries are allowed here, got '{keyword}'"
        )));
    }
    tracing::debug!(sql = %args.sql_query, "select query");
    match run_blocking(store, &args.sql_query).await {
        QueryOutcome::Rows(rows) => Ok(Value::Array(rows.into_iter().map(Value::Object).collect())),
        QueryOutcome::Error { error } => Err(ToolFailure::handler_failed(error)),
        QueryOutcome::Write { .. } => Err(ToolFailure::handler_failed("query returned no result set")),
    }
}

pub async fn insert_questions(store: &Arc<dyn QuizStore>, args: SqlQueryArgs) -> Result<Value, ToolFailure> {
    if first_keyword(&args.sql_query) != "INSERT" {
        return Err(ToolFailure::invalid_arguments("only INSERT statements are allowed here"));
    }
    tracing::debug!(sql = %args.sql_query, "insert questions");
    write_outcome(run_blocking(store, &args.sql_query).await)
}

fn write_outcome(outcome: QueryOutcome) -> Result<Value, ToolFailure> {
    match outcome {
        QueryOutcome::Write {
            affected_rows,
            last_inserted_id,
        } => Ok(json!({
            "affected_rows": affected_rows,
            "last_inserted_id": last_inserted_id,
        })),
        QueryOutcome::Error { error } => Err(ToolFailure::handler_failed(error)),
        QueryOutcome::Rows(_) => Err(ToolFailure::handler_failed("statement returned rows, expected a write")),
    }
}

/// 把新主题 ID 写入问题语句。
///
/// 文本替换绕过了参数绑定；语句来源不可信时应改为带类型的参数绑定，只需改这里。
pub fn bind_topic_id(statement: &str, topic_id: i64) -> String {
    statement.replace(TOPIC_ID_PLACEHOLDER, &topic_id.to_string())
}

pub async fn insert_topic_with_questions(
    store: &Arc<dyn QuizStore>,
    args: TopicWithQuestionsArgs,
) -> Result<Value, ToolFailure> {
    let topic_id = match run_blocking(store, &args.insert_query_topic).await {
        QueryOutcome::Write { last_inserted_id, .. } => last_inserted_id,
        QueryOutcome::Error { error } => {
            tracing::warn!(error = %error, "topic insert failed");
            return Err(ToolFailure::handler_failed(format!("creating topic failed: {error}")));
        }
        QueryOutcome::Rows(_) => {
            return Err(ToolFailure::handler_failed("topic statement returned rows, expected an INSERT"));
        }
    };
    tracing::info!(topic_id, "topic created");

    let questions_sql = bind_topic_id(&args.insert_query_questions, topic_id);
    tracing::debug!(sql = %questions_sql, "insert questions for new topic");

    match run_blocking(store, &questions_sql).await {
        QueryOutcome::Write { affected_rows, .. } => Ok(json!({
            "topic_id": topic_id,
            "affected_rows": affected_rows,
        })),
        QueryOutcome::Error { error } => {
            tracing::warn!(topic_id, error = %error, "questions insert failed, topic kept");
            Err(ToolFailure::handler_failed(format!(
                "topic was created with ID {topic_id}, but inserting questions failed: {error}"
            )))
        }
        QueryOutcome::Rows(_) => Err(ToolFailure::handler_failed(format!(
            "topic was created with ID {topic_id}, but the questions statement returned rows"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 记录收到的语句并按顺序返回预设结果
    struct RecordingStore {
        seen: Mutex<Vec<String>>,
        replies: Mutex<Vec<QueryOutcome>>,
    }

    impl RecordingStore {
        fn new(mut replies: Vec<QueryOutcome>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                replies: Mutex::new(replies),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl QuizStore for RecordingStore {
        fn execute(&self, sql: &str, _params: &[Value]) -> QueryOutcome {
            self.seen.lock().unwrap().push(sql.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| QueryOutcome::error("no scripted reply"))
        }
    }

    fn topic_args() -> TopicWithQuestionsArgs {
        TopicWithQuestionsArgs {
            insert_query_topic: "INSERT INTO topics (name) VALUES ('kočka')".into(),
            insert_query_questions:
                "INSERT INTO questions (topic_id, question_text) VALUES ([topic_id], 'a'), ([topic_id], 'b')"
                    .into(),
        }
    }

    #[test]
    fn test_bind_topic_id_replaces_every_placeholder() {
        let sql = bind_topic_id("VALUES ([topic_id], 'x'), ([topic_id], 'y')", 7);
        assert_eq!(sql, "VALUES (7, 'x'), (7, 'y')");
        assert!(!sql.contains(TOPIC_ID_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_topic_id_substituted_into_child_statement() {
        let store = RecordingStore::new(vec![
            QueryOutcome::Write {
                affected_rows: 1,
                last_inserted_id: 7,
            },
            QueryOutcome::Write {
                affected_rows: 2,
                last_inserted_id: 12,
            },
        ]);
        let dyn_store: Arc<dyn QuizStore> = store.clone();
        let out = insert_topic_with_questions(&dyn_store, topic_args()).await.unwrap();
        assert_eq!(out, json!({"topic_id": 7, "affected_rows": 2}));

        let seen = store.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            "INSERT INTO questions (topic_id, question_text) VALUES (7, 'a'), (7, 'b')"
        );
    }

    #[tokio::test]
    async fn test_parent_failure_skips_child() {
        let store = RecordingStore::new(vec![QueryOutcome::error("UNIQUE constraint failed: topics.name")]);
        let dyn_store: Arc<dyn QuizStore> = store.clone();
        let err = insert_topic_with_questions(&dyn_store, topic_args()).await.unwrap_err();
        assert!(matches!(err, ToolFailure::HandlerFailed { .. }));
        assert!(err.message().contains("UNIQUE"));
        assert_eq!(store.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_child_failure_reports_created_topic() {
        let store = RecordingStore::new(vec![
            QueryOutcome::Write {
                affected_rows: 1,
                last_inserted_id: 3,
            },
            QueryOutcome::error("no such column: question"),
        ]);
        let dyn_store: Arc<dyn QuizStore> = store.clone();
        let err = insert_topic_with_questions(&dyn_store, topic_args()).await.unwrap_err();
        assert!(err.message().contains("ID 3"));
        assert_eq!(store.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_select_rejects_writes() {
        let store = RecordingStore::new(vec![]);
        let dyn_store: Arc<dyn QuizStore> = store.clone();
        let err = select(
            &dyn_store,
            SqlQueryArgs {
                sql_query: "DELETE FROM topics".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolFailure::InvalidArguments { .. }));
        assert!(store.seen().is_empty());
    }

    #[tokio::test]
    async fn test_select_against_sqlite() {
        let sqlite = crate::store::SqliteQuizStore::open_in_memory().unwrap();
        sqlite.execute("INSERT INTO topics (name, description) VALUES ('astronomie', 'hvězdy')", &[]);
        let store: Arc<dyn QuizStore> = Arc::new(sqlite);
        let rows = select(
            &store,
            SqlQueryArgs {
                sql_query: "select * from topics".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(rows[0]["name"], "astronomie");

        let err = select(
            &store,
            SqlQueryArgs {
                sql_query: "SELECT * FROM nope".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolFailure::HandlerFailed { .. }));
    }

    #[tokio::test]
    async fn test_insert_questions_reports_counts() {
        let store: Arc<dyn QuizStore> = Arc::new(crate::store::SqliteQuizStore::open_in_memory().unwrap());
        store.execute("INSERT INTO topics (name) VALUES ('x')", &[]);
        let out = insert_questions(
            &store,
            SqlQueryArgs {
                sql_query: "INSERT INTO questions (topic_id, question_text) VALUES (1, 'q1'), (1, 'q2')".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out["affected_rows"], 2);
        assert_eq!(out["last_inserted_id"], 2);
    }
}
