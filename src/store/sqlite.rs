//! SQLite 题库实现（rusqlite）
//!
//! 单连接 + Mutex；每个连接都打开外键约束，使 questions 随 topics 级联删除。
//! 是否为读语句按预编译后的结果列数判断（SELECT / WITH / PRAGMA 都算读）。
//! 等锁时间由 busy_timeout 限定，超时的语句在驱动内失败，不会留下半完成的写入。

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::{QueryOutcome, QuizStore, SCHEMA_SQL};

/// 单条语句等待数据库锁的上限
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// 打开或初始化存储时的故障（运维可见，不进入对话）
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// 初始化数据库文件：已存在且不强制时保留；强制时删除后重建。返回是否新建了表结构。
pub fn initialize_database(path: impl AsRef<Path>, force_recreate: bool) -> Result<bool, StoreError> {
    let path = path.as_ref();
    if path.exists() {
        if !force_recreate {
            tracing::debug!(path = %path.display(), "quiz database already exists");
            return Ok(false);
        }
        tracing::info!(path = %path.display(), "removing quiz database for recreation");
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA_SQL)?;
    tracing::info!(path = %path.display(), "quiz database created");
    Ok(true)
}

pub struct SqliteQuizStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteQuizStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// 内存库（测试用），自动建表
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<QueryOutcome, rusqlite::Error> {
        let conn = match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut stmt = conn.prepare(sql)?;
        let bound = params.iter().map(to_sql_value);

        if stmt.column_count() > 0 {
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(bound))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut obj = Map::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    obj.insert(name.clone(), from_sql_ref(row.get_ref(i)?));
                }
                out.push(obj);
            }
            Ok(QueryOutcome::Rows(out))
        } else {
            let affected_rows = stmt.execute(params_from_iter(bound))?;
            Ok(QueryOutcome::Write {
                affected_rows,
                last_inserted_id: conn.last_insert_rowid(),
            })
        }
    }
}

impl QuizStore for SqliteQuizStore {
    fn execute(&self, sql: &str, params: &[Value]) -> QueryOutcome {
        match self.run(sql, params) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "store query failed");
                QueryOutcome::error(e.to_string())
            }
        }
    }
}

fn to_sql_value(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let store = SqliteQuizStore::open_in_memory().unwrap();
        let out = store.execute(
            "INSERT INTO topics (name, description) VALUES (?1, ?2)",
            &[json!("kočka"), json!("domácí zvíře")],
        );
        assert_eq!(
            out,
            QueryOutcome::Write {
                affected_rows: 1,
                last_inserted_id: 1
            }
        );

        let out = store.execute(
            "INSERT INTO questions (topic_id, question_text) VALUES (1, 'Kolik má kočka nohou?'), (1, 'Co jí kočka?')",
            &[],
        );
        assert!(matches!(out, QueryOutcome::Write { affected_rows: 2, .. }));

        match store.execute("SELECT id, name, description FROM topics", &[]) {
            QueryOutcome::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0]["name"], "kočka");
                assert_eq!(rows[0]["id"], 1);
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn test_lock_wait_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quiz.db");
        initialize_database(&path, false).unwrap();
        let store = SqliteQuizStore::open(&path).unwrap();
        match store.execute("PRAGMA busy_timeout", &[]) {
            QueryOutcome::Rows(rows) => {
                let ms = rows[0].values().next().and_then(Value::as_u64);
                assert_eq!(ms, Some(BUSY_TIMEOUT.as_millis() as u64));
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_select_returns_no_rows() {
        let store = SqliteQuizStore::open_in_memory().unwrap();
        assert_eq!(store.execute("SELECT * FROM topics", &[]), QueryOutcome::Rows(vec![]));
    }

    #[test]
    fn test_driver_fault_is_contained() {
        let store = SqliteQuizStore::open_in_memory().unwrap();
        let out = store.execute("SELECT * FROM no_such_table", &[]);
        assert!(out.is_error());
        let v = serde_json::to_value(&out).unwrap();
        assert!(v["error"].as_str().unwrap().contains("no_such_table"));

        store.execute("INSERT INTO topics (name) VALUES ('a')", &[]);
        let dup = store.execute("INSERT INTO topics (name) VALUES ('a')", &[]);
        assert!(dup.is_error());
    }

    #[test]
    fn test_cascade_delete() {
        let store = SqliteQuizStore::open_in_memory().unwrap();
        store.execute("INSERT INTO topics (name) VALUES ('astronomie')", &[]);
        store.execute("INSERT INTO questions (topic_id, question_text) VALUES (1, 'Co je kometa?')", &[]);
        store.execute("DELETE FROM topics WHERE id = 1", &[]);
        assert_eq!(
            store.execute("SELECT * FROM questions", &[]),
            QueryOutcome::Rows(vec![])
        );
        // 外键约束：不存在的 topic
        let orphan = store.execute(
            "INSERT INTO questions (topic_id, question_text) VALUES (42, 'x')",
            &[],
        );
        assert!(orphan.is_error());
    }

    #[test]
    fn test_initialize_respects_force_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quiz_database.db");
        assert!(initialize_database(&path, false).unwrap());
        {
            let store = SqliteQuizStore::open(&path).unwrap();
            store.execute("INSERT INTO topics (name) VALUES ('x')", &[]);
        }
        assert!(!initialize_database(&path, false).unwrap());
        let store = SqliteQuizStore::open(&path).unwrap();
        assert!(matches!(store.execute("SELECT * FROM topics", &[]), QueryOutcome::Rows(r) if r.len() == 1));
        drop(store);

        assert!(initialize_database(&path, true).unwrap());
        let store = SqliteQuizStore::open(&path).unwrap();
        assert_eq!(store.execute("SELECT * FROM topics", &[]), QueryOutcome::Rows(vec![]));
    }
}
