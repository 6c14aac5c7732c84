//! 记忆层：对话日志与会话检查点（内存 / 文件 / SQLite）

pub mod checkpoint;
pub mod conversation;
pub mod persistence;
pub mod sqlite_checkpoint;

pub use checkpoint::{CheckpointError, CheckpointStore, MemoryCheckpointStore, SessionSnapshot};
pub use conversation::{ConversationLog, FunctionCall, LogError, Message, Role, WireToolCall};
pub use persistence::FileCheckpointStore;
pub use sqlite_checkpoint::SqliteCheckpointStore;
