//! 文件检查点
//!
//! 每个会话一个 JSON 文件（{dir}/{session_id}.json）。写入先落到同目录临时文件再 rename，
//! 进程中途退出时旧快照保持完整。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::memory::checkpoint::{validate_session_id, CheckpointError, CheckpointStore, SessionSnapshot};

#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, session_id: &str) -> Result<PathBuf, CheckpointError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), CheckpointError> {
        let path = self.snapshot_path(&snapshot.session_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let data = serde_json::to_vec_pretty(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(path = %path.display(), messages = snapshot.messages.len(), "checkpoint written");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<SessionSnapshot, CheckpointError> {
        let path = self.snapshot_path(session_id)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(session_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    async fn clear(&self, session_id: &str) -> Result<(), CheckpointError> {
        let path = self.snapshot_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
