//! SQLite 检查点存储（同步 rusqlite）
//!
//! 单表 checkpoints，(session_id, version) 为主键；快照序列化为 JSON 文本。
//! 连接由异步 Mutex 保护，单条读写都很短，同一会话的写入本就串行。

use std::path::Path;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::checkpoint::store::{Checkpoint, CheckpointStore};
use crate::core::EngineError;
use crate::session::Snapshot;

/// SQLite 实现：与内存实现语义一致，进程重启后仍可恢复
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// 打开（或创建）数据库并建表
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let conn = Connection::open(db_path).map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                snapshot TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (session_id, version)
            )",
            [],
        )
        .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, u64, String, i64)> {
        Ok((
            row.get(0)?,
            row.get::<_, i64>(1)? as u64,
            row.get(2)?,
            row.get(3)?,
        ))
    }

    fn decode(
        (session_id, version, snapshot, created_at): (String, u64, String, i64),
    ) -> Result<Checkpoint, EngineError> {
        let snapshot: Snapshot = serde_json::from_str(&snapshot)
            .map_err(|e| EngineError::Checkpoint(format!("corrupt snapshot: {e}")))?;
        Ok(Checkpoint {
            session_id,
            version,
            snapshot,
            created_at,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(
        &self,
        session_id: &str,
        version: u64,
        snapshot: Snapshot,
    ) -> Result<(), EngineError> {
        let payload = serde_json::to_string(&snapshot)
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        let created_at = chrono::Utc::now().timestamp_millis();

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints (session_id, version, snapshot, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![session_id, version as i64, payload, created_at],
        )
        .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, version, snapshot, created_at FROM checkpoints
                 WHERE session_id = ?1 ORDER BY version DESC LIMIT 1",
            )
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        let row = stmt
            .query_row([session_id], Self::row_to_checkpoint)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(EngineError::Checkpoint(other.to_string())),
            })?;
        row.map(Self::decode).transpose()
    }

    async fn load(
        &self,
        session_id: &str,
        version: u64,
    ) -> Result<Option<Checkpoint>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, version, snapshot, created_at FROM checkpoints
                 WHERE session_id = ?1 AND version = ?2",
            )
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        let row = stmt
            .query_row(
                rusqlite::params![session_id, version as i64],
                Self::row_to_checkpoint,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(EngineError::Checkpoint(other.to_string())),
            })?;
        row.map(Self::decode).transpose()
    }

    async fn versions(&self, session_id: &str) -> Result<Vec<u64>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT version FROM checkpoints WHERE session_id = ?1 ORDER BY version ASC",
            )
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        let versions = stmt
            .query_map([session_id], |row| row.get::<_, i64>(0).map(|v| v as u64))
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        Ok(versions)
    }

    async fn purge_session(&self, session_id: &str) -> Result<usize, EngineError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM checkpoints WHERE session_id = ?1",
            [session_id],
        )
        .map_err(|e| EngineError::Checkpoint(e.to_string()))
    }
}
