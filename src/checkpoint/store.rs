//! 检查点存储抽象层
//!
//! 每次节点执行后保存一个带版本的会话快照；旧版本只被更高版本取代，从不删除，
//! 支持按时间点恢复与审计。内存与 SQLite 两种实现语义一致，由配置选择。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::EngineError;
use crate::session::Snapshot;

/// 一个检查点：(会话 ID, 版本) 唯一确定
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    /// 严格递增（等于保存时的迭代计数）
    pub version: u64,
    pub snapshot: Snapshot,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
}

/// 检查点存储接口
///
/// 并发约定：不同会话 ID 的写入可并发；同一会话的写入由「每会话单循环」保证串行。
/// 读取方不得观察到写了一半的检查点。
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 保存快照；同一 (session_id, version) 重复保存为幂等覆盖
    async fn save(
        &self,
        session_id: &str,
        version: u64,
        snapshot: Snapshot,
    ) -> Result<(), EngineError>;

    /// 读取最新版本的检查点
    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, EngineError>;

    /// 读取指定版本的检查点
    async fn load(&self, session_id: &str, version: u64)
        -> Result<Option<Checkpoint>, EngineError>;

    /// 会话的全部版本号（升序）
    async fn versions(&self, session_id: &str) -> Result<Vec<u64>, EngineError>;

    /// 删除一个会话的全部检查点（父会话标记委派完成后，子会话可独立回收）
    async fn purge_session(&self, session_id: &str) -> Result<usize, EngineError>;
}

/// 内存检查点存储：session_id -> (version -> Checkpoint)
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: RwLock<HashMap<String, BTreeMap<u64, Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(
        &self,
        session_id: &str,
        version: u64,
        snapshot: Snapshot,
    ) -> Result<(), EngineError> {
        let checkpoint = Checkpoint {
            session_id: session_id.to_string(),
            version,
            snapshot,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.inner
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert(version, checkpoint);
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, EngineError> {
        Ok(self
            .inner
            .read()
            .await
            .get(session_id)
            .and_then(|versions| versions.values().next_back().cloned()))
    }

    async fn load(
        &self,
        session_id: &str,
        version: u64,
    ) -> Result<Option<Checkpoint>, EngineError> {
        Ok(self
            .inner
            .read()
            .await
            .get(session_id)
            .and_then(|versions| versions.get(&version).cloned()))
    }

    async fn versions(&self, session_id: &str) -> Result<Vec<u64>, EngineError> {
        Ok(self
            .inner
            .read()
            .await
            .get(session_id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn purge_session(&self, session_id: &str) -> Result<usize, EngineError> {
        Ok(self
            .inner
            .write()
            .await
            .remove(session_id)
            .map(|versions| versions.len())
            .unwrap_or(0))
    }
}

/// 创建检查点存储
///
/// backend 为 "sqlite" 且提供 db_path 时使用持久化存储；失败时回退到内存实现
pub fn create_checkpoint_store(
    backend: &str,
    db_path: Option<&std::path::Path>,
) -> Arc<dyn CheckpointStore> {
    if backend.eq_ignore_ascii_case("sqlite") {
        if let Some(path) = db_path {
            match super::sqlite::SqliteCheckpointStore::open(path) {
                Ok(store) => {
                    tracing::info!("Using sqlite checkpoint store: {:?}", path);
                    return Arc::new(store);
                }
                Err(e) => {
                    tracing::warn!("Failed to open sqlite store, falling back to memory: {}", e);
                }
            }
        } else {
            tracing::warn!("Sqlite checkpoint backend requested without db_path, using memory");
        }
    }
    tracing::info!("Using in-memory checkpoint store");
    Arc::new(MemoryCheckpointStore::new())
}
