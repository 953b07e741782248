//! 检查点层：带版本的会话快照持久化（内存 / SQLite）

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteCheckpointStore;
pub use store::{create_checkpoint_store, Checkpoint, CheckpointStore, MemoryCheckpointStore};
