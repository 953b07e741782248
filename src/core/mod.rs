//! 核心层：错误与恢复、会话监管

pub mod error;
pub mod recovery;
pub mod supervisor;

pub use error::{EngineError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use supervisor::SessionSupervisor;
