//! 会话层：消息模型、关联校验、会话与快照

pub mod correlation;
pub mod message;
pub mod session;

pub use correlation::{validate_requests, validate_results, CorrelationError};
pub use message::{new_correlation_id, CorrelationId, Message, ToolRequest, ToolResult};
pub use session::{Session, SessionId, Snapshot};
