//! 引擎错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：关联错误触发一次 Agent 节点重试，LLM 超时作为该次调用的失败
//! 反馈给下一轮，其余（存储、传输、取消）对当前会话致命并上抛。

use thiserror::Error;

use crate::session::CorrelationError;

/// 引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum EngineError {
    /// 关联校验失败（请求/结果配对损坏，且本地重试已用尽）
    #[error("Correlation violation: {0}")]
    Correlation(#[from] CorrelationError),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("LLM call timed out after {0}s")]
    LlmTimeout(u64),

    #[error("Checkpoint store failure: {0}")]
    Checkpoint(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Unknown worker role: {0}")]
    UnknownRole(String),

    #[error("Delegation task failed: {0}")]
    Delegation(String),

    #[error("Session cancelled")]
    Cancelled,
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 注入纠正提示并重新执行当前 Agent 节点（仅一次）
    RetryAgentStep(String),
    /// 将失败以 System 消息告知下一轮 Agent，循环继续
    NoteToAgent(String),
    /// 终止当前会话并上抛
    Abort,
}
