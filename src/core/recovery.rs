//! 错误恢复引擎
//!
//! 根据 EngineError 类型返回 RecoveryAction，供执行循环决定是重试当前节点、
//! 把失败告知 Agent 还是终止会话。

use crate::core::{EngineError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &EngineError) -> RecoveryAction {
        match err {
            EngineError::Correlation(e) => RecoveryAction::RetryAgentStep(format!(
                "上一轮的工具请求关联标识损坏: {e}。\
                请重新生成工具请求：每条请求必须携带会话内唯一且非空的 id，\
                不得复用历史请求的 id。"
            )),
            EngineError::LlmTimeout(secs) => RecoveryAction::NoteToAgent(format!(
                "The previous model call timed out after {secs}s. \
                Answer with what is already available, or retry with a simpler request."
            )),
            _ => RecoveryAction::Abort,
        }
    }
}
