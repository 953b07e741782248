//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / 脚本）实现 LlmClient：
//! invoke(角色指令, 消息历史) -> { 文本, 工具请求列表 }。
//! LLM 是不透明依赖：可能慢、可能不确定，引擎不在此层做重试。

use async_trait::async_trait;

use crate::session::{Message, ToolRequest};

/// 一次 Agent 推理的产出：回复文本与 0..N 条工具请求
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    pub text: String,
    pub tool_requests: Vec<ToolRequest>,
}

impl AgentReply {
    /// 纯文本回复（终态：不含任何工具请求）
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_requests: Vec::new(),
        }
    }

    pub fn with_requests(text: impl Into<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            text: text.into(),
            tool_requests,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 以指定角色指令调用模型，返回结构化回复
    async fn invoke(&self, instructions: &str, history: &[Message]) -> Result<AgentReply, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
