//! Mock LLM 客户端（用于测试与无 API Key 场景）
//!
//! MockLlmClient 直接回显最后一条任务输入为最终回答；
//! ScriptedLlmClient 按预设脚本逐次出牌，供集成测试驱动完整的委派流程。

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{AgentReply, LlmClient};
use crate::session::Message;

/// Mock 客户端：回显用户最后一条消息，不发任何工具请求
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(&self, _instructions: &str, history: &[Message]) -> Result<AgentReply, String> {
        let last_user = history
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::User { content } => Some(content.as_str()),
                _ => None,
            })
            .unwrap_or("(no input)");
        Ok(AgentReply::answer(format!("Echo from Mock: {}", last_user)))
    }
}

/// 脚本客户端：每次 invoke 弹出一条预设回复；脚本耗尽后返回固定收尾回答
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<AgentReply>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<AgentReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }

    /// 永远发同一条回复（用于测死循环/迭代上限场景）
    pub fn repeating(reply: AgentReply) -> RepeatingLlmClient {
        RepeatingLlmClient { reply }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(&self, _instructions: &str, _history: &[Message]) -> Result<AgentReply, String> {
        Ok(self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| AgentReply::answer("(script exhausted)")))
    }
}

/// 每次都返回同一条回复的客户端
pub struct RepeatingLlmClient {
    reply: AgentReply,
}

#[async_trait]
impl LlmClient for RepeatingLlmClient {
    async fn invoke(&self, _instructions: &str, _history: &[Message]) -> Result<AgentReply, String> {
        let mut reply = self.reply.clone();
        // 重复出牌也不能复用关联 ID，否则会话内唯一性被破坏
        for req in &mut reply.tool_requests {
            req.id = crate::session::new_correlation_id();
        }
        Ok(reply)
    }
}
