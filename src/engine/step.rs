//! Agent 步执行器
//!
//! 包装一次「推理 + 工具请求」往返：按角色拼指令、在超时内调用 LLM。
//! 超时按「该次调用失败」处理（LlmTimeout），由执行循环告知下一轮 Agent，
//! 不会直接中止会话。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::core::EngineError;
use crate::delegation::RoleRegistry;
use crate::llm::{AgentReply, LlmClient};
use crate::session::Message;
use crate::tools::{delegate_args_schema_json, ToolExecutionUnit};

/// Agent 步执行器：持有 LLM 与单次调用超时
pub struct AgentStepExecutor {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl AgentStepExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            llm,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一步：以角色指令调用 LLM，返回结构化回复
    pub async fn run_step(
        &self,
        role_name: &str,
        roles: &RoleRegistry,
        tools: &ToolExecutionUnit,
        history: &[Message],
    ) -> Result<AgentReply, EngineError> {
        roles
            .get(role_name)
            .ok_or_else(|| EngineError::UnknownRole(role_name.to_string()))?;
        let instructions = self.compose_instructions(role_name, roles, tools);

        tracing::debug!(role = role_name, "agent step");
        match timeout(self.timeout, self.llm.invoke(&instructions, history)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(EngineError::Llm(e)),
            Err(_) => Err(EngineError::LlmTimeout(self.timeout.as_secs())),
        }
    }

    /// 拼接调用指令：角色指令 + 工具清单 + 请求协议 +（可委派角色）delegate 说明
    fn compose_instructions(
        &self,
        role_name: &str,
        roles: &RoleRegistry,
        tools: &ToolExecutionUnit,
    ) -> String {
        let role = match roles.get(role_name) {
            Some(r) => r,
            None => return String::new(),
        };
        let mut instructions = role.instructions.clone();

        let descriptions = tools.tool_descriptions();
        if !descriptions.is_empty() {
            instructions.push_str("\n\nAvailable tools:\n");
            for (name, desc) in descriptions {
                instructions.push_str(&format!("- {}: {}\n", name, desc));
            }
        }

        instructions.push_str(
            "\nTo call tools, reply with exactly one JSON object: \
            {\"requests\": [{\"action\": \"name\", \"args\": {...}}]}. \
            Reply with plain text to give your final answer.",
        );

        if role.can_delegate {
            let workers = roles.worker_names().join(", ");
            instructions.push_str(&format!(
                "\n\nTo hand a sub-task to a worker, request the \"delegate\" action. \
                Available workers: {}. Args schema:\n{}",
                workers,
                delegate_args_schema_json()
            ));
        }

        instructions
    }
}
