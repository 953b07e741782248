//! 消息模型：系统指令、任务输入、Agent 输出与工具结果
//!
//! 会话内消息只追加不修改；Agent 输出可携带若干 ToolRequest，
//! 每个 ToolRequest 的 correlation id 在会话内唯一，且必须被恰好一条 ToolResult 回应。

use serde::{Deserialize, Serialize};

/// 关联 ID：把一次工具请求与它的结果配对（会话内唯一，非空）
pub type CorrelationId = String;

/// 生成新的关联 ID（`call_` 前缀 + uuid）
pub fn new_correlation_id() -> CorrelationId {
    format!("call_{}", uuid::Uuid::new_v4())
}

/// 工具请求：仅由 Agent 步产生
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolRequest {
    /// 关联 ID（会话内唯一）
    pub id: CorrelationId,
    /// 动作名（如 echo、delegate）
    pub action: String,
    /// 结构化参数
    pub args: serde_json::Value,
}

impl ToolRequest {
    pub fn new(action: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: new_correlation_id(),
            action: action.into(),
            args,
        }
    }

    /// 指定关联 ID（LLM 已提供 id 时使用）
    pub fn with_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.id = id.into();
        self
    }
}

/// 工具结果：由工具执行单元或（委派动作）委派管理器产生
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// 必须引用一条未回应的 ToolRequest
    pub id: CorrelationId,
    pub content: String,
    pub success: bool,
}

impl ToolResult {
    pub fn ok(id: impl Into<CorrelationId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            success: true,
        }
    }

    pub fn failure(id: impl Into<CorrelationId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            success: false,
        }
    }
}

/// 会话内的一条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// 系统指令（角色 prompt）
    System { content: String },
    /// 用户/任务输入
    User { content: String },
    /// Agent 输出，可携带 0..N 条工具请求
    Agent {
        content: String,
        #[serde(default)]
        tool_requests: Vec<ToolRequest>,
    },
    /// 工具结果
    ToolResult { result: ToolResult },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn agent(content: impl Into<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self::Agent {
            content: content.into(),
            tool_requests,
        }
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self::ToolResult { result }
    }

    /// 消息正文（ToolResult 取其 content）
    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Agent { content, .. } => content,
            Self::ToolResult { result } => &result.content,
        }
    }
}
