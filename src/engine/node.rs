//! 节点命名与分类
//!
//! 两类节点：Agent 节点（按角色名命名）与其配对的工具节点（`{role}/tools`）。
//! 静态迁移表只是默认值；不在表中的节点合法，可经路由指令到达。

/// 节点名
pub type NodeName = String;

const TOOL_SUFFIX: &str = "/tools";

/// 角色的 Agent 节点名
pub fn agent_node(role: &str) -> NodeName {
    role.to_string()
}

/// 角色配对的工具节点名
pub fn tool_node(role: &str) -> NodeName {
    format!("{role}{TOOL_SUFFIX}")
}

/// 节点种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Agent 推理节点（携带角色名）
    Agent(String),
    /// 工具执行节点（携带所属角色名）
    Tools(String),
}

/// 按命名约定判定节点种类
pub fn classify(node: &str) -> NodeKind {
    match node.strip_suffix(TOOL_SUFFIX) {
        Some(owner) => NodeKind::Tools(owner.to_string()),
        None => NodeKind::Agent(node.to_string()),
    }
}
