//! 路由引擎
//!
//! route(当前节点, 节点产出) -> 下一步决定。
//! 产出中携带路由指令时无条件改道（动态覆盖）；否则查静态迁移表：
//! Agent 节点有工具请求 -> 配对工具节点，无请求 -> 终态；工具节点 -> 所属 Agent 节点。
//! 路由是纯函数：给定相同输入必然得到相同决定（检查点重放的前提）。

use std::collections::HashMap;

use crate::engine::node::{agent_node, classify, tool_node, NodeKind, NodeName};

/// 路由指令：数据驱动的下一节点覆盖（瞬态控制数据，不进入消息历史）
#[derive(Debug, Clone)]
pub struct RoutingDirective {
    pub target: NodeName,
    /// 可选的共享状态补丁（浅合并进会话 state）
    pub patch: Option<serde_json::Value>,
}

/// 节点执行的产出（供路由使用的投影）
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// Agent 节点：发出的工具请求数量与可能的指令
    Agent {
        tool_requests: usize,
        directive: Option<RoutingDirective>,
    },
    /// 工具节点：可能的指令（委派动作被识别时产生）
    Tools { directive: Option<RoutingDirective> },
}

/// 路由决定
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// 按静态边继续
    Continue(NodeName),
    /// 指令改道（附带可选状态补丁）
    Goto {
        target: NodeName,
        patch: Option<serde_json::Value>,
    },
    /// 终态：Agent 产出纯文本回答
    Terminal,
}

/// 路由引擎：静态迁移表 + 指令覆盖
#[derive(Debug, Default)]
pub struct Router {
    /// 节点 -> 默认后继；缺省时按命名约定推导
    table: HashMap<NodeName, NodeName>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明一条静态边（覆盖命名约定的默认后继）
    pub fn with_edge(mut self, from: impl Into<NodeName>, to: impl Into<NodeName>) -> Self {
        self.table.insert(from.into(), to.into());
        self
    }

    /// 计算下一步
    pub fn route(&self, current: &str, output: &StepOutput) -> RouteDecision {
        // 指令无条件优先；目标节点无需任何静态边声明
        let directive = match output {
            StepOutput::Agent { directive, .. } | StepOutput::Tools { directive } => directive,
        };
        if let Some(d) = directive {
            return RouteDecision::Goto {
                target: d.target.clone(),
                patch: d.patch.clone(),
            };
        }

        match output {
            StepOutput::Agent { tool_requests: 0, .. } => RouteDecision::Terminal,
            StepOutput::Agent { .. } => {
                let next = self
                    .table
                    .get(current)
                    .cloned()
                    .unwrap_or_else(|| tool_node(current));
                RouteDecision::Continue(next)
            }
            StepOutput::Tools { .. } => {
                let next = self.table.get(current).cloned().unwrap_or_else(|| {
                    match classify(current) {
                        NodeKind::Tools(owner) => agent_node(&owner),
                        NodeKind::Agent(owner) => agent_node(&owner),
                    }
                });
                RouteDecision::Continue(next)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent_output(requests: usize) -> StepOutput {
        StepOutput::Agent {
            tool_requests: requests,
            directive: None,
        }
    }

    #[test]
    fn test_agent_without_requests_is_terminal() {
        let router = Router::new();
        assert_eq!(
            router.route("supervisor", &agent_output(0)),
            RouteDecision::Terminal
        );
    }

    #[test]
    fn test_agent_with_requests_goes_to_paired_tool_node() {
        let router = Router::new();
        assert_eq!(
            router.route("supervisor", &agent_output(2)),
            RouteDecision::Continue("supervisor/tools".into())
        );
    }

    #[test]
    fn test_tool_node_returns_to_owner() {
        let router = Router::new();
        let output = StepOutput::Tools { directive: None };
        assert_eq!(
            router.route("supervisor/tools", &output),
            RouteDecision::Continue("supervisor".into())
        );
    }

    #[test]
    fn test_directive_overrides_static_edge() {
        let router = Router::new().with_edge("supervisor", "supervisor/tools");
        let output = StepOutput::Agent {
            tool_requests: 3,
            directive: Some(RoutingDirective {
                target: "researcher".into(),
                patch: Some(json!({"topic": "rust"})),
            }),
        };
        match router.route("supervisor", &output) {
            RouteDecision::Goto { target, patch } => {
                assert_eq!(target, "researcher");
                assert_eq!(patch.unwrap()["topic"], "rust");
            }
            other => panic!("Expected Goto, got {:?}", other),
        }
    }

    #[test]
    fn test_directive_even_without_requests() {
        // 指令不依赖工具请求存在与否
        let router = Router::new();
        let output = StepOutput::Tools {
            directive: Some(RoutingDirective {
                target: "coder".into(),
                patch: None,
            }),
        };
        assert!(matches!(
            router.route("supervisor/tools", &output),
            RouteDecision::Goto { .. }
        ));
    }

    #[test]
    fn test_declared_edge_overrides_convention() {
        let router = Router::new().with_edge("reviewer", "auditor/tools");
        assert_eq!(
            router.route("reviewer", &agent_output(1)),
            RouteDecision::Continue("auditor/tools".into())
        );
    }

    #[test]
    fn test_routing_is_deterministic() {
        // 重放：同一输入多次路由必须得到相同决定
        let router = Router::new();
        let output = agent_output(1);
        let first = router.route("supervisor", &output);
        for _ in 0..10 {
            assert_eq!(router.route("supervisor", &output), first);
        }
    }
}
