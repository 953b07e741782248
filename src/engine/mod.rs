//! 执行引擎：节点、路由、Agent 步、执行循环与事件广播

pub mod events;
pub mod loop_;
pub mod node;
pub mod router;
pub mod step;

pub use events::{EngineEvent, EventBus, EventStream, OverflowPolicy, TerminalOutcome};
pub use loop_::{Engine, EngineConfig, SessionOutcome};
pub use node::{agent_node, classify, tool_node, NodeKind, NodeName};
pub use router::{RouteDecision, Router, RoutingDirective, StepOutput};
pub use step::AgentStepExecutor;
