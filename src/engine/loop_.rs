//! 执行循环控制器
//!
//! 每会话一个状态机：Ready -> Running(node) -> {Ready(next) | Terminal | Aborted}。
//! 每步：执行当前节点 -> 路由 -> 迭代计数 +1 -> 存检查点 -> 查迭代上限。
//! 终态：Agent 产出不含工具请求也不含路由指令；中止：计数撞上上限，
//! 以显式的「步数用尽」结果上报，绝不静默截断。

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointStore;
use crate::core::{EngineError, RecoveryAction, RecoveryEngine};
use crate::delegation::{run_delegations, RoleRegistry, SameRolePolicy, DELEGATE_ACTION};
use crate::engine::events::{
    preview, EngineEvent, EventBus, EventStream, OverflowPolicy, TerminalOutcome,
};
use crate::engine::node::{agent_node, classify, NodeKind};
use crate::engine::router::{RouteDecision, Router, RoutingDirective, StepOutput};
use crate::engine::step::AgentStepExecutor;
use crate::llm::LlmClient;
use crate::session::{
    validate_requests, validate_results, Message, Session, SessionId, ToolRequest, ToolResult,
};
use crate::tools::{ToolExecutionUnit, ToolRegistry};

/// 引擎配置（从 AppConfig 提取的运行参数）
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 全局迭代上限（可按角色覆盖）
    pub max_iterations: u32,
    /// 单次 LLM 调用超时（秒）
    pub agent_timeout_secs: u64,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 同名角色并发委派策略
    pub same_role_policy: SameRolePolicy,
    /// 每个事件订阅者的缓冲容量
    pub event_capacity: usize,
    /// 事件缓冲溢出策略
    pub event_overflow: OverflowPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            agent_timeout_secs: 60,
            tool_timeout_secs: 30,
            same_role_policy: SameRolePolicy::Independent,
            event_capacity: 256,
            event_overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// 会话终局：回答 / 步数用尽。三种结局（回答、放弃、崩溃）中
/// 前两种在此区分，崩溃走 Err(EngineError)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Agent 产出纯文本回答
    Completed { answer: String },
    /// 撞上迭代上限（task 未完成，不伪造回答）
    Aborted { iterations: u32 },
}

/// 编排引擎：LLM 步执行器、工具单元、路由、角色、检查点与事件总线的集束
///
/// 每个会话的循环独占推进该会话；多个子会话循环可并发，唯一共享可变资源是检查点存储。
pub struct Engine {
    pub(crate) step: AgentStepExecutor,
    pub(crate) tools: ToolExecutionUnit,
    pub(crate) roles: RoleRegistry,
    pub(crate) router: Router,
    pub(crate) store: Arc<dyn CheckpointStore>,
    pub(crate) events: EventBus,
    pub(crate) recovery: RecoveryEngine,
    pub(crate) cfg: EngineConfig,
}

impl Engine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        roles: RoleRegistry,
        store: Arc<dyn CheckpointStore>,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            step: AgentStepExecutor::new(llm, cfg.agent_timeout_secs),
            tools: ToolExecutionUnit::new(tools, cfg.tool_timeout_secs),
            roles,
            router: Router::new(),
            store,
            events: EventBus::new(cfg.event_capacity, cfg.event_overflow),
            recovery: RecoveryEngine::new(),
            cfg,
        }
    }

    /// 声明一条静态路由边（默认边按命名约定推导，无需声明）
    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.router = std::mem::take(&mut self.router).with_edge(from, to);
        self
    }

    /// 订阅执行事件流
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// 以主管角色新建根会话并运行一个任务
    pub async fn run_task(
        self: &Arc<Self>,
        task: &str,
        cancel: CancellationToken,
    ) -> Result<(SessionId, SessionOutcome), EngineError> {
        let supervisor = self.roles.supervisor();
        let mut session = Session::root(agent_node(&supervisor.name));
        session.push(Message::system(&supervisor.instructions));
        session.push(Message::user(task));
        let outcome = self.run_session(&mut session, cancel).await?;
        Ok((session.id, outcome))
    }

    /// 从最新检查点恢复一个会话并继续运行
    pub async fn resume_session(
        self: &Arc<Self>,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, EngineError> {
        let checkpoint = self
            .store
            .load_latest(session_id)
            .await?
            .ok_or_else(|| {
                EngineError::Checkpoint(format!("no checkpoint for session {session_id}"))
            })?;
        let mut session = Session::from_snapshot(session_id.to_string(), checkpoint.snapshot);
        self.run_session(&mut session, cancel).await
    }

    /// 驱动一个会话直到终态 / 中止 / 出错
    pub async fn run_session(
        self: &Arc<Self>,
        session: &mut Session,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, EngineError> {
        let owner = match classify(&session.node) {
            NodeKind::Agent(role) | NodeKind::Tools(role) => role,
        };
        let ceiling = self
            .roles
            .get(&owner)
            .and_then(|r| r.max_iterations)
            .unwrap_or(self.cfg.max_iterations);
        // 关联错误的本地重试额度：一次；校验通过后恢复
        let mut correlation_retried = false;

        loop {
            if cancel.is_cancelled() {
                self.emit_error(session, "cancelled");
                return Err(EngineError::Cancelled);
            }
            if session.iteration >= ceiling {
                tracing::warn!(session = %session.id, ceiling, "iteration ceiling reached");
                self.events.emit(EngineEvent::Terminal {
                    session_id: session.id.clone(),
                    outcome: TerminalOutcome::Aborted,
                });
                return Ok(SessionOutcome::Aborted {
                    iterations: session.iteration,
                });
            }

            let node = session.node.clone();
            self.events.emit(EngineEvent::StepStarted {
                session_id: session.id.clone(),
                node: node.clone(),
                iteration: session.iteration,
            });

            let output = match classify(&node) {
                NodeKind::Agent(role) => {
                    match self
                        .run_agent_node(session, &role, &cancel, &mut correlation_retried)
                        .await?
                    {
                        Some(output) => output,
                        // 本步已被恢复动作消化（重试提示 / 超时注记），直接进下一轮
                        None => continue,
                    }
                }
                NodeKind::Tools(owner) => {
                    self.run_tool_node(session, &owner, &cancel, &mut correlation_retried)
                        .await?
                }
            };

            let decision = self.router.route(&node, &output);
            session.iteration += 1;
            // 先应用路由再存检查点：恢复运行从「下一个节点」继续，不会重放已执行的节点
            match &decision {
                RouteDecision::Terminal => {}
                RouteDecision::Continue(next) => session.node = next.clone(),
                RouteDecision::Goto { target, patch } => {
                    if let Some(patch) = patch {
                        session.apply_state_patch(patch);
                    }
                    session.node = target.clone();
                }
            }
            self.save_checkpoint(session).await?;

            if matches!(decision, RouteDecision::Terminal) {
                let answer = session.last_agent_content().unwrap_or_default().to_string();
                self.events.emit(EngineEvent::Terminal {
                    session_id: session.id.clone(),
                    outcome: TerminalOutcome::Answered,
                });
                tracing::info!(session = %session.id, iterations = session.iteration, "session completed");
                return Ok(SessionOutcome::Completed { answer });
            }
        }
    }

    /// 执行 Agent 节点；返回 None 表示本步被恢复动作消化（已计迭代并存检查点）
    async fn run_agent_node(
        self: &Arc<Self>,
        session: &mut Session,
        role: &str,
        cancel: &CancellationToken,
        correlation_retried: &mut bool,
    ) -> Result<Option<StepOutput>, EngineError> {
        let reply = tokio::select! {
            _ = cancel.cancelled() => {
                self.emit_error(session, "cancelled");
                return Err(EngineError::Cancelled);
            }
            r = self.step.run_step(role, &self.roles, &self.tools, &session.messages) => r,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                self.emit_error(session, &err.to_string());
                return match self.recovery.handle(&err) {
                    RecoveryAction::NoteToAgent(note) => {
                        tracing::warn!(session = %session.id, "agent call failed for this step: {err}");
                        session.push(Message::system(note));
                        session.iteration += 1;
                        self.save_checkpoint(session).await?;
                        Ok(None)
                    }
                    _ => Err(err),
                };
            }
        };

        // 请求侧关联校验：空 id / 批内重复 / 与历史重复，都在进入历史前拒绝
        let seen = session.issued_ids();
        if let Err(e) = validate_requests(&seen, &reply.tool_requests) {
            let err = EngineError::from(e);
            self.emit_error(session, &err.to_string());
            if *correlation_retried {
                return Err(err);
            }
            *correlation_retried = true;
            return match self.recovery.handle(&err) {
                RecoveryAction::RetryAgentStep(prompt) => {
                    tracing::warn!(session = %session.id, "malformed tool requests, retrying agent step once");
                    session.push(Message::user(prompt));
                    session.iteration += 1;
                    self.save_checkpoint(session).await?;
                    Ok(None)
                }
                _ => Err(err),
            };
        }
        *correlation_retried = false;

        let request_count = reply.tool_requests.len();
        self.events.emit(EngineEvent::AgentOutput {
            session_id: session.id.clone(),
            node: session.node.clone(),
            preview: preview(&reply.text),
            request_count,
        });
        session.push(Message::agent(reply.text, reply.tool_requests));
        Ok(Some(StepOutput::Agent {
            tool_requests: request_count,
            directive: None,
        }))
    }

    /// 执行工具节点：普通请求并发执行，委派请求 fan-out/fan-in；结果校验后按请求顺序入历史
    async fn run_tool_node(
        self: &Arc<Self>,
        session: &mut Session,
        owner: &str,
        cancel: &CancellationToken,
        correlation_retried: &mut bool,
    ) -> Result<StepOutput, EngineError> {
        let pending: Vec<ToolRequest> = session
            .pending_requests()
            .into_iter()
            .cloned()
            .collect();
        let (delegations, ordinary): (Vec<ToolRequest>, Vec<ToolRequest>) = pending
            .iter()
            .cloned()
            .partition(|r| r.action == DELEGATE_ACTION);

        for req in &ordinary {
            self.events.emit(EngineEvent::ToolInvoked {
                session_id: session.id.clone(),
                correlation_id: req.id.clone(),
                action: req.action.clone(),
            });
        }
        let ordinary_results = if ordinary.is_empty() {
            Vec::new()
        } else {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.emit_error(session, "cancelled");
                    return Err(EngineError::Cancelled);
                }
                results = self.tools.execute_batch(&ordinary) => results,
            }
        };

        let had_delegations = !delegations.is_empty();
        let delegation_results = if had_delegations {
            run_delegations(self, session, owner, &delegations, cancel).await
        } else {
            Vec::new()
        };

        // 结果侧关联校验：对到达的原始批次检查双射，损坏的批次整体拒绝，不进入历史
        let mut merged = ordinary_results;
        merged.extend(delegation_results);
        let refs: Vec<&ToolRequest> = pending.iter().collect();
        match validate_results(&refs, &merged) {
            Ok(()) => {
                *correlation_retried = false;
                // 恢复原请求顺序后入历史
                let mut by_id: HashMap<String, ToolResult> =
                    merged.into_iter().map(|r| (r.id.clone(), r)).collect();
                for req in &pending {
                    if let Some(result) = by_id.remove(&req.id) {
                        self.append_result(session, result);
                    }
                }
            }
            Err(e) => {
                let err = EngineError::from(e);
                self.emit_error(session, &err.to_string());
                if *correlation_retried {
                    return Err(err);
                }
                *correlation_retried = true;
                tracing::warn!(session = %session.id, "malformed tool results rejected: {err}");
                // 为每条未回应请求合成失败结果：保持双射成立，并让 Agent 节点重试一次
                for req in &pending {
                    let result = ToolResult::failure(
                        &req.id,
                        "Error: the tool layer returned a malformed result batch; retry or adjust",
                    );
                    self.append_result(session, result);
                }
            }
        }

        Ok(StepOutput::Tools {
            directive: had_delegations.then(|| RoutingDirective {
                target: agent_node(owner),
                patch: None,
            }),
        })
    }

    fn append_result(&self, session: &mut Session, result: ToolResult) {
        self.events.emit(EngineEvent::ToolResult {
            session_id: session.id.clone(),
            correlation_id: result.id.clone(),
            success: result.success,
            preview: preview(&result.content),
        });
        session.push(Message::tool_result(result));
    }

    fn emit_error(&self, session: &Session, text: &str) {
        self.events.emit(EngineEvent::Error {
            session_id: session.id.clone(),
            text: text.to_string(),
        });
    }

    async fn save_checkpoint(&self, session: &Session) -> Result<(), EngineError> {
        self.store
            .save(&session.id, session.iteration as u64, session.snapshot())
            .await
    }
}
