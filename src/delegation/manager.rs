//! 委派管理器
//!
//! 识别 delegate 动作：为每条委派请求创建隔离的子会话（System 角色指令 + User 任务 +
//! 父会话共享状态），全部启动后再统一等待（fan-out/fan-in），父循环在所有子会话
//! 报告完成前保持挂起。每条请求恰好合成一条 ToolResult，关联 ID 取自原请求；
//! 子会话撞上迭代上限时结果明确标记未完成，绝不伪造成功。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::engine::events::{preview, EngineEvent};
use crate::engine::loop_::{Engine, SessionOutcome};
use crate::engine::node::agent_node;
use crate::session::{Session, ToolRequest, ToolResult};

/// 委派动作名：工具请求的 action 等于它时走委派而非内联执行
pub const DELEGATE_ACTION: &str = "delegate";

/// delegate 动作的参数
#[derive(Debug, Deserialize)]
pub struct DelegateArgs {
    /// 目标工人角色
    pub worker: String,
    /// 子任务描述
    pub task: String,
}

/// 同名角色并发委派策略（配置项）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameRolePolicy {
    /// 各自独立子会话，完全并行（默认）
    Independent,
    /// 同一角色的多条委派按请求顺序串行
    Serialized,
}

/// 一条已规划的委派：子会话已创建并播种
struct Planned {
    correlation_id: String,
    worker: String,
    session: Session,
}

/// 执行一批委派请求，返回与请求同序的结果列表
///
/// 所有子会话在父循环挂起前启动；父循环只在全部完成后恢复。
///
/// Returns an explicitly boxed future (rather than `async fn`) to break the
/// recursive opaque-future cycle run_session -> run_delegations -> spawn ->
/// run_session, which otherwise defeats rustc's auto-trait Send inference.
pub(crate) fn run_delegations<'a>(
    engine: &'a Arc<Engine>,
    parent: &'a Session,
    owner_role: &'a str,
    requests: &'a [ToolRequest],
    cancel: &'a CancellationToken,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Vec<ToolResult>> + Send + 'a>> {
    Box::pin(run_delegations_inner(
        engine, parent, owner_role, requests, cancel,
    ))
}

async fn run_delegations_inner(
    engine: &Arc<Engine>,
    parent: &Session,
    owner_role: &str,
    requests: &[ToolRequest],
    cancel: &CancellationToken,
) -> Vec<ToolResult> {
    let mut resolved: HashMap<String, ToolResult> = HashMap::new();
    let mut planned: Vec<Planned> = Vec::new();

    let can_delegate = engine
        .roles
        .get(owner_role)
        .map(|r| r.can_delegate)
        .unwrap_or(false);

    for req in requests {
        if !can_delegate {
            resolved.insert(
                req.id.clone(),
                ToolResult::failure(
                    &req.id,
                    format!("Error: role '{owner_role}' is not permitted to delegate"),
                ),
            );
            continue;
        }
        let args: DelegateArgs = match serde_json::from_value(req.args.clone()) {
            Ok(args) => args,
            Err(e) => {
                resolved.insert(
                    req.id.clone(),
                    ToolResult::failure(&req.id, format!("Error: bad delegate args: {e}")),
                );
                continue;
            }
        };
        let role = match engine.roles.get(&args.worker) {
            Some(role) => role,
            None => {
                resolved.insert(
                    req.id.clone(),
                    ToolResult::failure(
                        &req.id,
                        format!(
                            "Error: unknown worker role '{}'; available: {}",
                            args.worker,
                            engine.roles.worker_names().join(", ")
                        ),
                    ),
                );
                continue;
            }
        };

        let mut session = Session::sub(&parent.id, &role.name, agent_node(&role.name));
        session.state = parent.state.clone();
        session.push(crate::session::Message::system(&role.instructions));
        session.push(crate::session::Message::user(&args.task));

        engine.events.emit(EngineEvent::DelegationStarted {
            session_id: parent.id.clone(),
            sub_session_id: session.id.clone(),
            worker: role.name.clone(),
            correlation_id: req.id.clone(),
        });
        tracing::info!(
            parent = %parent.id,
            sub = %session.id,
            worker = %role.name,
            "delegation started"
        );

        planned.push(Planned {
            correlation_id: req.id.clone(),
            worker: role.name.clone(),
            session,
        });
    }

    // 分组：independent 每条一组全并行；serialized 同角色并入一组组内串行
    let mut groups: Vec<Vec<Planned>> = Vec::new();
    match engine.cfg.same_role_policy {
        SameRolePolicy::Independent => {
            groups.extend(planned.into_iter().map(|p| vec![p]));
        }
        SameRolePolicy::Serialized => {
            let mut by_role: HashMap<String, usize> = HashMap::new();
            for p in planned {
                match by_role.get(&p.worker).copied() {
                    Some(idx) => groups[idx].push(p),
                    None => {
                        by_role.insert(p.worker.clone(), groups.len());
                        groups.push(vec![p]);
                    }
                }
            }
        }
    }

    // fan-out：先全部 spawn，再统一 fan-in
    let mut handles = Vec::with_capacity(groups.len());
    let mut group_ids: Vec<Vec<(String, String, String)>> = Vec::with_capacity(groups.len());
    for group in groups {
        group_ids.push(
            group
                .iter()
                .map(|p| {
                    (
                        p.correlation_id.clone(),
                        p.worker.clone(),
                        p.session.id.clone(),
                    )
                })
                .collect(),
        );
        let engine = Arc::clone(engine);
        let token = cancel.child_token();
        handles.push(tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(group.len());
            for p in group {
                let mut session = p.session;
                let result = engine.run_session(&mut session, token.clone()).await;
                outcomes.push((p.correlation_id, p.worker, session.id, result));
            }
            outcomes
        }));
    }

    for (joined, ids) in join_all(handles).await.into_iter().zip(group_ids) {
        match joined {
            Ok(outcomes) => {
                for (correlation_id, worker, sub_id, result) in outcomes {
                    let tool_result =
                        summarize_outcome(&correlation_id, &worker, &sub_id, result);
                    engine.events.emit(EngineEvent::DelegationCompleted {
                        session_id: parent.id.clone(),
                        sub_session_id: sub_id,
                        worker,
                        correlation_id: correlation_id.clone(),
                        success: tool_result.success,
                    });
                    resolved.insert(correlation_id, tool_result);
                }
            }
            Err(e) => {
                // 子会话任务 panic：对该组的每条委派合成失败结果
                for (correlation_id, worker, sub_id) in ids {
                    tracing::error!(sub = %sub_id, "delegation task panicked: {e}");
                    engine.events.emit(EngineEvent::DelegationCompleted {
                        session_id: parent.id.clone(),
                        sub_session_id: sub_id,
                        worker: worker.clone(),
                        correlation_id: correlation_id.clone(),
                        success: false,
                    });
                    resolved.insert(
                        correlation_id.clone(),
                        ToolResult::failure(
                            &correlation_id,
                            format!("Error: worker '{worker}' task crashed: {e}"),
                        ),
                    );
                }
            }
        }
    }

    // 按原请求顺序返回
    requests
        .iter()
        .map(|req| {
            resolved.remove(&req.id).unwrap_or_else(|| {
                ToolResult::failure(&req.id, "Error: delegation produced no result")
            })
        })
        .collect()
}

/// 将子会话终态浓缩为父会话可见的 ToolResult（含检查点指针）
fn summarize_outcome(
    correlation_id: &str,
    worker: &str,
    sub_id: &str,
    result: Result<SessionOutcome, crate::core::EngineError>,
) -> ToolResult {
    match result {
        Ok(SessionOutcome::Completed { answer }) => ToolResult::ok(
            correlation_id,
            format!(
                "worker '{}' completed: {} [transcript: checkpoint session {}]",
                worker,
                preview(&answer),
                sub_id
            ),
        ),
        Ok(SessionOutcome::Aborted { iterations }) => ToolResult::failure(
            correlation_id,
            format!(
                "worker '{}' did not finish: ran out of steps after {} iterations, task incomplete \
                [partial transcript: checkpoint session {}]",
                worker, iterations, sub_id
            ),
        ),
        Err(e) => ToolResult::failure(
            correlation_id,
            format!("worker '{worker}' failed: {e} [transcript: checkpoint session {sub_id}]"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_outcome_is_marked_incomplete() {
        let result = summarize_outcome(
            "c1",
            "researcher",
            "session_x/researcher_ab",
            Ok(SessionOutcome::Aborted { iterations: 25 }),
        );
        assert!(!result.success);
        assert!(result.content.contains("incomplete"));
        assert!(result.content.contains("25"));
    }

    #[test]
    fn test_completed_outcome_carries_pointer() {
        let result = summarize_outcome(
            "c1",
            "researcher",
            "session_x/researcher_ab",
            Ok(SessionOutcome::Completed {
                answer: "the fact".into(),
            }),
        );
        assert!(result.success);
        assert!(result.content.contains("session_x/researcher_ab"));
        assert!(result.content.contains("the fact"));
    }

    #[test]
    fn test_delegate_args_parse() {
        let args: DelegateArgs = serde_json::from_value(serde_json::json!({
            "worker": "researcher",
            "task": "find one fact"
        }))
        .unwrap();
        assert_eq!(args.worker, "researcher");
        assert_eq!(args.task, "find one fact");
    }
}
