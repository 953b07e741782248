//! 引擎集成测试：单步终态、委派 fan-out/fan-in、关联恢复、迭代上限与恢复运行

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use hive::checkpoint::MemoryCheckpointStore;
use hive::core::{EngineError, SessionSupervisor};
use hive::delegation::{RoleRegistry, RoleSpec, SameRolePolicy};
use hive::engine::{Engine, EngineConfig, EngineEvent, TerminalOutcome};
use hive::llm::{AgentReply, LlmClient, ScriptedLlmClient};
use hive::session::{Message, Snapshot, ToolRequest};
use hive::tools::{EchoTool, ToolRegistry};
use hive::SessionOutcome;

/// 包一层调用计数，用于断言 LLM 被调用的精确次数
struct CountingLlm {
    inner: Box<dyn LlmClient>,
    calls: AtomicUsize,
}

impl CountingLlm {
    fn new(inner: impl LlmClient + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Box::new(inner),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for CountingLlm {
    async fn invoke(&self, instructions: &str, history: &[Message]) -> Result<AgentReply, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.invoke(instructions, history).await
    }
}

/// 第一轮给出委派请求，之后的调用永远挂起（用于测取消传播）
struct StallAfterFirst {
    first: AgentReply,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for StallAfterFirst {
    async fn invoke(&self, _instructions: &str, _history: &[Message]) -> Result<AgentReply, String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(self.first.clone());
        }
        futures_util::future::pending::<()>().await;
        unreachable!()
    }
}

fn build_engine(llm: Arc<dyn LlmClient>, cfg: EngineConfig) -> Arc<Engine> {
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);
    let roles = RoleRegistry::new(
        RoleSpec::new("supervisor", "You coordinate workers.").delegating(),
    )
    .with_worker(RoleSpec::new("researcher", "You find facts."))
    .with_worker(RoleSpec::new("coder", "You write code."));
    Arc::new(Engine::new(
        llm,
        tools,
        roles,
        Arc::new(MemoryCheckpointStore::new()),
        cfg,
    ))
}

fn delegate_request(id: &str, worker: &str, task: &str) -> ToolRequest {
    ToolRequest::new("delegate", json!({"worker": worker, "task": task})).with_id(id)
}

async fn latest_snapshot(engine: &Arc<Engine>, session_id: &str) -> Snapshot {
    engine
        .store()
        .load_latest(session_id)
        .await
        .unwrap()
        .expect("checkpoint must exist")
        .snapshot
}

fn tool_results(snapshot: &Snapshot) -> Vec<&hive::session::ToolResult> {
    snapshot
        .messages
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { result } => Some(result),
            _ => None,
        })
        .collect()
}

fn issued_requests(snapshot: &Snapshot) -> usize {
    snapshot
        .messages
        .iter()
        .map(|m| match m {
            Message::Agent { tool_requests, .. } => tool_requests.len(),
            _ => 0,
        })
        .sum()
}

// 场景 A：无工具调用的单步任务恰好一次 Agent 执行后终态
#[tokio::test]
async fn scenario_a_single_step_terminates() {
    let llm = CountingLlm::new(ScriptedLlmClient::new(vec![AgentReply::answer(
        "Paris.",
    )]));
    let engine = build_engine(llm.clone(), EngineConfig::default());

    let (session_id, outcome) = engine
        .run_task("capital of France?", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Completed { answer: "Paris.".into() });
    assert_eq!(llm.calls(), 1);

    let snapshot = latest_snapshot(&engine, &session_id).await;
    assert_eq!(snapshot.iteration, 1);
    // 终态时不存在未回应的工具请求
    assert_eq!(issued_requests(&snapshot), 0);
    assert!(tool_results(&snapshot).is_empty());
}

// 场景 B：一次委派产生子会话、其 Agent 至少执行一次、父会话注入非空结果
#[tokio::test]
async fn scenario_b_single_delegation() {
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
        AgentReply::with_requests(
            "delegating",
            vec![delegate_request("c1", "researcher", "find one fact")],
        ),
        AgentReply::answer("The fact is: water boils at 100C."),
        AgentReply::answer("Done: water boils at 100C."),
    ]));
    let engine = build_engine(llm, EngineConfig::default());
    let mut events = engine.subscribe();

    let (session_id, outcome) = engine
        .run_task("find one fact", CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));

    // 父会话：恰好一条结果，关联 ID 是原请求的，内容非空
    let snapshot = latest_snapshot(&engine, &session_id).await;
    let results = tool_results(&snapshot);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "c1");
    assert!(results[0].success);
    assert!(!results[0].content.is_empty());
    // 双射：发出请求数 == 结果数
    assert_eq!(issued_requests(&snapshot), results.len());
    // 委派步对父会话迭代计数的贡献恰好为 1（agent + tools + agent = 3）
    assert_eq!(snapshot.iteration, 3);

    // 子会话：事件里拿到 ID，有独立检查点且 Agent 至少执行过一次
    let mut sub_id = None;
    while let Some(event) = events.try_recv() {
        if let EngineEvent::DelegationStarted { sub_session_id, .. } = event {
            sub_id = Some(sub_session_id);
        }
    }
    let sub_id = sub_id.expect("delegation_started event");
    assert!(sub_id.starts_with(&format!("{session_id}/researcher_")));
    let sub_snapshot = latest_snapshot(&engine, &sub_id).await;
    assert!(sub_snapshot.iteration >= 1);
    assert!(sub_snapshot
        .messages
        .iter()
        .any(|m| matches!(m, Message::Agent { .. })));
}

// fan-out/fan-in：同一输出里的 N 条委派全部完成后父会话才恢复，恰好 N 条结果
#[tokio::test]
async fn fan_out_fan_in_two_workers() {
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
        AgentReply::with_requests(
            "delegating twice",
            vec![
                delegate_request("c1", "researcher", "find a fact"),
                delegate_request("c2", "coder", "write a snippet"),
            ],
        ),
        AgentReply::answer("worker report"),
        AgentReply::answer("worker report"),
        AgentReply::answer("combined"),
    ]));
    let engine = build_engine(llm, EngineConfig::default());
    let mut events = engine.subscribe();

    let (session_id, outcome) = engine
        .run_task("two sub-tasks", CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));

    let snapshot = latest_snapshot(&engine, &session_id).await;
    let results = tool_results(&snapshot);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "c1");
    assert_eq!(results[1].id, "c2");

    // 两条结果都出现在最后一条 Agent 消息之前（父会话在全部完成后才恢复）
    let last_agent_idx = snapshot
        .messages
        .iter()
        .rposition(|m| matches!(m, Message::Agent { .. }))
        .unwrap();
    let result_positions: Vec<usize> = snapshot
        .messages
        .iter()
        .enumerate()
        .filter(|(_, m)| matches!(m, Message::ToolResult { .. }))
        .map(|(i, _)| i)
        .collect();
    assert!(result_positions.iter().all(|&i| i < last_agent_idx));

    // 两个兄弟子会话的检查点命名空间互不相同
    let mut sub_ids = Vec::new();
    while let Some(event) = events.try_recv() {
        if let EngineEvent::DelegationStarted { sub_session_id, .. } = event {
            sub_ids.push(sub_session_id);
        }
    }
    assert_eq!(sub_ids.len(), 2);
    assert_ne!(sub_ids[0], sub_ids[1]);
    for sub_id in &sub_ids {
        assert!(engine.store().load_latest(sub_id).await.unwrap().is_some());
    }
    // 清理一个子会话的检查点不影响另一个
    engine.store().purge_session(&sub_ids[0]).await.unwrap();
    assert!(engine.store().load_latest(&sub_ids[0]).await.unwrap().is_none());
    assert!(engine.store().load_latest(&sub_ids[1]).await.unwrap().is_some());
}

// 同名角色并发委派：serialized 策略下同样得到每请求一条结果
#[tokio::test]
async fn same_role_serialized_policy() {
    let cfg = EngineConfig {
        same_role_policy: SameRolePolicy::Serialized,
        ..EngineConfig::default()
    };
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
        AgentReply::with_requests(
            "two for one role",
            vec![
                delegate_request("c1", "researcher", "fact one"),
                delegate_request("c2", "researcher", "fact two"),
            ],
        ),
        AgentReply::answer("first"),
        AgentReply::answer("second"),
        AgentReply::answer("both done"),
    ]));
    let engine = build_engine(llm, cfg);

    let (session_id, outcome) = engine
        .run_task("two facts", CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));

    let snapshot = latest_snapshot(&engine, &session_id).await;
    let results = tool_results(&snapshot);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
}

// 委派给未知角色：合成失败结果，会话不中止
#[tokio::test]
async fn unknown_worker_yields_failure_result() {
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
        AgentReply::with_requests(
            "bad role",
            vec![delegate_request("c1", "ghost", "anything")],
        ),
        AgentReply::answer("adjusted"),
    ]));
    let engine = build_engine(llm, EngineConfig::default());

    let (session_id, outcome) = engine
        .run_task("delegate to ghost", CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));

    let snapshot = latest_snapshot(&engine, &session_id).await;
    let results = tool_results(&snapshot);
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0].content.contains("unknown worker role"));
}

// 场景 C：损坏的关联触发恰好一次 Agent 重试（不是零次也不是两次）
#[tokio::test]
async fn scenario_c_correlation_error_retries_once() {
    let llm = CountingLlm::new(ScriptedLlmClient::new(vec![
        AgentReply::with_requests(
            "duplicate ids",
            vec![
                ToolRequest::new("echo", json!({"text": "a"})).with_id("dup"),
                ToolRequest::new("echo", json!({"text": "b"})).with_id("dup"),
            ],
        ),
        AgentReply::answer("well-formed now"),
    ]));
    let engine = build_engine(llm.clone(), EngineConfig::default());

    let (session_id, outcome) = engine
        .run_task("task", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::Completed { answer: "well-formed now".into() }
    );
    // 一次原始调用 + 恰好一次重试
    assert_eq!(llm.calls(), 2);

    // 损坏批次未进入历史
    let snapshot = latest_snapshot(&engine, &session_id).await;
    assert_eq!(issued_requests(&snapshot), 0);
}

// 子会话撞上迭代上限：父会话收到显式的未完成结果，而非伪造成功
#[tokio::test]
async fn delegation_abort_surfaces_incomplete() {
    let cfg = EngineConfig {
        max_iterations: 2,
        ..EngineConfig::default()
    };
    // 主管先委派；工人每轮都请求 echo，永不给出纯文本回答 -> 撞上限
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
        AgentReply::with_requests(
            "delegating",
            vec![delegate_request("c1", "researcher", "impossible task")],
        ),
        AgentReply::with_requests("looping", vec![ToolRequest::new("echo", json!({"text": "x"}))]),
        AgentReply::with_requests("looping", vec![ToolRequest::new("echo", json!({"text": "x"}))]),
        AgentReply::answer("acknowledged the failure"),
    ]));
    let engine = build_engine(llm, cfg);

    let (session_id, outcome) = engine
        .run_task("delegate the impossible", CancellationToken::new())
        .await
        .unwrap();
    // 父会话自身也受上限约束：迭代 2 步后中止
    assert!(matches!(
        outcome,
        SessionOutcome::Aborted { .. } | SessionOutcome::Completed { .. }
    ));

    let snapshot = latest_snapshot(&engine, &session_id).await;
    let results = tool_results(&snapshot);
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0].content.contains("incomplete"));
}

// 场景 D：上限 3、永不产出纯文本 -> 恰好第 3 次迭代中止，3 个检查点
#[tokio::test]
async fn scenario_d_ceiling_aborts_with_three_checkpoints() {
    let cfg = EngineConfig {
        max_iterations: 3,
        ..EngineConfig::default()
    };
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::repeating(
        AgentReply::with_requests("loop", vec![ToolRequest::new("echo", json!({"text": "x"}))]),
    ));
    let engine = build_engine(llm, cfg);
    let mut events = engine.subscribe();

    let (session_id, outcome) = engine
        .run_task("never finish", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, SessionOutcome::Aborted { iterations: 3 });

    let versions = engine.store().versions(&session_id).await.unwrap();
    assert_eq!(versions, vec![1, 2, 3]);

    // 终态事件是 aborted，不是 answered
    let mut saw_aborted = false;
    while let Some(event) = events.try_recv() {
        if let EngineEvent::Terminal { outcome, .. } = event {
            assert_eq!(outcome, TerminalOutcome::Aborted);
            saw_aborted = true;
        }
    }
    assert!(saw_aborted);

    // 中止会话的历史仍保持双射
    let snapshot = latest_snapshot(&engine, &session_id).await;
    assert_eq!(issued_requests(&snapshot), tool_results(&snapshot).len());
}

// 从最新检查点恢复一个已中止的会话：决定一致（仍然 Aborted），不再调用 LLM
#[tokio::test]
async fn resume_aborted_session_is_deterministic() {
    let cfg = EngineConfig {
        max_iterations: 2,
        ..EngineConfig::default()
    };
    let llm = CountingLlm::new(ScriptedLlmClient::repeating(AgentReply::with_requests(
        "loop",
        vec![ToolRequest::new("echo", json!({"text": "x"}))],
    )));
    let engine = build_engine(llm.clone(), cfg);

    let (session_id, outcome) = engine
        .run_task("never finish", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, SessionOutcome::Aborted { iterations: 2 });
    let calls_before = llm.calls();

    let resumed = engine
        .resume_session(&session_id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resumed, SessionOutcome::Aborted { iterations: 2 });
    assert_eq!(llm.calls(), calls_before);
}

// 取消根会话传播到所有活跃子会话，循环以 Cancelled 结束
#[tokio::test]
async fn cancel_propagates_to_sub_sessions() {
    let llm: Arc<dyn LlmClient> = Arc::new(StallAfterFirst {
        first: AgentReply::with_requests(
            "delegating",
            vec![delegate_request("c1", "researcher", "slow task")],
        ),
        calls: AtomicUsize::new(0),
    });
    let engine = build_engine(llm, EngineConfig::default());
    let mut events = engine.subscribe();

    let supervisor = SessionSupervisor::new();
    let token = supervisor.cancel_token();

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_task("task", token).await })
    };

    // 等到子会话启动后再取消根
    loop {
        match events.recv().await {
            Some(EngineEvent::DelegationStarted { .. }) => break,
            Some(_) => continue,
            None => panic!("event stream closed early"),
        }
    }
    supervisor.cancel();

    let err = runner.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}
