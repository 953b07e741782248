//! Hive 演示入口
//!
//! 加载配置，组装引擎（LLM + 工具 + 角色 + 检查点存储），
//! 把命令行参数作为任务交给主管角色运行，事件流打印到终端。

use std::sync::Arc;

use hive::checkpoint::create_checkpoint_store;
use hive::config::load_config;
use hive::core::SessionSupervisor;
use hive::delegation::{RoleRegistry, RoleSpec};
use hive::engine::Engine;
use hive::llm::{LlmClient, MockLlmClient, OpenAiClient};
use hive::session::SessionId;
use hive::tools::{EchoTool, ToolRegistry};
use hive::SessionOutcome;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let task = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let task = if task.is_empty() {
        "Introduce yourself in one sentence.".to_string()
    } else {
        task
    };

    // 有 API Key 则走 OpenAI 兼容端点，否则 Mock
    let llm: Arc<dyn LlmClient> = if std::env::var("OPENAI_API_KEY").is_ok() {
        tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set, using Mock LLM");
        Arc::new(MockLlmClient)
    };

    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);

    let roles = RoleRegistry::new(
        RoleSpec::new(
            "supervisor",
            "You are the supervisor. Break the task down and delegate sub-tasks to workers, \
            then combine their reports into a final answer.",
        )
        .delegating(),
    )
    .with_worker(RoleSpec::new(
        "researcher",
        "You are a research worker. Answer the delegated question concisely.",
    ))
    .with_worker(RoleSpec::new(
        "writer",
        "You are a writing worker. Produce the requested text, nothing else.",
    ));

    let store = create_checkpoint_store(&cfg.checkpoint.backend, cfg.checkpoint.db_path.as_deref());
    let engine = Arc::new(Engine::new(
        llm,
        tools,
        roles,
        store,
        cfg.engine_config(),
    ));

    // 事件打印：独立消费任务，迟滞或断开不影响执行循环
    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("event: {}", line),
                Err(_) => {}
            }
        }
    });

    let supervisor = SessionSupervisor::new();
    let (session_id, outcome): (SessionId, SessionOutcome) =
        engine.run_task(&task, supervisor.cancel_token()).await?;

    match outcome {
        SessionOutcome::Completed { answer } => {
            println!("\nsession {session_id} answered:\n{answer}");
        }
        SessionOutcome::Aborted { iterations } => {
            println!("\nsession {session_id} ran out of steps after {iterations} iterations");
        }
    }

    drop(engine);
    let _ = printer.await;
    Ok(())
}
