//! 工具执行单元
//!
//! 对一批工具请求并发执行（请求间视为相互独立），每条请求恰好产出一条结果，
//! 关联 ID 原样保留，结果顺序与请求顺序一致。超时与执行失败都以 success=false
//! 的结果反馈给 Agent，而不是上抛为循环级错误；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::timeout;

use crate::session::{ToolRequest, ToolResult};
use crate::tools::ToolRegistry;

/// 工具执行单元：持有注册表与单次调用超时
pub struct ToolExecutionUnit {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutionUnit {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.tool_descriptions()
    }

    /// 并发执行一批请求，返回与请求同序的结果列表
    pub async fn execute_batch(&self, requests: &[ToolRequest]) -> Vec<ToolResult> {
        join_all(requests.iter().map(|req| self.execute_one(req))).await
    }

    /// 执行单条请求；超时与失败转为 success=false 的结果
    async fn execute_one(&self, request: &ToolRequest) -> ToolResult {
        let start = Instant::now();
        let result = timeout(
            self.timeout,
            self.registry.execute(&request.action, request.args.clone()),
        )
        .await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "action": request.action,
            "correlation_id": request.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&request.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => ToolResult::ok(&request.id, content),
            Ok(Err(e)) => ToolResult::failure(&request.id, format!("Error: {e}")),
            Err(_) => ToolResult::failure(
                &request.id,
                format!("Error: tool '{}' timed out", request.action),
            ),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
