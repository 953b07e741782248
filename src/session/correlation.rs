//! 关联校验：请求与结果的双射检查
//!
//! 请求侧：同一批次与同一会话内 id 不得为空、不得重复；
//! 结果侧：每条结果必须恰好对应一条未回应的请求。
//! 校验失败是可本地恢复的错误，由执行循环触发一次 Agent 节点重试，而非中止会话。

use std::collections::HashSet;

use thiserror::Error;

use crate::session::message::{ToolRequest, ToolResult};

/// 关联校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("Tool request '{0}' has an empty correlation id")]
    EmptyRequestId(String),

    #[error("Duplicate correlation id among requests: {0}")]
    DuplicateRequestId(String),

    #[error("Tool result has an empty correlation id")]
    EmptyResultId,

    #[error("Tool result references unknown correlation id: {0}")]
    UnknownResultId(String),

    #[error("Duplicate tool result for correlation id: {0}")]
    DuplicateResultId(String),

    #[error("No tool result arrived for correlation id: {0}")]
    MissingResult(String),
}

/// 校验一批新请求：id 非空、批内不重复、与会话历史不重复
pub fn validate_requests(
    seen_ids: &HashSet<String>,
    requests: &[ToolRequest],
) -> Result<(), CorrelationError> {
    let mut batch: HashSet<&str> = HashSet::new();
    for req in requests {
        if req.id.is_empty() {
            return Err(CorrelationError::EmptyRequestId(req.action.clone()));
        }
        if seen_ids.contains(req.id.as_str()) || !batch.insert(req.id.as_str()) {
            return Err(CorrelationError::DuplicateRequestId(req.id.clone()));
        }
    }
    Ok(())
}

/// 校验一批结果：每条结果的 id 必须在 outstanding 中恰好出现一次，
/// 且每条 outstanding 请求都得到了回应（双射）
pub fn validate_results(
    outstanding: &[&ToolRequest],
    results: &[ToolResult],
) -> Result<(), CorrelationError> {
    let open: HashSet<&str> = outstanding.iter().map(|r| r.id.as_str()).collect();
    let mut answered: HashSet<&str> = HashSet::new();
    for res in results {
        if res.id.is_empty() {
            return Err(CorrelationError::EmptyResultId);
        }
        if !open.contains(res.id.as_str()) {
            return Err(CorrelationError::UnknownResultId(res.id.clone()));
        }
        if !answered.insert(res.id.as_str()) {
            return Err(CorrelationError::DuplicateResultId(res.id.clone()));
        }
    }
    if let Some(req) = outstanding.iter().find(|r| !answered.contains(r.id.as_str())) {
        return Err(CorrelationError::MissingResult(req.id.clone()));
    }
    Ok(())
}
