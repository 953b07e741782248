//! 模型输出解析
//!
//! 从回复文本中提取 JSON 请求信封（```json 块或裸 JSON），解析为工具请求列表；
//! 无信封或信封损坏时视为纯文本回复。模型未给 id 的请求由本层补发新关联 ID。

use serde::Deserialize;

use crate::llm::AgentReply;
use crate::session::{new_correlation_id, ToolRequest};

/// 信封格式：{"requests": [{"id": "...", "action": "...", "args": {...}}]}
#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    requests: Vec<RawRequest>,
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    /// 模型可自带 id；缺省时由解析层补发
    id: Option<String>,
    action: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// 解析模型输出：提取 JSON 信封为工具请求，否则为纯文本回复
pub fn parse_agent_reply(output: &str) -> AgentReply {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        &trimmed[start..=end]
    } else {
        return AgentReply::answer(trimmed);
    };

    match serde_json::from_str::<RequestEnvelope>(json_str) {
        Ok(envelope) if !envelope.requests.is_empty() => {
            let requests = envelope
                .requests
                .into_iter()
                .map(|raw| ToolRequest {
                    id: raw.id.unwrap_or_else(new_correlation_id),
                    action: raw.action,
                    args: raw.args,
                })
                .collect();
            AgentReply::with_requests(trimmed, requests)
        }
        Ok(_) => AgentReply::answer(trimmed),
        Err(e) => {
            tracing::warn!("Reply envelope did not parse ({}), treating as plain text", e);
            AgentReply::answer(trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_answer() {
        let reply = parse_agent_reply("Paris is the capital of France.");
        assert!(reply.tool_requests.is_empty());
        assert_eq!(reply.text, "Paris is the capital of France.");
    }

    #[test]
    fn test_envelope_parses_requests() {
        let reply = parse_agent_reply(
            r#"{"requests": [{"action": "echo", "args": {"text": "hi"}}]}"#,
        );
        assert_eq!(reply.tool_requests.len(), 1);
        assert_eq!(reply.tool_requests[0].action, "echo");
        assert!(!reply.tool_requests[0].id.is_empty());
    }

    #[test]
    fn test_fenced_envelope() {
        let reply = parse_agent_reply(
            "I will delegate.\n```json\n{\"requests\": [{\"id\": \"c1\", \"action\": \"delegate\", \"args\": {\"worker\": \"researcher\", \"task\": \"find one fact\"}}]}\n```",
        );
        assert_eq!(reply.tool_requests.len(), 1);
        assert_eq!(reply.tool_requests[0].id, "c1");
    }

    #[test]
    fn test_model_supplied_empty_id_is_kept() {
        // 空 id 留给关联校验拒绝，不在解析层静默修补
        let reply =
            parse_agent_reply(r#"{"requests": [{"id": "", "action": "echo", "args": {}}]}"#);
        assert_eq!(reply.tool_requests[0].id, "");
    }

    #[test]
    fn test_broken_envelope_falls_back_to_text() {
        let reply = parse_agent_reply(r#"{"requests": [{"action": }"#);
        assert!(reply.tool_requests.is_empty());
    }
}
