//! 会话：一条独立的对话/状态时间线
//!
//! 根会话由用户发起；子会话由委派管理器创建，其 ID 由
//! (父 ID, 工人角色, 随机 nonce) 拼接派生，无需中心注册表即可保证唯一与可追溯。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::engine::node::NodeName;
use crate::session::message::{Message, ToolRequest};

/// 会话 ID
pub type SessionId = String;

/// 单个会话：消息序列 + 当前节点 + 迭代计数 + 共享状态
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// 只追加的消息序列
    pub messages: Vec<Message>,
    /// 当前活跃节点
    pub node: NodeName,
    /// 已执行的节点次数
    pub iteration: u32,
    /// 会话级共享状态（JSON 对象；路由指令的 patch 合并到这里，委派时复制给子会话）
    pub state: serde_json::Value,
}

impl Session {
    /// 创建根会话，起始于指定节点
    pub fn root(entry_node: impl Into<NodeName>) -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            messages: Vec::new(),
            node: entry_node.into(),
            iteration: 0,
            state: serde_json::json!({}),
        }
    }

    /// 创建子会话：ID 派生自 (父 ID, 角色, nonce)
    pub fn sub(parent_id: &str, worker_role: &str, entry_node: impl Into<NodeName>) -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}/{}_{}", parent_id, worker_role, &nonce[..8]),
            messages: Vec::new(),
            node: entry_node.into(),
            iteration: 0,
            state: serde_json::json!({}),
        }
    }

    /// 从快照恢复会话
    pub fn from_snapshot(id: SessionId, snapshot: Snapshot) -> Self {
        Self {
            id,
            messages: snapshot.messages,
            node: snapshot.node,
            iteration: snapshot.iteration,
            state: snapshot.state,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// 已发出但尚未被回应的工具请求（按发出顺序）
    pub fn pending_requests(&self) -> Vec<&ToolRequest> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { result } => Some(result.id.as_str()),
                _ => None,
            })
            .collect();

        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Agent { tool_requests, .. } => Some(tool_requests.iter()),
                _ => None,
            })
            .flatten()
            .filter(|req| !answered.contains(req.id.as_str()))
            .collect()
    }

    /// 会话内出现过的所有请求 id（用于请求侧唯一性校验）
    pub fn issued_ids(&self) -> HashSet<String> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Agent { tool_requests, .. } => Some(tool_requests.iter()),
                _ => None,
            })
            .flatten()
            .map(|req| req.id.clone())
            .collect()
    }

    /// 一致性：请求与结果构成双射（数量相等且每条结果恰好对应一条请求）
    pub fn is_consistent(&self) -> bool {
        let issued = self.issued_ids();
        let mut answered: HashSet<&str> = HashSet::new();
        for m in &self.messages {
            if let Message::ToolResult { result } = m {
                if !issued.contains(result.id.as_str()) || !answered.insert(result.id.as_str()) {
                    return false;
                }
            }
        }
        answered.len() == issued.len()
    }

    /// 最后一条 Agent 输出的正文
    pub fn last_agent_content(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Agent { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    /// 将路由指令携带的 patch 浅合并进共享状态
    pub fn apply_state_patch(&mut self, patch: &serde_json::Value) {
        if let (Some(state), Some(patch)) = (self.state.as_object_mut(), patch.as_object()) {
            for (k, v) in patch {
                state.insert(k.clone(), v.clone());
            }
        }
    }

    /// 生成当前状态的快照（用于检查点）
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages: self.messages.clone(),
            node: self.node.clone(),
            iteration: self.iteration,
            state: self.state.clone(),
        }
    }
}

/// 会话状态快照：检查点的载荷
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub node: NodeName,
    pub iteration: u32,
    #[serde(default = "empty_object")]
    pub state: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}
