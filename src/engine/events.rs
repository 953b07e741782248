//! 执行过程事件：供 SSE / WebSocket 等外部观察者消费
//!
//! emit 为非阻塞 fire-and-forget：每个订阅者持有独立的有界缓冲，
//! 溢出策略（丢最旧 / 丢最新）由配置决定；订阅者断开或迟滞绝不影响执行循环。
//! 同一会话的事件按循环产生顺序投递；跨会话之间无顺序保证。

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// 事件正文预览最大字符数
const PREVIEW_CHARS: usize = 200;

/// 终态种类：正常回答或迭代上限中止
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Answered,
    Aborted,
}

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 节点开始执行
    StepStarted {
        session_id: String,
        node: String,
        iteration: u32,
    },
    /// Agent 产出（预览，避免过长）
    AgentOutput {
        session_id: String,
        node: String,
        preview: String,
        request_count: usize,
    },
    /// 调用工具
    ToolInvoked {
        session_id: String,
        correlation_id: String,
        action: String,
    },
    /// 工具结果
    ToolResult {
        session_id: String,
        correlation_id: String,
        success: bool,
        preview: String,
    },
    /// 委派开始（子会话已创建）
    DelegationStarted {
        session_id: String,
        sub_session_id: String,
        worker: String,
        correlation_id: String,
    },
    /// 委派结束（结果已注入父会话）
    DelegationCompleted {
        session_id: String,
        sub_session_id: String,
        worker: String,
        correlation_id: String,
        success: bool,
    },
    /// 错误（会话内可恢复或致命均会上报）
    Error { session_id: String, text: String },
    /// 会话终态
    Terminal {
        session_id: String,
        outcome: TerminalOutcome,
    },
}

/// 截断为事件预览
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// 缓冲溢出策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 覆盖最旧的未消费事件（环形缓冲）
    DropOldest,
    /// 缓冲满时丢弃新事件
    DropNewest,
}

enum ListenerSender {
    Ring(broadcast::Sender<EngineEvent>),
    Bounded(mpsc::Sender<EngineEvent>),
}

/// 订阅端事件流
pub enum EventStream {
    Ring(broadcast::Receiver<EngineEvent>),
    Bounded(mpsc::Receiver<EngineEvent>),
}

impl EventStream {
    /// 下一条事件；DropOldest 模式下消费过慢会跳过被覆盖的最旧事件
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        match self {
            Self::Ring(rx) => loop {
                match rx.recv().await {
                    Ok(ev) => return Some(ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Event listener lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            Self::Bounded(rx) => rx.recv().await,
        }
    }

    /// 非阻塞读取（测试用）
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        match self {
            Self::Ring(rx) => loop {
                match rx.try_recv() {
                    Ok(ev) => return Some(ev),
                    Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                    Err(_) => return None,
                }
            },
            Self::Bounded(rx) => rx.try_recv().ok(),
        }
    }
}

/// 事件总线：每订阅者一条有界缓冲
pub struct EventBus {
    capacity: usize,
    policy: OverflowPolicy,
    listeners: std::sync::Mutex<Vec<ListenerSender>>,
}

impl EventBus {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            listeners: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// 新建一个订阅者
    pub fn subscribe(&self) -> EventStream {
        let mut listeners = self
            .listeners
            .lock()
            .expect("event listener registry poisoned");
        match self.policy {
            OverflowPolicy::DropOldest => {
                let (tx, rx) = broadcast::channel(self.capacity);
                listeners.push(ListenerSender::Ring(tx));
                EventStream::Ring(rx)
            }
            OverflowPolicy::DropNewest => {
                let (tx, rx) = mpsc::channel(self.capacity);
                listeners.push(ListenerSender::Bounded(tx));
                EventStream::Bounded(rx)
            }
        }
    }

    /// 广播一条事件；永不阻塞，断开的订阅者顺手清理
    pub fn emit(&self, event: EngineEvent) {
        let mut listeners = match self.listeners.lock() {
            Ok(l) => l,
            Err(_) => return,
        };
        listeners.retain(|listener| match listener {
            ListenerSender::Ring(tx) => tx.send(event.clone()).is_ok(),
            ListenerSender::Bounded(tx) => match tx.try_send(event.clone()) {
                Ok(()) => true,
                // 缓冲满：按策略丢弃这条新事件，订阅者保留
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
        });
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|l| l.len())
            .unwrap_or(0)
    }
}
