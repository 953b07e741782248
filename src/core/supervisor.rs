//! 会话监管：生命周期与取消传播
//!
//! 持有根 CancellationToken；子会话通过 child_token 挂接，
//! 取消根会话时所有活跃子会话的循环一并取消（子会话不得比根存活更久）。

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理：取消令牌树
#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消：根与所有子 token 一并取消
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// 创建子 token（用于单个子会话）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
