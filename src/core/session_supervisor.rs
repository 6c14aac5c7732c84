//! 会话监管：取消令牌
//!
//! 调用方（CLI 的 Ctrl+C）通过 cancel() 请求停止；编排器在状态边界检查令牌，
//! 正在进行的一步会先完成，再进入 Terminal(Cancelled)。每次运行可拿子 token，单独取消不影响整个会话。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
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

    /// 触发取消（用户 Ctrl+C）
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单次运行）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_reaches_children() {
        let sup = SessionSupervisor::new();
        let child = sup.child_token();
        assert!(!child.is_cancelled());
        sup.cancel();
        assert!(child.is_cancelled());
        assert!(sup.is_cancelled());
    }

    #[test]
    fn test_child_cancel_is_local() {
        let sup = SessionSupervisor::new();
        let child = sup.child_token();
        child.cancel();
        assert!(!sup.is_cancelled());
    }
}
