// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait，只用于截获服务器主机密钥

use russh::keys::PublicKey;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::debug;

/// 主机密钥截获 Handler
///
/// 在 check_server_key 回调中把服务器公钥交给探测方，
/// 然后拒绝该密钥，使握手在密钥交换后立即终止，永远不会进入认证阶段。
pub struct KeyCaptureHandler {
    /// 公钥发送器（只发送一次）
    key_tx: Option<oneshot::Sender<PublicKey>>,
    /// 本次探测的算法（用于日志）
    algorithm: String,
}

impl KeyCaptureHandler {
    /// 创建新的 Handler
    pub fn new(key_tx: oneshot::Sender<PublicKey>, algorithm: impl Into<String>) -> Self {
        Self {
            key_tx: Some(key_tx),
            algorithm: algorithm.into(),
        }
    }
}

impl russh::client::Handler for KeyCaptureHandler {
    type Error = russh::Error;

    /// 截获服务器公钥并拒绝
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        debug!(
            "[SSH] Server offered {} key for {}",
            server_public_key.algorithm(),
            self.algorithm
        );

        if let Some(tx) = self.key_tx.take() {
            let _ = tx.send(server_public_key.clone());
        }

        async { Ok(false) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::host_key::fixtures::HOST1;
    use russh::client::Handler;

    #[tokio::test]
    async fn test_server_key_is_captured_and_refused() {
        let (tx, mut rx) = oneshot::channel();
        let mut handler = KeyCaptureHandler::new(tx, "ssh-ed25519");
        let key = PublicKey::from_openssh(HOST1).unwrap();

        let accepted = handler.check_server_key(&key).await.unwrap();
        assert!(!accepted);
        assert_eq!(rx.try_recv().unwrap(), key);
    }

    #[tokio::test]
    async fn test_second_callback_is_still_refused() {
        let (tx, _rx) = oneshot::channel();
        let mut handler = KeyCaptureHandler::new(tx, "ssh-ed25519");
        let key = PublicKey::from_openssh(HOST1).unwrap();

        assert!(!handler.check_server_key(&key).await.unwrap());
        assert!(!handler.check_server_key(&key).await.unwrap());
    }
}
