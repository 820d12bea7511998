// SSH 探测客户端
// 建立 TCP 连接并完成密钥交换，在认证开始之前终止

use std::future::Future;
use std::sync::Arc;

use russh::client::Handle;
use russh::keys::PublicKey;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::config::SshConfig;
use super::error::SshError;
use super::handler::KeyCaptureHandler;
use super::tap::KexTap;
use crate::harvest::{KeyExchangeResult, KeyExchanger};
use crate::models::{HostKey, Target};

/// SSH 探测客户端
/// 每次调用都使用独立连接，返回前连接一定已释放
pub struct SshProbeClient {
    /// 连接超时（秒）
    connect_timeout: u64,
}

impl SshProbeClient {
    pub fn new(connect_timeout: u64) -> Self {
        Self { connect_timeout }
    }

    /// 执行一次密钥交换
    pub async fn exchange_with(&self, config: &SshConfig) -> KeyExchangeResult {
        let (key_tx, mut key_rx) = oneshot::channel();
        let (blob_tx, mut blob_rx) = oneshot::channel();
        let result = self.handshake(config, key_tx, blob_tx).await;

        // 明文 KEX 回复里的 K_S 优先（证书只能从这里拿到），其次是校验回调
        let offered = blob_rx
            .try_recv()
            .ok()
            .and_then(|blob| match HostKey::from_bytes(&blob) {
                Ok(key) => Some(key),
                Err(e) => {
                    debug!("[SSH] Ignoring host key from key exchange reply: {}", e);
                    None
                }
            })
            .or_else(|| key_rx.try_recv().ok().map(HostKey::from));

        // 拿到密钥就算采集成功，拒绝密钥导致的握手错误直接丢弃
        if let Some(key) = offered {
            match result {
                Err(e) => debug!("[SSH] Handshake aborted after key capture: {}", e),
                Ok(handle) => close(handle).await,
            }
            return KeyExchangeResult::KeyOffered(key);
        }

        match result {
            Err(e) => KeyExchangeResult::Failed(e),
            Ok(handle) => {
                close(handle).await;
                KeyExchangeResult::SessionOpened
            }
        }
    }

    /// TCP 连接 + SSH 握手
    async fn handshake(
        &self,
        config: &SshConfig,
        key_tx: oneshot::Sender<PublicKey>,
        blob_tx: oneshot::Sender<Vec<u8>>,
    ) -> Result<Handle<KeyCaptureHandler>, SshError> {
        let russh_config = Arc::new(config.to_russh_config()?);
        let connect_timeout = config.timeout();

        // 解析地址
        let socket_addr = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await
            .map_err(|e| SshError::Config(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::Config("No valid address found".to_string()))?;

        debug!(
            "[SSH] Connecting to {} ({}) offering {}",
            socket_addr, config.host, config.host_key_algorithm
        );

        let tcp_stream = timeout(connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| SshError::Timeout(config.connect_timeout))?
            .map_err(SshError::Io)?;

        let stream = KexTap::new(tcp_stream, blob_tx);
        let handler = KeyCaptureHandler::new(key_tx, config.host_key_algorithm.clone());

        let handle = timeout(
            connect_timeout,
            russh::client::connect_stream(russh_config, stream, handler),
        )
        .await
        .map_err(|_| SshError::Timeout(config.connect_timeout))?
        .map_err(SshError::from)?;

        Ok(handle)
    }
}

impl KeyExchanger for SshProbeClient {
    fn exchange(
        &self,
        target: &Target,
        algorithm: &str,
    ) -> impl Future<Output = KeyExchangeResult> + Send {
        let config = SshConfig::for_probe(target, algorithm, self.connect_timeout);
        async move { self.exchange_with(&config).await }
    }
}

/// 关闭连接
async fn close(handle: Handle<KeyCaptureHandler>) {
    if let Err(e) = handle
        .disconnect(russh::Disconnect::ByApplication, "", "en")
        .await
    {
        warn!("[SSH] Failed to close connection: {}", e);
    }
}
