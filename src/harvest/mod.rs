// 主机密钥采集
//
// 对每个算法各发起一次握手，截获服务器出示的主机密钥，
// 按 SHA256 指纹去重，并汇总未能拿到密钥的探测错误。
// 探测严格串行：同一时刻只有一个连接。

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{HostKey, ObservedKey, Target};
use crate::ssh::SshError;

/// 一次密钥交换的结果（在认证开始之前返回）
#[derive(Debug)]
pub enum KeyExchangeResult {
    /// 服务器在密钥交换中出示了主机密钥，连接已被主动终止
    KeyOffered(HostKey),
    /// 没有看到主机密钥就失败了（连接被拒、算法不被支持、超时等）
    Failed(SshError),
    /// 握手意外完成且没有触发密钥校验，连接已关闭
    SessionOpened,
}

/// 密钥交换器：连接目标，仅允许协商给定的一个主机密钥算法
pub trait KeyExchanger {
    fn exchange(
        &self,
        target: &Target,
        algorithm: &str,
    ) -> impl Future<Output = KeyExchangeResult> + Send;
}

/// 某个算法的探测错误
#[derive(Debug)]
pub struct ProbeError {
    pub algorithm: String,
    pub error: SshError,
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.algorithm, self.error)
    }
}

/// 单次探测结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 拿到了密钥；`is_new` 表示此前没有见过该指纹
    KeyCaptured { fingerprint: String, is_new: bool },
    /// 没有拿到密钥，错误已记录
    NoKeyObserved,
    /// 握手完成但没有经过密钥校验，不产生任何结果
    SessionOpened,
}

/// 按指纹去重的密钥集合，保持首次采集顺序
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<ObservedKey>,
    index: HashMap<String, usize>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入密钥；指纹已存在时保留先前的条目并返回 false
    pub fn insert(&mut self, key: ObservedKey) -> bool {
        if self.index.contains_key(&key.sha256) {
            return false;
        }
        self.index.insert(key.sha256.clone(), self.keys.len());
        self.keys.push(key);
        true
    }

    #[cfg(test)]
    pub fn get(&self, fingerprint: &str) -> Option<&ObservedKey> {
        self.index.get(fingerprint).map(|&i| &self.keys[i])
    }

    #[cfg(test)]
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.index.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 按首次采集顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &ObservedKey> {
        self.keys.iter()
    }
}

/// 所有算法都没有拿到密钥
#[derive(Debug, Error)]
#[error("Failed to fetch keys: {} probe(s) failed", .errors.len())]
pub struct NoKeysError {
    pub errors: Vec<ProbeError>,
}

/// 一次运行的最终结果
#[derive(Debug)]
pub struct RunResult {
    pub keys: KeySet,
    pub errors: Vec<ProbeError>,
}

impl RunResult {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        !self.keys.is_empty()
    }

    /// 至少采集到一个密钥时返回密钥集合，否则返回全部探测错误
    pub fn into_keys(self) -> Result<KeySet, NoKeysError> {
        if self.keys.is_empty() {
            Err(NoKeysError {
                errors: self.errors,
            })
        } else {
            Ok(self.keys)
        }
    }
}

/// 主机密钥采集器
pub struct Harvester<E> {
    exchanger: E,
    keys: KeySet,
    errors: Vec<ProbeError>,
}

impl<E: KeyExchanger> Harvester<E> {
    pub fn new(exchanger: E) -> Self {
        Self {
            exchanger,
            keys: KeySet::new(),
            errors: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    #[cfg(test)]
    pub fn errors(&self) -> &[ProbeError] {
        &self.errors
    }

    /// 用单个算法探测一次
    ///
    /// 只要服务器出示了密钥就算成功，连接层因拒绝密钥而产生的错误不会被记录。
    pub async fn probe(&mut self, target: &Target, algorithm: &str) -> ProbeOutcome {
        debug!("[Harvest] Probing {} with {}", target, algorithm);

        match self.exchanger.exchange(target, algorithm).await {
            KeyExchangeResult::KeyOffered(key) => self.record_key(key, algorithm),
            KeyExchangeResult::Failed(error) => {
                debug!("[Harvest] {} failed: {}", algorithm, error);
                self.record_error(algorithm, error);
                ProbeOutcome::NoKeyObserved
            }
            KeyExchangeResult::SessionOpened => {
                warn!(
                    "[Harvest] Handshake with {} completed without host key check ({})",
                    target, algorithm
                );
                ProbeOutcome::SessionOpened
            }
        }
    }

    /// 按顺序探测所有算法；单个算法失败不会中断
    pub async fn run(mut self, target: &Target, algorithms: &[String]) -> RunResult {
        info!(
            "[Harvest] Probing {} with {} algorithm(s)",
            target,
            algorithms.len()
        );

        for algorithm in algorithms {
            self.probe(target, algorithm).await;
        }

        info!(
            "[Harvest] Done: {} distinct key(s), {} failed probe(s)",
            self.keys.len(),
            self.errors.len()
        );
        for observed in self.keys.iter() {
            debug!(
                "[Harvest] {} first offered for {}",
                observed.sha256, observed.algorithm
            );
        }

        self.finish()
    }

    pub fn finish(self) -> RunResult {
        RunResult {
            keys: self.keys,
            errors: self.errors,
        }
    }

    fn record_key(&mut self, key: HostKey, algorithm: &str) -> ProbeOutcome {
        let observed = match ObservedKey::capture(key, algorithm) {
            Ok(observed) => observed,
            Err(error) => {
                self.record_error(algorithm, error);
                return ProbeOutcome::NoKeyObserved;
            }
        };

        let fingerprint = observed.sha256.clone();
        let is_new = self.keys.insert(observed);
        if is_new {
            info!("[Harvest] {} -> new key {}", algorithm, fingerprint);
        } else {
            debug!("[Harvest] {} -> already seen {}", algorithm, fingerprint);
        }

        ProbeOutcome::KeyCaptured {
            fingerprint,
            is_new,
        }
    }

    fn record_error(&mut self, algorithm: &str, error: SshError) {
        self.errors.push(ProbeError {
            algorithm: algorithm.to_string(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::host_key::fixtures::*;
    use std::cell::RefCell;

    /// 内存中的假服务器：algorithm -> 出示的密钥
    #[derive(Default)]
    struct FakeServer {
        offers: HashMap<String, String>,
        opens_session: Vec<String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeServer {
        fn offer(mut self, algorithm: &str, key_line: &str) -> Self {
            self.offers
                .insert(algorithm.to_string(), key_line.to_string());
            self
        }
    }

    impl KeyExchanger for FakeServer {
        fn exchange(
            &self,
            _target: &Target,
            algorithm: &str,
        ) -> impl Future<Output = KeyExchangeResult> + Send {
            self.calls.borrow_mut().push(algorithm.to_string());
            let result = if self.opens_session.iter().any(|a| a == algorithm) {
                KeyExchangeResult::SessionOpened
            } else {
                match self.offers.get(algorithm) {
                    Some(line) => KeyExchangeResult::KeyOffered(key(line)),
                    None => KeyExchangeResult::Failed(SshError::Protocol(format!(
                        "no common host key algorithm: {}",
                        algorithm
                    ))),
                }
            };
            async move { result }
        }
    }

    fn algorithms(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn target() -> Target {
        Target::new("example.com", 2222)
    }

    #[tokio::test]
    async fn test_same_key_from_two_algorithms_is_deduplicated() {
        let server = FakeServer::default()
            .offer("rsa-sha2-256", HOST1)
            .offer("rsa-sha2-512", HOST1);
        let result = Harvester::new(server)
            .run(&target(), &algorithms(&["rsa-sha2-256", "rsa-sha2-512"]))
            .await;

        assert_eq!(result.keys.len(), 1);
        assert!(result.keys.contains(HOST1_SHA256));
        assert_eq!(result.keys.get(HOST1_SHA256).unwrap().algorithm, "rsa-sha2-256");
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_algorithm_records_error() {
        let server = FakeServer::default().offer("type-A", HOST1);
        let mut harvester = Harvester::new(server);

        let outcome = harvester.probe(&target(), "type-B").await;
        assert_eq!(outcome, ProbeOutcome::NoKeyObserved);
        assert!(harvester.keys().is_empty());
        assert_eq!(harvester.errors().len(), 1);
        assert_eq!(harvester.errors()[0].algorithm, "type-B");
    }

    #[tokio::test]
    async fn test_one_accepted_one_rejected() {
        let server = FakeServer::default().offer("type-A", HOST1);
        let result = Harvester::new(server)
            .run(&target(), &algorithms(&["type-A", "type-B"]))
            .await;

        assert!(result.is_success());
        assert_eq!(result.keys.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].algorithm, "type-B");
        assert!(result.errors[0].to_string().starts_with("type-B: "));
    }

    #[tokio::test]
    async fn test_no_keys_is_fatal_with_all_errors() {
        let result = Harvester::new(FakeServer::default())
            .run(&target(), &algorithms(&["type-A", "type-B", "type-C"]))
            .await;

        assert!(!result.is_success());
        let err = result.into_keys().unwrap_err();
        let tagged: Vec<_> = err.errors.iter().map(|e| e.algorithm.as_str()).collect();
        assert_eq!(tagged, vec!["type-A", "type-B", "type-C"]);
    }

    #[tokio::test]
    async fn test_report_order_is_first_capture_order() {
        let server = FakeServer::default()
            .offer("ssh-ed25519-cert-v01@openssh.com", HOST1_CERT)
            .offer("ssh-rsa", HOST2)
            .offer("rsa-sha2-256", HOST2)
            .offer("ssh-ed25519", HOST1);
        let result = Harvester::new(server)
            .run(
                &target(),
                &algorithms(&[
                    "ssh-ed25519-cert-v01@openssh.com",
                    "ssh-dss",
                    "ssh-rsa",
                    "ssh-ed25519",
                    "rsa-sha2-256",
                ]),
            )
            .await;

        let keys = result.into_keys().unwrap();
        let order: Vec<_> = keys.iter().map(|k| k.sha256.as_str()).collect();
        assert_eq!(order, vec![HOST1_CERT_SHA256, HOST2_SHA256, HOST1_SHA256]);
        assert!(keys.get(HOST1_CERT_SHA256).unwrap().certificate.is_some());
    }

    #[tokio::test]
    async fn test_probe_reports_new_and_repeated_keys() {
        let server = FakeServer::default()
            .offer("ssh-ed25519", HOST1)
            .offer("ssh-ed25519-alt@example.com", HOST1);
        let mut harvester = Harvester::new(server);

        assert_eq!(
            harvester.probe(&target(), "ssh-ed25519").await,
            ProbeOutcome::KeyCaptured {
                fingerprint: HOST1_SHA256.to_string(),
                is_new: true
            }
        );
        assert_eq!(
            harvester.probe(&target(), "ssh-ed25519-alt@example.com").await,
            ProbeOutcome::KeyCaptured {
                fingerprint: HOST1_SHA256.to_string(),
                is_new: false
            }
        );
        assert_eq!(harvester.keys().len(), 1);
        assert!(harvester.errors().is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_session_contributes_nothing() {
        let server = FakeServer {
            opens_session: vec!["ssh-ed25519".to_string()],
            ..Default::default()
        };
        let mut harvester = Harvester::new(server);

        let outcome = harvester.probe(&target(), "ssh-ed25519").await;
        assert_eq!(outcome, ProbeOutcome::SessionOpened);
        assert!(harvester.keys().is_empty());
        assert!(harvester.errors().is_empty());
    }

    #[tokio::test]
    async fn test_every_algorithm_is_probed_in_order() {
        let server = FakeServer::default().offer("b", HOST1);
        let mut harvester = Harvester::new(server);
        for algorithm in ["a", "b", "c"] {
            harvester.probe(&target(), algorithm).await;
        }
        assert_eq!(*harvester.exchanger.calls.borrow(), vec!["a", "b", "c"]);
    }
}
