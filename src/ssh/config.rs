// 单次探测的连接配置

use std::borrow::Cow;
use std::time::Duration;

use russh::keys::ssh_key::Algorithm;

use super::error::SshError;
use crate::models::Target;

/// 单次探测的 SSH 连接配置
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// 目标主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 本次探测唯一允许协商的主机密钥算法
    pub host_key_algorithm: String,
    /// 连接超时（秒）
    pub connect_timeout: u64,
}

impl SshConfig {
    pub fn for_probe(target: &Target, algorithm: &str, connect_timeout: u64) -> Self {
        Self {
            host: target.host().to_string(),
            port: target.port(),
            host_key_algorithm: algorithm.to_string(),
            connect_timeout,
        }
    }

    /// 解析算法名
    pub fn algorithm(&self) -> Result<Algorithm, SshError> {
        Algorithm::new(&self.host_key_algorithm).map_err(|e| {
            SshError::Config(format!(
                "Unsupported host key algorithm '{}': {}",
                self.host_key_algorithm, e
            ))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// russh 客户端配置构建
impl SshConfig {
    /// 构建 russh 配置，主机密钥算法列表只保留一项
    /// 这样服务器无法改选其它算法
    pub fn to_russh_config(&self) -> Result<russh::client::Config, SshError> {
        let algorithm = self.algorithm()?;

        let mut config = russh::client::Config::default();
        // russh 没有单独的 connection_timeout，握手阶段用 inactivity_timeout 兜底
        config.inactivity_timeout = Some(self.timeout());
        config.preferred.key = Cow::Owned(vec![algorithm]);
        Ok(config)
    }
}
