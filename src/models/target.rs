// 探测目标（host + port）

use std::fmt;
use std::str::FromStr;

use crate::ssh::SshError;

/// SSH 默认端口
pub const DEFAULT_SSH_PORT: u16 = 22;

/// 探测目标，解析后不可变
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// 解析 `host`、`host:port`、`[v6]:port` 或裸 IPv6 地址
    /// 未指定端口时使用 22
    pub fn parse(input: &str) -> Result<Self, SshError> {
        let input = input.trim();

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            // [v6] 或 [v6]:port
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| SshError::Config(format!("Unclosed '[' in target: {}", input)))?;
            match tail {
                "" => (host, None),
                _ => {
                    let port = tail.strip_prefix(':').ok_or_else(|| {
                        SshError::Config(format!("Unexpected text after ']' in target: {}", input))
                    })?;
                    (host, Some(port))
                }
            }
        } else if input.matches(':').count() > 1 {
            // 裸 IPv6 地址无法携带端口
            (input, None)
        } else {
            match input.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        if host.is_empty() {
            return Err(SshError::Config(format!("Missing host in target: {}", input)));
        }

        let port = match port {
            None => DEFAULT_SSH_PORT,
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| SshError::Config(format!("Invalid port '{}' in target: {}", port, input)))?,
        };

        Ok(Self::new(host, port))
    }
}

impl FromStr for Target {
    type Err = SshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
