// 主机密钥数据模型
// 包含服务器公钥/证书、指纹计算以及证书字段提取

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat};
use md5::Md5;
use russh::keys::ssh_key::{Certificate, HashAlg, PublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ssh::SshError;

/// OpenSSH 证书算法名后缀
const CERT_SUFFIX: &str = "-cert-v01@openssh.com";

/// 服务器在密钥交换中出示的主机密钥
#[derive(Clone, Debug)]
pub enum HostKey {
    /// 普通公钥
    Plain(PublicKey),
    /// OpenSSH 证书
    Certificate(Box<Certificate>),
}

impl HostKey {
    /// 解析单行 OpenSSH 格式（`<type> <base64> [comment]`）
    #[cfg(test)]
    pub fn parse_openssh(line: &str) -> Result<Self, SshError> {
        let line = line.trim();
        let key_type = line
            .split_whitespace()
            .next()
            .ok_or_else(|| SshError::Key("Empty key string".to_string()))?;

        if key_type.ends_with(CERT_SUFFIX) {
            let cert = Certificate::from_openssh(line)
                .map_err(|e| SshError::Key(format!("Failed to parse certificate: {}", e)))?;
            Ok(HostKey::Certificate(Box::new(cert)))
        } else {
            let key = PublicKey::from_openssh(line)
                .map_err(|e| SshError::Key(format!("Failed to parse public key: {}", e)))?;
            Ok(HostKey::Plain(key))
        }
    }

    /// 解析线上编码（KEX 回复中的 K_S）
    pub fn from_bytes(blob: &[u8]) -> Result<Self, SshError> {
        let key_type = blob
            .get(..4)
            .and_then(|len| {
                let len = u32::from_be_bytes(len.try_into().ok()?) as usize;
                blob.get(4..4usize.checked_add(len)?)
            })
            .and_then(|name| std::str::from_utf8(name).ok())
            .ok_or_else(|| SshError::Key("Truncated key blob".to_string()))?;

        if key_type.ends_with(CERT_SUFFIX) {
            let cert = Certificate::from_bytes(blob)
                .map_err(|e| SshError::Key(format!("Failed to decode {}: {}", key_type, e)))?;
            Ok(HostKey::Certificate(Box::new(cert)))
        } else {
            let key = PublicKey::from_bytes(blob)
                .map_err(|e| SshError::Key(format!("Failed to decode {}: {}", key_type, e)))?;
            Ok(HostKey::Plain(key))
        }
    }

    /// 密钥类型名（证书返回 `*-cert-v01@openssh.com` 形式）
    pub fn key_type(&self) -> String {
        match self {
            HostKey::Plain(key) => key.algorithm().as_str().to_string(),
            HostKey::Certificate(cert) => cert.algorithm().to_certificate_type(),
        }
    }

    /// 线上编码（指纹即对这段字节求摘要）
    pub fn to_bytes(&self) -> Result<Vec<u8>, SshError> {
        let bytes = match self {
            HostKey::Plain(key) => key.to_bytes(),
            HostKey::Certificate(cert) => cert.to_bytes(),
        };
        bytes.map_err(|e| SshError::Key(format!("Failed to encode key: {}", e)))
    }

    /// 规范单行编码：`<type> <base64>`，不带注释
    pub fn to_authorized_key(&self) -> Result<String, SshError> {
        Ok(format!(
            "{} {}",
            self.key_type(),
            base64::encode(self.to_bytes()?)
        ))
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            HostKey::Certificate(cert) => Some(cert),
            HostKey::Plain(_) => None,
        }
    }
}

impl From<PublicKey> for HostKey {
    fn from(key: PublicKey) -> Self {
        HostKey::Plain(key)
    }
}

/// SHA256 指纹，格式与 OpenSSH 一致：`SHA256:<无填充 base64>`
pub fn fingerprint_sha256(blob: &[u8]) -> String {
    let digest = Sha256::digest(blob);
    format!(
        "SHA256:{}",
        base64::encode_config(digest, base64::STANDARD_NO_PAD)
    )
}

/// 旧式 MD5 指纹：冒号分隔的小写十六进制
pub fn fingerprint_md5(blob: &[u8]) -> String {
    Md5::digest(blob)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// 证书结构化字段（用于输出展示）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CertificateInfo {
    pub key_type: String,
    pub cert_type: String,
    pub serial: u64,
    pub key_id: String,
    pub valid_principals: Vec<String>,
    pub valid_after: String,
    pub valid_before: String,
    pub critical_options: BTreeMap<String, String>,
    pub extensions: BTreeMap<String, String>,
    /// 签发 CA 的 SHA256 指纹
    pub signature_key: String,
    pub nonce: String,
}

impl CertificateInfo {
    pub fn from_certificate(cert: &Certificate) -> Self {
        let cert_type = if cert.cert_type().is_host() {
            "host"
        } else {
            "user"
        };

        Self {
            key_type: cert.algorithm().to_certificate_type(),
            cert_type: cert_type.to_string(),
            serial: cert.serial(),
            key_id: cert.key_id().to_string(),
            valid_principals: cert.valid_principals().to_vec(),
            valid_after: format_validity(cert.valid_after(), "always"),
            valid_before: format_validity(cert.valid_before(), "forever"),
            critical_options: cert
                .critical_options()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            extensions: cert
                .extensions()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            signature_key: cert.signature_key().fingerprint(HashAlg::Sha256).to_string(),
            nonce: base64::encode(cert.nonce()),
        }
    }
}

/// 将证书有效期时间戳格式化为 RFC3339（UTC）
/// 0 与 u64::MAX 在 OpenSSH 中分别表示无下限/无上限
fn format_validity(timestamp: u64, unbounded: &str) -> String {
    if timestamp == 0 || timestamp == u64::MAX {
        return unbounded.to_string();
    }
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| unbounded.to_string())
}

/// 已采集的主机密钥
#[derive(Clone, Debug)]
pub struct ObservedKey {
    /// 首次采集到该密钥的探测算法
    pub algorithm: String,
    /// 规范单行编码
    pub encoded: String,
    pub sha256: String,
    pub md5: String,
    pub certificate: Option<CertificateInfo>,
}

impl ObservedKey {
    /// 计算指纹并提取证书字段
    pub fn capture(key: HostKey, algorithm: &str) -> Result<Self, SshError> {
        let blob = key.to_bytes()?;
        let encoded = key.to_authorized_key()?;
        let certificate = key.certificate().map(CertificateInfo::from_certificate);

        Ok(Self {
            algorithm: algorithm.to_string(),
            encoded,
            sha256: fingerprint_sha256(&blob),
            md5: fingerprint_md5(&blob),
            certificate,
        })
    }
}
