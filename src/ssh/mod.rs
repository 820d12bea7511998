// SSH 连接模块
//
// 模块结构:
// - config: 单次探测的连接配置 (SshConfig)
// - error: 错误类型 (SshError)
// - handler: russh Handler 实现，截获并拒绝服务器主机密钥
// - tap: 读取明文 KEX 回复中的主机密钥（含证书）
// - client: 探测客户端 (SshProbeClient)

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod tap;

// 公开导出
pub use client::SshProbeClient;
pub use error::SshError;
