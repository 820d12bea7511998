// 内置常量

/// 默认连接超时（秒）
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 30;

/// 默认探测的主机密钥算法（按探测顺序）
/// 先证书算法，后普通公钥算法
pub const HOST_KEY_ALGORITHMS: &[&str] = &[
    // 证书
    "ssh-rsa-cert-v01@openssh.com",
    "ssh-dss-cert-v01@openssh.com",
    "ecdsa-sha2-nistp256-cert-v01@openssh.com",
    "ecdsa-sha2-nistp384-cert-v01@openssh.com",
    "ecdsa-sha2-nistp521-cert-v01@openssh.com",
    "sk-ecdsa-sha2-nistp256-cert-v01@openssh.com",
    "ssh-ed25519-cert-v01@openssh.com",
    "sk-ssh-ed25519-cert-v01@openssh.com",
    "rsa-sha2-256-cert-v01@openssh.com",
    "rsa-sha2-512-cert-v01@openssh.com",
    // 公钥
    "ssh-rsa",
    "ssh-dss",
    "ecdsa-sha2-nistp256",
    "sk-ecdsa-sha2-nistp256@openssh.com",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "ssh-ed25519",
    "sk-ssh-ed25519@openssh.com",
    "rsa-sha2-256",
    "rsa-sha2-512",
];
