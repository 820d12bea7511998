// 密钥交换旁路
// 包装底层流，在 NEWKEYS 之前解析服务器发来的明文包，取出 KEX 回复里的主机密钥
//
// russh 只对能识别的密钥类型调用 check_server_key，证书类主机密钥在签名校验阶段
// 就会失败，因此需要在传输层直接读出 K_S

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;
use tracing::debug;

const PACKET_LEN_SIZE: usize = 4;
const PADDING_LEN_SIZE: usize = 1;
/// 明文阶段允许的最大包长
const MAX_PACKET_SIZE: usize = 256 * 1024;
/// 版本行之前允许的最大字节数
const MAX_BANNER_SIZE: usize = 64 * 1024;
/// 算法名最大长度
const MAX_NAME_LEN: usize = 64;

const MSG_NEWKEYS: u8 = 21;
/// KEXDH_REPLY / KEX_ECDH_REPLY（GEX 中为 KEX_DH_GEX_GROUP）
const MSG_KEX_REPLY: u8 = 31;
/// KEX_DH_GEX_REPLY
const MSG_KEX_GEX_REPLY: u8 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// 等待 `SSH-` 版本行
    Banner,
    /// 明文二进制包
    Packets,
    /// 已拿到密钥、已进入加密阶段或数据无法解析
    Done,
}

/// 服务器到客户端方向的明文包扫描器
#[derive(Debug)]
pub struct KexReplyScanner {
    state: ScanState,
    buffer: Vec<u8>,
}

impl Default for KexReplyScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl KexReplyScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Banner,
            buffer: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    /// 喂入新读到的字节，遇到 KEX 回复时返回主机密钥的线上编码
    pub fn feed(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if self.is_done() {
            return None;
        }
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                ScanState::Done => return None,
                ScanState::Banner => {
                    let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
                        if self.buffer.len() > MAX_BANNER_SIZE {
                            self.finish();
                        }
                        return None;
                    };
                    let is_version = self.buffer.starts_with(b"SSH-");
                    self.buffer.drain(..=end);
                    if is_version {
                        self.state = ScanState::Packets;
                    }
                }
                ScanState::Packets => {
                    if self.buffer.len() < PACKET_LEN_SIZE + PADDING_LEN_SIZE {
                        return None;
                    }
                    let packet_len = read_u32(&self.buffer)? as usize;
                    if packet_len <= PADDING_LEN_SIZE || packet_len > MAX_PACKET_SIZE {
                        debug!("[SSH] Unexpected packet length {}, stop scanning", packet_len);
                        self.finish();
                        return None;
                    }
                    if self.buffer.len() < PACKET_LEN_SIZE + packet_len {
                        return None;
                    }

                    let padding_len = self.buffer[PACKET_LEN_SIZE] as usize;
                    let payload_end = PACKET_LEN_SIZE + packet_len;
                    let payload_start = PACKET_LEN_SIZE + PADDING_LEN_SIZE;
                    if payload_start + padding_len >= payload_end {
                        self.finish();
                        return None;
                    }
                    let payload = &self.buffer[payload_start..payload_end - padding_len];

                    match payload[0] {
                        MSG_NEWKEYS => {
                            self.finish();
                            return None;
                        }
                        MSG_KEX_REPLY | MSG_KEX_GEX_REPLY => {
                            if let Some(blob) = host_key_blob(&payload[1..]) {
                                self.finish();
                                return Some(blob);
                            }
                        }
                        _ => {}
                    }
                    self.buffer.drain(..payload_end);
                }
            }
        }
    }

    fn finish(&mut self) {
        self.state = ScanState::Done;
        self.buffer = Vec::new();
    }
}

fn read_u32(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// 读取 SSH `string`，返回内容和剩余部分
fn take_string(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let len = read_u32(data)? as usize;
    let rest = data.get(PACKET_LEN_SIZE..)?;
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

/// 从 KEX 回复正文中取出 K_S
/// K_S 本身以算法名开头；GEX_GROUP 的首字段是大整数 p，不会通过这项检查
fn host_key_blob(body: &[u8]) -> Option<Vec<u8>> {
    let (blob, _) = take_string(body)?;
    let (name, _) = take_string(blob)?;
    let plausible = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.iter().all(|b| b.is_ascii_graphic() && *b != b',');
    plausible.then(|| blob.to_vec())
}

/// 透传读写，同时把读到的数据交给扫描器
pub struct KexTap<S> {
    inner: S,
    scanner: KexReplyScanner,
    key_tx: Option<oneshot::Sender<Vec<u8>>>,
}

impl<S> KexTap<S> {
    pub fn new(inner: S, key_tx: oneshot::Sender<Vec<u8>>) -> Self {
        Self {
            inner,
            scanner: KexReplyScanner::new(),
            key_tx: Some(key_tx),
        }
    }

    fn inspect(&mut self, data: &[u8]) {
        if self.key_tx.is_none() || self.scanner.is_done() {
            return;
        }
        if let Some(blob) = self.scanner.feed(data) {
            debug!("[SSH] Host key read from key exchange reply ({} bytes)", blob.len());
            if let Some(tx) = self.key_tx.take() {
                let _ = tx.send(blob);
            }
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for KexTap<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.inspect(&buf.filled()[before..]);
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for KexTap<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
