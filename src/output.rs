// 结果输出格式

use std::fmt::Write;

use anyhow::{Context, Result};

use crate::harvest::{KeySet, NoKeysError};

/// 按首次采集顺序输出全部密钥，每个密钥后跟一个空行
pub fn render_keys(keys: &KeySet) -> Result<String> {
    let mut out = String::new();
    for key in keys.iter() {
        let _ = writeln!(out, "key: {}", key.encoded);
        let _ = writeln!(out, "sha256: {}", key.sha256);
        let _ = writeln!(out, "md5: {}", key.md5);
        if let Some(cert) = &key.certificate {
            let json =
                serde_json::to_string_pretty(cert).context("Failed to serialize certificate")?;
            let _ = writeln!(out, "cert: {}", json);
        }
        out.push('\n');
    }
    Ok(out)
}

/// 没有采集到任何密钥时的错误列表
pub fn render_failure(err: &NoKeysError) -> String {
    let mut out = String::from("Failed to fetch keys:");
    if err.errors.is_empty() {
        out.push_str(" no algorithms were probed");
    }
    for probe_error in &err.errors {
        let _ = write!(out, "\n  {}", probe_error);
    }
    out
}
