// 本地配置读取服务

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::HarvestSettings;

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/keyharvest
/// Linux: ~/.config/keyharvest
/// Windows: C:\Users\<用户名>\AppData\Roaming\keyharvest
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Unable to locate the system config directory")?
        .join("keyharvest"))
}

/// 获取设置文件路径
pub fn get_settings_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("settings.json"))
}

/// 加载设置
/// 指定路径时文件必须存在；否则读取默认位置，不存在则使用默认值
pub fn load_settings(explicit: Option<&Path>) -> Result<HarvestSettings> {
    match explicit {
        Some(path) => load_settings_from(path),
        None => {
            let path = match get_settings_file() {
                Ok(path) => path,
                Err(_) => return Ok(HarvestSettings::default()),
            };
            if !path.exists() {
                return Ok(HarvestSettings::default());
            }
            load_settings_from(&path)
        }
    }
}

/// 从指定文件加载设置
pub fn load_settings_from(path: &Path) -> Result<HarvestSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let settings: HarvestSettings = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, r#"{"algorithms": ["ssh-ed25519", "rsa-sha2-512"], "connect_timeout": 3}"#)
            .unwrap();

        let settings = load_settings(Some(path.as_path())).unwrap();
        assert_eq!(settings.algorithms, vec!["ssh-ed25519", "rsa-sha2-512"]);
        assert_eq!(settings.connect_timeout, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nonexistent.json");
        assert!(load_settings(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_settings_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings file"));
    }

    #[test]
    fn test_settings_file_location() {
        if let Ok(path) = get_settings_file() {
            assert!(path.ends_with("keyharvest/settings.json"));
        }
    }
}
