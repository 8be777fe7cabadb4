// 本地数据持久化服务

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::AppSettings;
use crate::services::ssh_config::expand_path;

/// 应用配置目录名
const APP_DIR_NAME: &str = "openssh-remote";

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/openssh-remote
/// Linux: ~/.config/openssh-remote
/// Windows: C:\Users\<用户名>\AppData\Roaming\openssh-remote
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to locate the system config directory")?
        .join(APP_DIR_NAME);
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("Unable to create the config directory")?;
    }
    Ok(config_dir)
}

// ======================== Settings 配置持久化 ========================

/// 获取设置配置文件路径
pub fn get_settings_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("settings.json"))
}

/// 加载应用设置
pub fn load_settings() -> Result<AppSettings> {
    load_settings_from(&get_settings_file()?)
}

/// 保存应用设置
pub fn save_settings(settings: &AppSettings) -> Result<()> {
    save_settings_to(&get_settings_file()?, settings)
}

/// 从指定文件加载设置，文件不存在时返回默认值
pub fn load_settings_from(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Unable to read settings file {}", path.display()))?;
    let settings: AppSettings = serde_json::from_str(&content)
        .with_context(|| format!("Unable to parse settings file {}", path.display()))?;
    Ok(settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings).context("Unable to serialize settings")?;
    fs::write(path, content)
        .with_context(|| format!("Unable to write settings file {}", path.display()))?;
    Ok(())
}

/// 主机记录文件的实际路径（展开 `~`）
pub fn ssh_config_path(settings: &AppSettings) -> PathBuf {
    expand_path(&settings.ssh_config_file)
}
