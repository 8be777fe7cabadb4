// Settings 配置数据结构

use serde::{Deserialize, Serialize};

use crate::constants::{
    terminal, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_KEEPALIVE_INTERVAL_MS, DEFAULT_KEEPALIVE_MAX,
    DEFAULT_SSH_CONFIG_FILE,
};

// ======================== 主配置结构 ========================

/// 应用设置（持久化用）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub connection: ConnectionSettings,
    pub terminal: TerminalSettings,
    /// 主机记录文件路径，支持 `~` 开头
    pub ssh_config_file: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            terminal: TerminalSettings::default(),
            ssh_config_file: DEFAULT_SSH_CONFIG_FILE.to_string(),
        }
    }
}

// ======================== 连接设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionSettings {
    pub connect_timeout_ms: u64,
    /// 0 表示关闭心跳
    pub keepalive_interval_ms: u64,
    pub keepalive_max: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            keepalive_max: DEFAULT_KEEPALIVE_MAX,
        }
    }
}

// ======================== 终端设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalSettings {
    pub term: String,
    pub default_cols: u32,
    pub default_rows: u32,
    /// 终端绑定前缓存输出的上限（字节）
    pub max_pending_output_bytes: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            term: terminal::TERM.to_string(),
            default_cols: terminal::DEFAULT_COLS,
            default_rows: terminal::DEFAULT_ROWS,
            max_pending_output_bytes: terminal::MAX_PENDING_OUTPUT_BYTES,
        }
    }
}
