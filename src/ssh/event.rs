// SSH 连接诊断日志

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};

/// 日志级别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// 日志条目
#[derive(Clone, Debug)]
pub struct LogEntry {
    /// 时间戳
    pub timestamp: DateTime<Local>,
    /// 日志级别
    pub level: LogLevel,
    /// 消息内容
    pub message: String,
}

impl LogEntry {
    /// 创建新的日志条目
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// 格式化为单行文本：`[时间戳] 消息`
    pub fn format_line(&self) -> String {
        format!("[{}] {}", self.timestamp.to_rfc3339(), self.message)
    }
}

/// 连接诊断日志（只追加）
///
/// 记录每次连接、断开、错误和关闭事件，仅供按需展示，不参与控制流。
#[derive(Debug, Default)]
pub struct ConnectionLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl ConnectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条日志，同时输出到 tracing
    pub fn append(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Debug => tracing::debug!("[SSH Manager] {}", entry.message),
            LogLevel::Info => tracing::info!("[SSH Manager] {}", entry.message),
            LogLevel::Warn => tracing::warn!("[SSH Manager] {}", entry.message),
            LogLevel::Error => tracing::error!("[SSH Manager] {}", entry.message),
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// 获取全部日志条目的快照
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 渲染为可读文本，每条一行
    pub fn render(&self) -> String {
        self.entries()
            .iter()
            .map(|entry| entry.format_line())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
