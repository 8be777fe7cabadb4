// SSH 错误类型定义

use thiserror::Error;

/// SSH 错误类型
///
/// 连接管理、文件系统适配与终端桥接共用同一套错误分类。
#[derive(Debug, Error)]
pub enum SshError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO 错误（网络连接等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 认证失败
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 连接超时（毫秒）
    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    /// 传输层错误（网络/协议层面，包括连接被动断开）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),

    /// 文件或目录不存在
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// 文件或目录已存在
    #[error("File exists: {0}")]
    AlreadyExists(String),

    /// SFTP 子协议错误（未归类的状态码）
    #[error("SFTP protocol error: {0}")]
    Protocol(String),

    /// 没有可用的连接
    #[error("No connection to {0}")]
    Unavailable(String),
}

impl SshError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SshError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, SshError::AlreadyExists(_))
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        SshError::Transport(e.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}
