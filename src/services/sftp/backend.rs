// SFTP 线路层 - 封装 russh-sftp 客户端
//
// 这一层只暴露 SFTP 原语与原始状态码，错误的归类由 provider 负责。

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

use super::types::FileType;

/// 读取文件时每次读取的块大小
const READ_CHUNK_SIZE: usize = 32 * 1024;

/// SFTP 状态码（只区分上层需要的几种）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireStatus {
    NoSuchFile,
    PermissionDenied,
    Failure,
    OpUnsupported,
    NoConnection,
    ConnectionLost,
    Other,
}

impl From<StatusCode> for WireStatus {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::NoSuchFile => WireStatus::NoSuchFile,
            StatusCode::PermissionDenied => WireStatus::PermissionDenied,
            StatusCode::Failure => WireStatus::Failure,
            StatusCode::OpUnsupported => WireStatus::OpUnsupported,
            StatusCode::NoConnection => WireStatus::NoConnection,
            StatusCode::ConnectionLost => WireStatus::ConnectionLost,
            _ => WireStatus::Other,
        }
    }
}

/// SFTP 线路错误
#[derive(Debug, Clone, Error)]
pub enum WireError {
    /// 服务器返回的状态
    #[error("{message} ({code:?})")]
    Status { code: WireStatus, message: String },

    /// 通道或连接层面的失败
    #[error("{0}")]
    Transport(String),
}

impl WireError {
    pub fn status(code: WireStatus, message: impl Into<String>) -> Self {
        WireError::Status {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<WireStatus> {
        match self {
            WireError::Status { code, .. } => Some(*code),
            WireError::Transport(_) => None,
        }
    }
}

impl From<russh_sftp::client::error::Error> for WireError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        match e {
            russh_sftp::client::error::Error::Status(status) => WireError::Status {
                code: status.status_code.into(),
                message: status.error_message,
            },
            other => WireError::Transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        WireError::Transport(e.to_string())
    }
}

/// 文件属性（线路层）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireAttributes {
    pub file_type: FileType,
    pub size: u64,
    /// 修改时间（Unix 秒）
    pub mtime: u64,
}

impl From<&FileAttributes> for WireAttributes {
    fn from(attrs: &FileAttributes) -> Self {
        Self {
            file_type: FileType::from_permissions(attrs.permissions.map(|p| p as u32)),
            size: attrs.size.unwrap_or(0),
            mtime: attrs.mtime.map(|t| t as u64).unwrap_or(0),
        }
    }
}

/// 目录条目（线路层）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireDirEntry {
    pub name: String,
    pub attrs: WireAttributes,
}

/// SFTP 子协议通道
#[async_trait]
pub trait SftpBackend: Send + Sync {
    /// STAT（跟随符号链接）
    async fn stat(&self, path: &str) -> Result<WireAttributes, WireError>;

    /// LSTAT（不跟随符号链接）
    async fn lstat(&self, path: &str) -> Result<WireAttributes, WireError>;

    /// 列出目录，不包含 `.` 和 `..`
    async fn read_dir(&self, path: &str) -> Result<Vec<WireDirEntry>, WireError>;

    async fn create_dir(&self, path: &str) -> Result<(), WireError>;

    async fn remove_dir(&self, path: &str) -> Result<(), WireError>;

    async fn remove_file(&self, path: &str) -> Result<(), WireError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), WireError>;

    /// 流式读取整个文件
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, WireError>;

    /// 创建或截断后流式写入，刷新完成后返回
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), WireError>;
}

#[async_trait]
impl SftpBackend for SftpSession {
    async fn stat(&self, path: &str) -> Result<WireAttributes, WireError> {
        let attrs = self.metadata(path).await?;
        Ok(WireAttributes::from(&attrs))
    }

    async fn lstat(&self, path: &str) -> Result<WireAttributes, WireError> {
        let attrs = self.symlink_metadata(path).await?;
        Ok(WireAttributes::from(&attrs))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<WireDirEntry>, WireError> {
        let dir = SftpSession::read_dir(self, path).await?;

        let entries = dir
            .filter_map(|entry| {
                let name = entry.file_name().to_string();
                // 跳过 . 和 ..
                if name == "." || name == ".." {
                    return None;
                }
                Some(WireDirEntry {
                    attrs: WireAttributes::from(&entry.metadata()),
                    name,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn create_dir(&self, path: &str) -> Result<(), WireError> {
        SftpSession::create_dir(self, path).await?;
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<(), WireError> {
        SftpSession::remove_dir(self, path).await?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), WireError> {
        SftpSession::remove_file(self, path).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), WireError> {
        SftpSession::rename(self, from, to).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, WireError> {
        let mut file = self.open(path).await?;

        let mut content = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..n]);
        }

        trace!("[SFTP] Read {} bytes from {}", content.len(), path);
        Ok(content)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), WireError> {
        let mut file = self
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await?;

        file.write_all(data).await?;
        file.flush().await?;
        file.shutdown().await?;

        trace!("[SFTP] Wrote {} bytes to {}", data.len(), path);
        Ok(())
    }
}
