// 传输层抽象
//
// 连接管理器、文件系统适配器和终端桥接只依赖这里的 trait，
// russh 的具体实现见 client.rs / session.rs。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::config::SshConfig;
use super::error::SshError;
use super::session::PtyRequest;
use crate::services::sftp::SftpBackend;

/// 已认证的传输会话（一条可多路复用的 SSH 连接）
#[async_trait]
pub trait Transport: Send + Sync {
    /// 规范化的主机标识键
    fn id(&self) -> &str;

    /// 传输是否仍然存活
    fn is_alive(&self) -> bool;

    /// 订阅关闭通知，值变为 `true` 表示传输已关闭
    fn subscribe_closed(&self) -> watch::Receiver<bool>;

    /// 打开一个新的 SFTP 子系统通道
    async fn open_sftp(&self) -> Result<Arc<dyn SftpBackend>, SshError>;

    /// 打开一个带 PTY 的交互式 shell 通道
    async fn open_shell(&self, pty: PtyRequest) -> Result<Arc<dyn ShellChannel>, SshError>;

    /// 主动关闭传输
    async fn close(&self) -> Result<(), SshError>;
}

/// 建立传输会话
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &SshConfig) -> Result<Arc<dyn Transport>, SshError>;
}

/// 通道能力，在打开时检查一次
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelCapabilities {
    /// 是否支持 window-change
    pub resize: bool,
}

/// 交互式 shell 通道
#[async_trait]
pub trait ShellChannel: Send + Sync {
    fn capabilities(&self) -> ChannelCapabilities;

    /// 读取下一段输出（stdout 与 stderr 合并，按到达顺序）
    /// 返回 None 表示通道已关闭
    async fn read(&self) -> Result<Option<Vec<u8>>, SshError>;

    /// 写入原始字节
    async fn write(&self, data: &[u8]) -> Result<(), SshError>;

    /// 调整远程 PTY 尺寸
    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SshError>;

    /// 关闭通道，随后 `read` 会返回 None
    async fn close(&self) -> Result<(), SshError>;
}
