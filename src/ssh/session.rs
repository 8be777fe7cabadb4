// SSH 会话管理
// 连接成功后的会话对象，提供多通道支持

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use super::error::SshError;
use super::handler::SshClientHandler;
use super::transport::{ChannelCapabilities, ShellChannel, Transport};
use crate::constants::terminal;
use crate::services::sftp::SftpBackend;

/// PTY 请求参数
#[derive(Clone, Debug, PartialEq)]
pub struct PtyRequest {
    /// 终端类型
    pub term: String,
    /// 列数
    pub col_width: u32,
    /// 行数
    pub row_height: u32,
    /// 像素宽度
    pub pix_width: u32,
    /// 像素高度
    pub pix_height: u32,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: terminal::TERM.to_string(),
            col_width: terminal::DEFAULT_COLS,
            row_height: terminal::DEFAULT_ROWS,
            pix_width: 0,
            pix_height: 0,
        }
    }
}

/// SSH 会话（连接成功后）
/// 内部持有 Handle，支持并发打开多个通道
pub struct SshSession {
    /// 连接标识 user@host:port
    id: String,
    /// 共享的 russh Handle（Arc 包装）
    handle: Arc<Handle<SshClientHandler>>,
    /// 关闭状态广播
    closed: Arc<watch::Sender<bool>>,
}

impl SshSession {
    /// 创建新的会话
    ///
    /// `closed` 与 Handler 共享，russh 会话任务结束时由 Handler 置位。
    pub fn new(
        id: String,
        handle: Handle<SshClientHandler>,
        closed: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            id,
            handle: Arc::new(handle),
            closed,
        }
    }

    /// 标记会话断开
    fn mark_disconnected(&self) {
        self.closed.send_replace(true);
    }

    fn ensure_alive(&self) -> Result<(), SshError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SshError::Transport(format!(
                "Session {} is disconnected",
                self.id
            )))
        }
    }
}

#[async_trait]
impl Transport for SshSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_alive(&self) -> bool {
        !*self.closed.borrow() && !self.handle.is_closed()
    }

    fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// 打开 SFTP 通道
    async fn open_sftp(&self) -> Result<Arc<dyn SftpBackend>, SshError> {
        self.ensure_alive()?;

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(SshError::from)?;

        // 请求 SFTP 子系统
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(SshError::from)?;

        // 使用 russh-sftp 包装通道
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::Channel(format!("Failed to create SFTP session: {}", e)))?;

        debug!("[SFTP] SFTP channel opened on {}", self.id);
        Ok(Arc::new(sftp))
    }

    /// 打开终端 Shell 通道
    async fn open_shell(&self, pty: PtyRequest) -> Result<Arc<dyn ShellChannel>, SshError> {
        self.ensure_alive()?;

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(SshError::from)?;

        // 请求 PTY
        channel
            .request_pty(
                false,
                &pty.term,
                pty.col_width,
                pty.row_height,
                pty.pix_width,
                pty.pix_height,
                &[],
            )
            .await
            .map_err(SshError::from)?;

        // 请求 Shell
        channel.request_shell(true).await.map_err(SshError::from)?;

        debug!(
            "[SSH] [{}] Shell opened ({}x{}, {})",
            self.id, pty.col_width, pty.row_height, pty.term
        );
        Ok(Arc::new(TerminalChannel::spawn(self.id.clone(), channel)))
    }

    /// 关闭会话
    async fn close(&self) -> Result<(), SshError> {
        let result = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await;
        self.mark_disconnected();
        result.map_err(SshError::from)
    }
}

// 使用 russh::client::Msg 作为消息类型
type RusshChannel = russh::Channel<Msg>;

/// 发往通道任务的指令
enum ChannelCommand {
    Data(Vec<u8>),
    Resize { cols: u32, rows: u32 },
    Close,
}

/// 终端通道
/// 通道由单独的任务独占，读写与 resize 通过消息传递，互不阻塞
pub struct TerminalChannel {
    output: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl TerminalChannel {
    fn spawn(session_id: String, mut channel: RusshChannel) -> Self {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = channel.wait() => match msg {
                        Some(ChannelMsg::Data { data }) => {
                            if output_tx.send(data.to_vec()).is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExtendedData { data, .. }) => {
                            if output_tx.send(data.to_vec()).is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExitStatus { exit_status }) => {
                            debug!("[SSH] [{}] Shell exited with {}", session_id, exit_status);
                        }
                        // EOF 之后仍可能有 ExitStatus，等待 Close
                        Some(ChannelMsg::Eof) => {}
                        Some(ChannelMsg::Close) | None => break,
                        Some(_) => {}
                    },
                    command = command_rx.recv() => match command {
                        Some(ChannelCommand::Data(data)) => {
                            if let Err(e) = channel.data(&data[..]).await {
                                warn!("[SSH] [{}] Failed to write to shell: {}", session_id, e);
                                break;
                            }
                        }
                        Some(ChannelCommand::Resize { cols, rows }) => {
                            if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                                warn!("[SSH] [{}] Failed to resize shell: {}", session_id, e);
                            }
                        }
                        Some(ChannelCommand::Close) => {
                            if let Err(e) = channel.close().await {
                                warn!("[SSH] [{}] Failed to close shell: {}", session_id, e);
                                break;
                            }
                        }
                        None => {
                            let _ = channel.eof().await;
                            break;
                        }
                    },
                }
            }
            // output_tx 在此处释放，读取端随即收到 None
            debug!("[SSH] [{}] Shell channel task finished", session_id);
        });

        Self {
            output: Mutex::new(output_rx),
            commands: command_tx,
        }
    }

    fn send(&self, command: ChannelCommand) -> Result<(), SshError> {
        self.commands
            .send(command)
            .map_err(|_| SshError::Channel("Shell channel is closed".to_string()))
    }
}

#[async_trait]
impl ShellChannel for TerminalChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities { resize: true }
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, SshError> {
        Ok(self.output.lock().await.recv().await)
    }

    async fn write(&self, data: &[u8]) -> Result<(), SshError> {
        self.send(ChannelCommand::Data(data.to_vec()))
    }

    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SshError> {
        self.send(ChannelCommand::Resize { cols, rows })
    }

    async fn close(&self) -> Result<(), SshError> {
        self.send(ChannelCommand::Close)
    }
}
