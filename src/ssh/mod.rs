// SSH 连接模块
//
// 模块结构:
// - config: 连接配置 (SshConfig, AuthMethod, Credential, KeepaliveConfig)
// - error: 错误类型 (SshError)
// - event: 诊断日志 (LogEntry, LogLevel, ConnectionLog)
// - handler: russh Handler 实现
// - transport: 传输层抽象 (Transport, Connector, ShellChannel)
// - client: 基于 russh 的连接器
// - session: SSH 会话 (SshSession, TerminalChannel, PtyRequest)
// - manager: 连接管理器 (SshManager, ConnectionRegistry)

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod manager;
pub mod session;
pub mod transport;

// 公开导出
pub use client::SshClient;
pub use config::{AuthMethod, Credential, KeepaliveConfig, SshConfig};
pub use error::SshError;
pub use event::{ConnectionLog, LogEntry, LogLevel};
pub use manager::{ConnectionRegistry, SharedTransport, SshManager};
pub use session::{PtyRequest, SshSession, TerminalChannel};
pub use transport::{ChannelCapabilities, Connector, ShellChannel, Transport};
