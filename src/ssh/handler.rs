// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait

use std::future::Future;
use std::sync::Arc;

use russh::keys::PublicKey;
use tokio::sync::watch;
use tracing::{debug, info};

/// SSH 客户端 Handler
/// 处理 SSH 连接过程中的各种回调
pub struct SshClientHandler {
    /// 连接标识（用于日志）
    connection_id: String,
    /// 关闭状态广播，与 SshSession 共享
    closed: Arc<watch::Sender<bool>>,
}

impl SshClientHandler {
    /// 创建新的 Handler
    pub fn new(connection_id: String, closed: Arc<watch::Sender<bool>>) -> Self {
        Self {
            connection_id,
            closed,
        }
    }
}

/// russh 会话任务结束时释放 Handler，此时通知会话已断开
impl Drop for SshClientHandler {
    fn drop(&mut self) {
        if !self.closed.send_replace(true) {
            info!("[SSH] [{}] Transport closed", self.connection_id);
        }
    }
}

impl russh::client::Handler for SshClientHandler {
    type Error = russh::Error;

    /// 检查服务器公钥
    /// 主机密钥校验不在本模块职责内，这里记录指纹后接受
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let fingerprint = server_public_key.fingerprint(russh::keys::ssh_key::HashAlg::Sha256);

        info!(
            "[SSH] [{}] Server key fingerprint: {}",
            self.connection_id, fingerprint
        );
        debug!(
            "[SSH] [{}] Server key type: {}",
            self.connection_id,
            server_public_key.algorithm()
        );

        async { Ok(true) }
    }
}
