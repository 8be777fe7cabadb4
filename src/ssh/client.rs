// SSH 客户端核心实现

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{AuthResult, Handle};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info};

use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::handler::SshClientHandler;
use super::session::SshSession;
use super::transport::{Connector, Transport};

/// SSH 客户端
/// 负责建立 SSH 连接（TCP、握手、认证）并返回 SshSession
#[derive(Clone, Copy, Debug, Default)]
pub struct SshClient;

impl SshClient {
    pub fn new() -> Self {
        Self
    }

    /// 执行连接（不含超时控制）
    async fn establish(&self, config: &SshConfig, id: &str) -> Result<SshSession, SshError> {
        // TCP 连接
        debug!("[SSH] [{}] Connecting to {}:{}...", id, config.host, config.port);
        let tcp_stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(SshError::Io)?;
        debug!("[SSH] [{}] TCP connection established", id);

        // SSH 握手
        let russh_config = Arc::new(config.to_russh_config());
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);
        let handler = SshClientHandler::new(id.to_string(), closed.clone());
        let mut handle = russh::client::connect_stream(russh_config, tcp_stream, handler)
            .await
            .map_err(SshError::from)?;
        debug!("[SSH] [{}] SSH handshake completed", id);

        // 认证
        self.authenticate(config, &mut handle).await?;
        info!("[SSH] [{}] Authentication successful", id);

        Ok(SshSession::new(id.to_string(), handle, closed))
    }

    /// 执行认证
    async fn authenticate(
        &self,
        config: &SshConfig,
        handle: &mut Handle<SshClientHandler>,
    ) -> Result<(), SshError> {
        let (method, auth_result) = match &config.auth {
            AuthMethod::Password(password) => {
                debug!("[SSH] Using password authentication");
                let result = handle
                    .authenticate_password(&config.username, password)
                    .await
                    .map_err(SshError::from)?;
                ("Password", result)
            }
            AuthMethod::PublicKey {
                key_path,
                passphrase,
            } => {
                debug!("[SSH] Using public key authentication: {:?}", key_path);
                let key = load_private_key(key_path, passphrase.as_deref()).await?;

                let key_with_alg = russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), None);
                let result = handle
                    .authenticate_publickey(&config.username, key_with_alg)
                    .await
                    .map_err(SshError::from)?;
                ("Public key", result)
            }
            AuthMethod::None => {
                debug!("[SSH] No credential supplied, trying 'none' authentication");
                let result = handle
                    .authenticate_none(&config.username)
                    .await
                    .map_err(SshError::from)?;
                ("None", result)
            }
        };

        match auth_result {
            AuthResult::Success => Ok(()),
            AuthResult::Failure {
                remaining_methods,
                partial_success,
            } => {
                if partial_success {
                    return Err(SshError::Auth(
                        "Partial authentication - additional auth required".to_string(),
                    ));
                }
                Err(SshError::Auth(format!(
                    "{} authentication failed. Server suggests: {:?}",
                    method, remaining_methods
                )))
            }
        }
    }
}

#[async_trait]
impl Connector for SshClient {
    async fn connect(&self, config: &SshConfig) -> Result<Arc<dyn Transport>, SshError> {
        let id = config.identity().key();
        let session = timeout(config.connect_timeout(), self.establish(config, &id))
            .await
            .map_err(|_| SshError::Timeout(config.connect_timeout_ms))??;
        Ok(Arc::new(session))
    }
}

/// 加载私钥文件
async fn load_private_key(
    key_path: &Path,
    passphrase: Option<&str>,
) -> Result<russh::keys::PrivateKey, SshError> {
    let key_data = tokio::fs::read_to_string(key_path)
        .await
        .map_err(|e| SshError::Key(format!("Failed to read key file {:?}: {}", key_path, e)))?;

    russh::keys::decode_secret_key(&key_data, passphrase)
        .map_err(|e| SshError::Key(format!("Failed to decode key {:?}: {}", key_path, e)))
}
