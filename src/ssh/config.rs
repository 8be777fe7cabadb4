// SSH 连接配置

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_KEEPALIVE_INTERVAL_MS, DEFAULT_KEEPALIVE_MAX, DEFAULT_PORT,
};
use crate::models::host::{HostIdentity, HostRecord};
use crate::models::settings::ConnectionSettings;

/// SSH 连接配置
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// 目标主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 认证方式
    pub auth: AuthMethod,
    /// 连接超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 心跳配置
    pub keepalive: KeepaliveConfig,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            auth: AuthMethod::None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

/// 调用方提供的凭据
///
/// 密码与私钥互斥使用：两者都给出时以密码为准。
#[derive(Clone, Debug, Default)]
pub struct Credential {
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl Credential {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Default::default()
        }
    }

    pub fn private_key(key_path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            private_key: Some(key_path.into()),
            passphrase,
            ..Default::default()
        }
    }
}

/// 认证方式
#[derive(Clone, Debug, PartialEq)]
pub enum AuthMethod {
    /// 密码认证
    Password(String),
    /// 公钥认证
    PublicKey {
        /// 私钥文件路径
        key_path: PathBuf,
        /// 私钥密码（如果有）
        passphrase: Option<String>,
    },
    /// 不携带任何凭据，由服务器决定是否放行
    None,
}

impl AuthMethod {
    /// 从凭据中选择认证方式（密码优先于私钥）
    pub fn from_credential(credential: Credential) -> Self {
        if let Some(password) = credential.password {
            return AuthMethod::Password(password);
        }
        if let Some(key_path) = credential.private_key {
            return AuthMethod::PublicKey {
                key_path,
                passphrase: credential.passphrase,
            };
        }
        AuthMethod::None
    }
}

/// 心跳配置
#[derive(Clone, Debug, PartialEq)]
pub struct KeepaliveConfig {
    /// 是否启用心跳
    pub enabled: bool,
    /// 心跳间隔（毫秒）
    pub interval_ms: u64,
    /// 容忍的连续未响应次数
    pub max_retries: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            max_retries: DEFAULT_KEEPALIVE_MAX,
        }
    }
}

impl SshConfig {
    /// 从主机记录、凭据和连接设置构建配置
    pub fn from_host(
        record: &HostRecord,
        credential: Credential,
        settings: &ConnectionSettings,
    ) -> Self {
        // 调用方没有给凭据时退回主机记录里的 IdentityFile
        let credential = if credential.password.is_none() && credential.private_key.is_none() {
            Credential {
                private_key: record.private_key_path.clone(),
                ..credential
            }
        } else {
            credential
        };

        Self {
            host: record.host.clone(),
            port: record.port.unwrap_or(DEFAULT_PORT),
            username: record.user.clone(),
            auth: AuthMethod::from_credential(credential),
            connect_timeout_ms: settings.connect_timeout_ms,
            keepalive: KeepaliveConfig {
                enabled: settings.keepalive_interval_ms > 0,
                interval_ms: settings.keepalive_interval_ms,
                max_retries: settings.keepalive_max,
            },
        }
    }

    /// 连接去重使用的主机标识
    pub fn identity(&self) -> HostIdentity {
        HostIdentity::new(&self.username, &self.host, Some(self.port))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 构建 russh 配置
    pub fn to_russh_config(&self) -> russh::client::Config {
        let mut config = russh::client::Config::default();
        // 空闲连接由心跳检测，不设置不活动超时
        config.inactivity_timeout = None;
        if self.keepalive.enabled {
            config.keepalive_interval = Some(Duration::from_millis(self.keepalive.interval_ms));
            config.keepalive_max = self.keepalive.max_retries as usize;
        }
        config
    }
}
