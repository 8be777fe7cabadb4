// 主机记录与主机标识

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PORT;

/// 主机记录（来自 ssh config 文件）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Host 块名称
    pub name: String,
    /// HostName
    pub host: String,
    /// Port（缺省为 22）
    pub port: Option<u16>,
    /// User
    pub user: String,
    /// IdentityFile
    pub private_key_path: Option<PathBuf>,
}

impl HostRecord {
    pub fn identity(&self) -> HostIdentity {
        HostIdentity::new(&self.user, &self.host, self.port)
    }

    /// 列表展示用的描述，如 `root@10.0.0.1:22`
    pub fn description(&self) -> String {
        self.identity().key()
    }
}

/// 主机标识 (user, host, port)
///
/// 规范化为 `user@host:port` 作为连接去重的唯一键。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HostIdentity {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl HostIdentity {
    pub fn new(user: &str, host: &str, port: Option<u16>) -> Self {
        Self {
            user: user.to_string(),
            host: host.to_string(),
            port: port.unwrap_or(DEFAULT_PORT),
        }
    }

    /// 规范化的连接键
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}
