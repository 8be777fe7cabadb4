// SFTP 基础数据类型

use std::fmt;

use crate::constants::URI_SCHEME;
use crate::ssh::SshError;

/// 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// 普通文件
    File,
    /// 目录
    Directory,
    /// 符号链接
    Symlink,
    /// 其他类型
    #[default]
    Unknown,
}

impl FileType {
    /// 根据 Unix 权限位中的文件类型字段判断
    pub fn from_permissions(permissions: Option<u32>) -> Self {
        const S_IFMT: u32 = 0o170000;
        match permissions.map(|mode| mode & S_IFMT) {
            Some(0o040000) => FileType::Directory,
            Some(0o100000) => FileType::File,
            Some(0o120000) => FileType::Symlink,
            _ => FileType::Unknown,
        }
    }
}

/// stat 结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub file_type: FileType,
    /// 文件大小（字节）
    pub size: u64,
    /// 修改时间（Unix 毫秒）
    pub mtime: u64,
    /// SFTP 不提供创建时间，与 mtime 相同
    pub ctime: u64,
}

/// writeFile 选项
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub create: bool,
    pub overwrite: bool,
}

/// delete 选项
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub recursive: bool,
}

/// rename 选项
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOptions {
    pub overwrite: bool,
}

/// watch 选项
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub recursive: bool,
    pub excludes: Vec<String>,
}

/// watch 返回的句柄
///
/// 远程没有变更通知，句柄永远不会触发，释放时也无需清理。
#[derive(Debug, Default)]
pub struct WatchHandle {
    disposed: bool,
}

impl WatchHandle {
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// 远程资源地址 `openssh://<主机名><绝对路径>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUri {
    /// 主机标识名，用于查找连接
    pub authority: String,
    /// 绝对 POSIX 路径
    pub path: String,
}

impl RemoteUri {
    pub fn new(authority: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.is_empty() {
            "/".to_string()
        } else if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self {
            authority: authority.into(),
            path,
        }
    }

    /// 解析 `openssh://host/path`
    pub fn parse(uri: &str) -> Result<Self, SshError> {
        let rest = uri
            .strip_prefix(URI_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(|| SshError::Config(format!("Not an {} URI: {}", URI_SCHEME, uri)))?;

        let (authority, path) = match rest.find('/') {
            Some(pos) => rest.split_at(pos),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(SshError::Config(format!("Missing host in URI: {}", uri)));
        }
        Ok(Self::new(authority, path))
    }

    /// 同一主机下的子路径
    pub fn join(&self, name: &str) -> Self {
        Self::new(self.authority.clone(), join_path(&self.path, name))
    }
}

impl fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", URI_SCHEME, self.authority, self.path)
    }
}

/// 连接路径
pub fn join_path(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "home"), "/home");
        assert_eq!(join_path("/home", "user"), "/home/user");
        assert_eq!(join_path("/home/", "user"), "/home/user");
    }

    #[test]
    fn test_file_type_from_mode() {
        assert_eq!(FileType::from_permissions(Some(0o040755)), FileType::Directory);
        assert_eq!(FileType::from_permissions(Some(0o100644)), FileType::File);
        assert_eq!(FileType::from_permissions(Some(0o120777)), FileType::Symlink);
        assert_eq!(FileType::from_permissions(Some(0o020666)), FileType::Unknown);
        assert_eq!(FileType::from_permissions(None), FileType::Unknown);
    }

    #[test]
    fn test_parse_uri() {
        let uri = RemoteUri::parse("openssh://prod/var/log/syslog").unwrap();
        assert_eq!(uri.authority, "prod");
        assert_eq!(uri.path, "/var/log/syslog");
        assert_eq!(uri.to_string(), "openssh://prod/var/log/syslog");

        let root = RemoteUri::parse("openssh://prod").unwrap();
        assert_eq!(root.path, "/");
        assert_eq!(root.join("etc").path, "/etc");

        assert!(RemoteUri::parse("file:///etc").is_err());
        assert!(RemoteUri::parse("openssh:///etc").is_err());
    }
}
