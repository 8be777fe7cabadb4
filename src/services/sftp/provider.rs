// 远程文件系统适配器
//
// 把类 POSIX 的文件操作映射为 SFTP 调用。每个操作独立获取 SFTP 通道，
// 不缓存任何目录或属性结果。

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use super::backend::{SftpBackend, WireError, WireStatus};
use super::types::{
    join_path, DeleteOptions, FileStat, FileType, RemoteUri, RenameOptions, WatchHandle,
    WatchOptions, WriteOptions,
};
use crate::ssh::{SshError, SshManager};

/// 远程文件系统
pub struct RemoteFileSystem {
    manager: Arc<SshManager>,
}

impl RemoteFileSystem {
    pub fn new(manager: Arc<SshManager>) -> Self {
        Self { manager }
    }

    /// 通过主机名找到存活连接并打开 SFTP 通道
    async fn sftp(&self, uri: &RemoteUri) -> Result<Arc<dyn SftpBackend>, SshError> {
        let transport = self
            .manager
            .get_connection(&uri.authority)
            .ok_or_else(|| SshError::Unavailable(uri.authority.clone()))?;
        transport.open_sftp().await
    }

    /// 注册变更监听（远程不支持推送，永不触发）
    pub fn watch(&self, uri: &RemoteUri, options: WatchOptions) -> WatchHandle {
        debug!(
            "[SFTP] Watch requested for {} (recursive={}, excludes={}), remote changes are not pushed",
            uri,
            options.recursive,
            options.excludes.len()
        );
        WatchHandle::default()
    }

    /// 获取文件/目录属性
    pub async fn stat(&self, uri: &RemoteUri) -> Result<FileStat, SshError> {
        let sftp = self.sftp(uri).await?;
        let attrs = sftp
            .stat(&uri.path)
            .await
            .map_err(|e| classify(e, &uri.path))?;

        let mtime = attrs.mtime * 1000;
        Ok(FileStat {
            file_type: attrs.file_type,
            size: attrs.size,
            mtime,
            ctime: mtime,
        })
    }

    /// 读取目录内容
    pub async fn read_directory(&self, uri: &RemoteUri) -> Result<Vec<(String, FileType)>, SshError> {
        let sftp = self.sftp(uri).await?;
        let entries = sftp
            .read_dir(&uri.path)
            .await
            .map_err(|e| classify(e, &uri.path))?;

        debug!("[SFTP] Read {} entries from {}", entries.len(), uri);
        Ok(entries
            .into_iter()
            .map(|entry| (entry.name, entry.attrs.file_type))
            .collect())
    }

    /// 创建目录
    pub async fn create_directory(&self, uri: &RemoteUri) -> Result<(), SshError> {
        let sftp = self.sftp(uri).await?;
        info!("[SFTP] Creating directory: {}", uri);
        sftp.create_dir(&uri.path).await.map_err(|e| match e.code() {
            // SFTP v3 没有单独的"已存在"状态，mkdir 的通用失败即视为已存在
            Some(WireStatus::Failure) => SshError::AlreadyExists(uri.path.clone()),
            _ => classify(e, &uri.path),
        })
    }

    /// 读取整个文件
    pub async fn read_file(&self, uri: &RemoteUri) -> Result<Vec<u8>, SshError> {
        let sftp = self.sftp(uri).await?;
        let content = sftp
            .read_file(&uri.path)
            .await
            .map_err(|e| classify(e, &uri.path))?;
        debug!("[SFTP] Read {} bytes from {}", content.len(), uri);
        Ok(content)
    }

    /// 写入文件
    pub async fn write_file(
        &self,
        uri: &RemoteUri,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<(), SshError> {
        let sftp = self.sftp(uri).await?;

        // 任何 stat 错误都视为不存在
        let exists = sftp.stat(&uri.path).await.is_ok();
        if !exists && !options.create {
            return Err(SshError::NotFound(uri.path.clone()));
        }
        if exists && options.create && !options.overwrite {
            return Err(SshError::AlreadyExists(uri.path.clone()));
        }

        sftp.write_file(&uri.path, content)
            .await
            .map_err(|e| classify(e, &uri.path))?;
        debug!("[SFTP] Wrote {} bytes to {}", content.len(), uri);
        Ok(())
    }

    /// 删除文件或目录
    pub async fn delete(&self, uri: &RemoteUri, options: DeleteOptions) -> Result<(), SshError> {
        let sftp = self.sftp(uri).await?;
        // 不跟随符号链接：删除链接本身，绝不进入链接指向的目录
        let attrs = sftp
            .lstat(&uri.path)
            .await
            .map_err(|e| classify(e, &uri.path))?;

        info!(
            "[SFTP] Deleting {} (recursive={})",
            uri, options.recursive
        );
        let result = match attrs.file_type {
            FileType::Directory if options.recursive => remove_tree(sftp.as_ref(), &uri.path).await,
            // 非空目录由服务器拒绝，不做进一步转换
            FileType::Directory => sftp.remove_dir(&uri.path).await,
            _ => sftp.remove_file(&uri.path).await,
        };
        result.map_err(|e| classify(e, &uri.path))
    }

    /// 重命名文件或目录
    ///
    /// 覆盖目标时先尝试直接重命名；服务器拒绝且目标存在时，
    /// 删除目标（文件或空目录）后再重试一次。这一过程不是原子的。
    pub async fn rename(
        &self,
        old_uri: &RemoteUri,
        new_uri: &RemoteUri,
        options: RenameOptions,
    ) -> Result<(), SshError> {
        if old_uri.authority != new_uri.authority {
            return Err(SshError::Config(format!(
                "Cannot rename across hosts: {} -> {}",
                old_uri, new_uri
            )));
        }

        let sftp = self.sftp(old_uri).await?;
        let (from, to) = (&old_uri.path, &new_uri.path);

        if !options.overwrite {
            if sftp.lstat(to).await.is_ok() {
                return Err(SshError::AlreadyExists(to.clone()));
            }
            info!("[SFTP] Renaming {} -> {}", from, to);
            return sftp.rename(from, to).await.map_err(|e| classify(e, from));
        }

        info!("[SFTP] Renaming {} -> {} (overwrite)", from, to);
        let first_error = match sftp.rename(from, to).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let target = match sftp.lstat(to).await {
            Ok(attrs) => attrs,
            Err(_) => return Err(classify(first_error, from)),
        };

        warn!(
            "[SFTP] Server refused to overwrite {}, deleting it before rename",
            to
        );
        let removed = match target.file_type {
            FileType::Directory => sftp.remove_dir(to).await,
            _ => sftp.remove_file(to).await,
        };
        removed.map_err(|e| classify(e, to))?;

        sftp.rename(from, to).await.map_err(|e| classify(e, from))
    }
}

/// 深度优先删除目录树：先清空子目录再删除自身
fn remove_tree<'a>(sftp: &'a dyn SftpBackend, path: &'a str) -> BoxFuture<'a, Result<(), WireError>> {
    Box::pin(async move {
        for entry in sftp.read_dir(path).await? {
            let child = join_path(path, &entry.name);
            if entry.attrs.file_type == FileType::Directory {
                remove_tree(sftp, &child).await?;
            } else {
                // 符号链接不跟随，直接删除链接本身
                sftp.remove_file(&child).await?;
            }
        }
        sftp.remove_dir(path).await
    })
}

/// 线路错误归类：不存在 → NotFound，连接层失败 → Transport，其余原样透传
fn classify(err: WireError, path: &str) -> SshError {
    match err {
        WireError::Status {
            code: WireStatus::NoSuchFile,
            ..
        } => SshError::NotFound(path.to_string()),
        WireError::Status {
            code: WireStatus::NoConnection | WireStatus::ConnectionLost,
            message,
        } => SshError::Transport(message),
        WireError::Status { code, message } => {
            SshError::Protocol(format!("{}: {} ({:?})", path, message, code))
        }
        WireError::Transport(message) => SshError::Transport(message),
    }
}
