// 测试辅助：内存文件系统与伪造的传输层

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::services::sftp::backend::{
    SftpBackend, WireAttributes, WireDirEntry, WireError, WireStatus,
};
use crate::services::sftp::types::FileType;
use crate::ssh::config::SshConfig;
use crate::ssh::error::SshError;
use crate::ssh::session::PtyRequest;
use crate::ssh::transport::{ChannelCapabilities, Connector, ShellChannel, Transport};

/// 轮询等待条件成立，超时则测试失败
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

// ======================== MemoryFs ========================

/// 父路径，根目录的父路径仍是根目录
fn get_parent_path(path: &str) -> String {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
    }
}

#[derive(Clone, Debug)]
enum Node {
    File { content: Vec<u8>, mtime: u64 },
    Dir { mtime: u64 },
    /// 目标为 None 时是悬空链接
    Symlink { target: Option<String> },
}

impl Node {
    fn attrs(&self) -> WireAttributes {
        match self {
            Node::File { content, mtime } => WireAttributes {
                file_type: FileType::File,
                size: content.len() as u64,
                mtime: *mtime,
            },
            Node::Dir { mtime } => WireAttributes {
                file_type: FileType::Directory,
                size: 4096,
                mtime: *mtime,
            },
            Node::Symlink { .. } => WireAttributes {
                file_type: FileType::Symlink,
                size: 0,
                mtime: 0,
            },
        }
    }
}

/// 内存中的远程文件系统，按 SFTP v3 服务器的方式返回状态码
pub struct MemoryFs {
    nodes: Mutex<BTreeMap<String, Node>>,
    connection_lost: AtomicBool,
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir { mtime: 0 });
        Self {
            nodes: Mutex::new(nodes),
            connection_lost: AtomicBool::new(false),
        }
    }

    pub fn add_dir(&self, path: &str) {
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_string(), Node::Dir { mtime: 0 });
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.nodes.lock().unwrap().insert(
            path.to_string(),
            Node::File {
                content: content.to_vec(),
                mtime: 0,
            },
        );
    }

    /// 悬空符号链接（stat 跟随后不存在，列目录时可见）
    pub fn add_symlink(&self, path: &str) {
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_string(), Node::Symlink { target: None });
    }

    /// 指向 `target` 的符号链接
    pub fn add_symlink_to(&self, path: &str, target: &str) {
        self.nodes.lock().unwrap().insert(
            path.to_string(),
            Node::Symlink {
                target: Some(target.to_string()),
            },
        );
    }

    pub fn set_mtime(&self, path: &str, secs: u64) {
        match self.nodes.lock().unwrap().get_mut(path) {
            Some(Node::File { mtime, .. }) | Some(Node::Dir { mtime }) => *mtime = secs,
            _ => panic!("no file or directory at {}", path),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.lock().unwrap().contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.lock().unwrap().get(path), Some(Node::Dir { .. }))
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.nodes.lock().unwrap().keys().cloned().collect()
    }

    /// 之后的所有操作都以连接丢失失败
    pub fn lose_connection(&self) {
        self.connection_lost.store(true, Ordering::SeqCst);
    }

    fn check_connection(&self) -> Result<(), WireError> {
        if self.connection_lost.load(Ordering::SeqCst) {
            Err(WireError::Transport("connection lost".to_string()))
        } else {
            Ok(())
        }
    }

    fn children(nodes: &BTreeMap<String, Node>, dir: &str) -> Vec<String> {
        nodes
            .keys()
            .filter(|path| path.as_str() != "/" && get_parent_path(path) == dir)
            .cloned()
            .collect()
    }
}

fn no_such_file() -> WireError {
    WireError::status(WireStatus::NoSuchFile, "No such file")
}

fn failure() -> WireError {
    WireError::status(WireStatus::Failure, "Failure")
}

/// 按服务器的方式解析路径：中间分量上的链接总是跟随，
/// 最后一个分量只在 `follow_last` 时跟随。解析失败返回 None。
fn resolve(nodes: &BTreeMap<String, Node>, path: &str, follow_last: bool) -> Option<String> {
    let mut pending: Vec<String> = path
        .split('/')
        .filter(|part| !part.is_empty())
        .rev()
        .map(str::to_string)
        .collect();
    let mut current = "/".to_string();
    let mut hops = 0;

    while let Some(part) = pending.pop() {
        let next = if current == "/" {
            format!("/{}", part)
        } else {
            format!("{}/{}", current, part)
        };
        let is_last = pending.is_empty();
        match nodes.get(&next) {
            Some(Node::Symlink { target }) if !is_last || follow_last => {
                hops += 1;
                if hops > 8 {
                    return None;
                }
                let target = target.as_deref()?;
                // 目标是绝对路径，把剩余分量接在目标之后重新解析
                pending.extend(
                    target
                        .split('/')
                        .filter(|part| !part.is_empty())
                        .rev()
                        .map(str::to_string),
                );
                current = "/".to_string();
            }
            _ => current = next,
        }
    }
    Some(current)
}

#[async_trait]
impl SftpBackend for MemoryFs {
    async fn stat(&self, path: &str) -> Result<WireAttributes, WireError> {
        self.check_connection()?;
        let nodes = self.nodes.lock().unwrap();
        let real = resolve(&nodes, path, true).ok_or_else(no_such_file)?;
        match nodes.get(&real) {
            Some(Node::Symlink { .. }) | None => Err(no_such_file()),
            Some(node) => Ok(node.attrs()),
        }
    }

    async fn lstat(&self, path: &str) -> Result<WireAttributes, WireError> {
        self.check_connection()?;
        let nodes = self.nodes.lock().unwrap();
        let real = resolve(&nodes, path, false).ok_or_else(no_such_file)?;
        match nodes.get(&real) {
            Some(node) => Ok(node.attrs()),
            None => Err(no_such_file()),
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<WireDirEntry>, WireError> {
        self.check_connection()?;
        let nodes = self.nodes.lock().unwrap();
        let real = resolve(&nodes, path, true).ok_or_else(no_such_file)?;
        match nodes.get(&real) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(failure()),
            None => return Err(no_such_file()),
        }
        // 条目属性不跟随链接，与服务器 READDIR 一致
        Ok(Self::children(&nodes, &real)
            .into_iter()
            .map(|child| WireDirEntry {
                attrs: nodes[&child].attrs(),
                name: child.rsplit('/').next().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn create_dir(&self, path: &str) -> Result<(), WireError> {
        self.check_connection()?;
        let mut nodes = self.nodes.lock().unwrap();
        let real = resolve(&nodes, path, false).ok_or_else(no_such_file)?;
        if nodes.contains_key(&real) {
            return Err(failure());
        }
        if !matches!(nodes.get(&get_parent_path(&real)), Some(Node::Dir { .. })) {
            return Err(no_such_file());
        }
        nodes.insert(real, Node::Dir { mtime: 0 });
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<(), WireError> {
        self.check_connection()?;
        let mut nodes = self.nodes.lock().unwrap();
        let real = resolve(&nodes, path, false).ok_or_else(no_such_file)?;
        match nodes.get(&real) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(failure()),
            None => return Err(no_such_file()),
        }
        if !Self::children(&nodes, &real).is_empty() {
            return Err(failure());
        }
        nodes.remove(&real);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), WireError> {
        self.check_connection()?;
        let mut nodes = self.nodes.lock().unwrap();
        let real = resolve(&nodes, path, false).ok_or_else(no_such_file)?;
        match nodes.get(&real) {
            Some(Node::Dir { .. }) => Err(failure()),
            Some(_) => {
                nodes.remove(&real);
                Ok(())
            }
            None => Err(no_such_file()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), WireError> {
        self.check_connection()?;
        let mut nodes = self.nodes.lock().unwrap();
        let from = resolve(&nodes, from, false).ok_or_else(no_such_file)?;
        let to = resolve(&nodes, to, false).ok_or_else(no_such_file)?;
        if !nodes.contains_key(&from) {
            return Err(no_such_file());
        }
        // SFTP v3 的 rename 不覆盖已存在的目标
        if nodes.contains_key(&to) {
            return Err(failure());
        }
        let moved: Vec<String> = nodes
            .keys()
            .filter(|path| **path == from || path.starts_with(&format!("{}/", from)))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                nodes.insert(format!("{}{}", to, &old[from.len()..]), node);
            }
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, WireError> {
        self.check_connection()?;
        let nodes = self.nodes.lock().unwrap();
        let real = resolve(&nodes, path, true).ok_or_else(no_such_file)?;
        match nodes.get(&real) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(_) => Err(failure()),
            None => Err(no_such_file()),
        }
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), WireError> {
        self.check_connection()?;
        let mut nodes = self.nodes.lock().unwrap();
        let real = resolve(&nodes, path, true).ok_or_else(no_such_file)?;
        if matches!(nodes.get(&real), Some(Node::Dir { .. })) {
            return Err(failure());
        }
        if !matches!(nodes.get(&get_parent_path(&real)), Some(Node::Dir { .. })) {
            return Err(no_such_file());
        }
        nodes.insert(
            real,
            Node::File {
                content: data.to_vec(),
                mtime: 0,
            },
        );
        Ok(())
    }
}

// ======================== FakeShell ========================

/// 脚本化的 shell 通道：测试通过 `emit` 产生输出，通过 `exit` 模拟远端退出
pub struct FakeShell {
    capabilities: ChannelCapabilities,
    output_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    output_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    input: Mutex<Vec<u8>>,
    resizes: Mutex<Vec<(u32, u32)>>,
    closed: AtomicBool,
}

impl FakeShell {
    pub fn new(resize: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            capabilities: ChannelCapabilities { resize },
            output_tx: Mutex::new(Some(tx)),
            output_rx: tokio::sync::Mutex::new(rx),
            input: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn emit(&self, data: &[u8]) {
        if let Some(tx) = self.output_tx.lock().unwrap().as_ref() {
            let _ = tx.send(data.to_vec());
        }
    }

    /// 远端结束 shell
    pub fn exit(&self) {
        self.output_tx.lock().unwrap().take();
    }

    pub fn input(&self) -> Vec<u8> {
        self.input.lock().unwrap().clone()
    }

    pub fn resizes(&self) -> Vec<(u32, u32)> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShellChannel for FakeShell {
    fn capabilities(&self) -> ChannelCapabilities {
        self.capabilities
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, SshError> {
        Ok(self.output_rx.lock().await.recv().await)
    }

    async fn write(&self, data: &[u8]) -> Result<(), SshError> {
        self.input.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SshError> {
        self.resizes.lock().unwrap().push((cols, rows));
        Ok(())
    }

    async fn close(&self) -> Result<(), SshError> {
        self.closed.store(true, Ordering::SeqCst);
        self.exit();
        Ok(())
    }
}

// ======================== FakeTransport ========================

pub struct FakeTransport {
    id: String,
    fs: Arc<MemoryFs>,
    closed: watch::Sender<bool>,
    was_closed: AtomicBool,
    sftp_opens: AtomicUsize,
    shell_resize: AtomicBool,
    shell_delay: Mutex<Option<Duration>>,
    shell_error: Mutex<Option<String>>,
    shells: Mutex<Vec<(PtyRequest, Arc<FakeShell>)>>,
}

impl FakeTransport {
    pub fn new(id: &str, fs: Arc<MemoryFs>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: id.to_string(),
            fs,
            closed,
            was_closed: AtomicBool::new(false),
            sftp_opens: AtomicUsize::new(0),
            shell_resize: AtomicBool::new(true),
            shell_delay: Mutex::new(None),
            shell_error: Mutex::new(None),
            shells: Mutex::new(Vec::new()),
        }
    }

    /// 是否被主动关闭
    pub fn was_closed(&self) -> bool {
        self.was_closed.load(Ordering::SeqCst)
    }

    /// 模拟对端断开
    pub fn drop_connection(&self) {
        self.closed.send_replace(true);
    }

    pub fn sftp_opens(&self) -> usize {
        self.sftp_opens.load(Ordering::SeqCst)
    }

    /// 之后打开的 shell 是否支持 resize
    pub fn set_shell_resize(&self, resize: bool) {
        self.shell_resize.store(resize, Ordering::SeqCst);
    }

    pub fn set_shell_delay(&self, delay: Duration) {
        *self.shell_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_shell_with(&self, message: &str) {
        *self.shell_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn shells(&self) -> Vec<Arc<FakeShell>> {
        self.shells
            .lock()
            .unwrap()
            .iter()
            .map(|(_, shell)| shell.clone())
            .collect()
    }

    pub fn pty_requests(&self) -> Vec<PtyRequest> {
        self.shells
            .lock()
            .unwrap()
            .iter()
            .map(|(pty, _)| pty.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_alive(&self) -> bool {
        !*self.closed.borrow()
    }

    fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    async fn open_sftp(&self) -> Result<Arc<dyn SftpBackend>, SshError> {
        if !self.is_alive() {
            return Err(SshError::Transport(format!("{} is closed", self.id)));
        }
        self.sftp_opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.fs.clone())
    }

    async fn open_shell(&self, pty: PtyRequest) -> Result<Arc<dyn ShellChannel>, SshError> {
        let delay = *self.shell_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.shell_error.lock().unwrap().clone() {
            return Err(SshError::Channel(message));
        }
        let shell = Arc::new(FakeShell::new(self.shell_resize.load(Ordering::SeqCst)));
        self.shells.lock().unwrap().push((pty, shell.clone()));
        Ok(shell)
    }

    async fn close(&self) -> Result<(), SshError> {
        self.was_closed.store(true, Ordering::SeqCst);
        self.closed.send_replace(true);
        Ok(())
    }
}

// ======================== FakeConnector ========================

pub struct FakeConnector {
    fs: Arc<MemoryFs>,
    delay: Option<Duration>,
    connects: AtomicUsize,
    fail_next: AtomicBool,
    transports: Mutex<HashMap<String, Arc<FakeTransport>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::with_fs(Arc::new(MemoryFs::new()))
    }

    /// 所有连接共享同一个内存文件系统
    pub fn with_fs(fs: Arc<MemoryFs>) -> Self {
        Self {
            fs,
            delay: None,
            connects: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            transports: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fail_next_with_auth_error(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// 某个连接键最近一次建立的传输
    pub fn transport(&self, key: &str) -> Option<Arc<FakeTransport>> {
        self.transports.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, config: &SshConfig) -> Result<Arc<dyn Transport>, SshError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SshError::Auth("Password authentication failed".to_string()));
        }

        let key = config.identity().key();
        let transport = Arc::new(FakeTransport::new(&key, self.fs.clone()));
        self.transports
            .lock()
            .unwrap()
            .insert(key, transport.clone());
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_parent_path() {
        assert_eq!(get_parent_path("/"), "/");
        assert_eq!(get_parent_path("/home"), "/");
        assert_eq!(get_parent_path("/home/user"), "/home");
        assert_eq!(get_parent_path("/home/user/"), "/home");
    }

    #[test]
    fn test_resolve_follows_intermediate_links_only_when_asked() {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir { mtime: 0 });
        nodes.insert("/data".to_string(), Node::Dir { mtime: 0 });
        nodes.insert(
            "/link".to_string(),
            Node::Symlink {
                target: Some("/data".to_string()),
            },
        );

        assert_eq!(resolve(&nodes, "/link", false).as_deref(), Some("/link"));
        assert_eq!(resolve(&nodes, "/link", true).as_deref(), Some("/data"));
        assert_eq!(resolve(&nodes, "/link/a.txt", false).as_deref(), Some("/data/a.txt"));
    }
}
