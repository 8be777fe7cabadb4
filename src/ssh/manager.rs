// SSH 连接管理器
//
// 以规范化主机标识（user@host:port）为键管理所有存活的传输会话：
// 建立、复用、跟踪当前活动连接，并负责断开清理。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::join_all;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use super::config::SshConfig;
use super::error::SshError;
use super::event::{ConnectionLog, LogEntry};
use super::transport::{Connector, Transport};

/// 共享的传输会话
pub type SharedTransport = Arc<dyn Transport>;

#[derive(Default)]
struct RegistryState {
    /// 存活会话映射表 (连接键 -> 会话)
    sessions: HashMap<String, SharedTransport>,
    /// 当前活动连接键，必须指向 sessions 中存在的键
    active: Option<String>,
}

/// 连接注册表
///
/// 由调用方持有并注入管理器，生命周期跟随应用启动与退出。
/// 会话表与活动连接在同一把锁下修改，保证二者始终一致。
#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    log: Arc<ConnectionLog>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn log(&self) -> Arc<ConnectionLog> {
        self.log.clone()
    }

    /// 注册会话并设为活动连接
    fn register(&self, id: &str, transport: SharedTransport) {
        let mut state = self.write();
        state.sessions.insert(id.to_string(), transport);
        state.active = Some(id.to_string());
    }

    /// 复用存活会话并设为活动连接
    fn reuse(&self, id: &str) -> Option<SharedTransport> {
        let mut state = self.write();
        let transport = state.sessions.get(id).filter(|t| t.is_alive())?.clone();
        state.active = Some(id.to_string());
        Some(transport)
    }

    /// 仅当注册的仍是同一个会话时才移除
    fn deregister(&self, id: &str, transport: &SharedTransport) -> bool {
        let mut state = self.write();
        let same = state
            .sessions
            .get(id)
            .is_some_and(|current| same_transport(current, transport));
        if same {
            state.sessions.remove(id);
            if state.active.as_deref() == Some(id) {
                state.active = None;
            }
        }
        same
    }

    fn remove(&self, id: &str) -> Option<SharedTransport> {
        let mut state = self.write();
        let removed = state.sessions.remove(id);
        if removed.is_some() && state.active.as_deref() == Some(id) {
            state.active = None;
        }
        removed
    }

    fn drain(&self) -> Vec<(String, SharedTransport)> {
        let mut state = self.write();
        state.active = None;
        state.sessions.drain().collect()
    }

    fn get(&self, id: &str) -> Option<SharedTransport> {
        self.read().sessions.get(id).cloned()
    }

    /// 按子串匹配连接键；多个匹配时返回哪一个不作保证
    fn find(&self, fragment: &str) -> Option<SharedTransport> {
        let state = self.read();
        if let Some(exact) = state.sessions.get(fragment) {
            return Some(exact.clone());
        }
        state
            .sessions
            .iter()
            .find(|(id, _)| id.contains(fragment))
            .map(|(_, transport)| transport.clone())
    }

    fn active(&self) -> Option<String> {
        self.read().active.clone()
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn same_transport(a: &SharedTransport, b: &SharedTransport) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// SSH 管理器
/// 负责连接去重、活动连接跟踪以及断开清理
pub struct SshManager {
    connector: Arc<dyn Connector>,
    registry: Arc<ConnectionRegistry>,
    /// 每个连接键一把异步锁，保证同一主机同时最多一个连接尝试
    connect_locks: ConnectLocks,
}

type ConnectLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// 持有某个连接键的连接锁
struct ConnectSlot<'a> {
    locks: &'a ConnectLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConnectSlot<'_> {
    fn drop(&mut self) {
        // 先释放锁本身，再判断表中是否只剩这一份引用
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

impl SshManager {
    /// 使用全新的注册表创建管理器
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_registry(connector, Arc::new(ConnectionRegistry::new()))
    }

    /// 使用外部注入的注册表创建管理器
    pub fn with_registry(connector: Arc<dyn Connector>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            connector,
            registry,
            connect_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 诊断日志
    pub fn log(&self) -> Arc<ConnectionLog> {
        self.registry.log()
    }

    /// 获取连接键对应的连接锁；返回值释放时若无其他等待者则移除该锁
    async fn lock_connect(&self, id: &str) -> ConnectSlot<'_> {
        let lock = self
            .connect_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        ConnectSlot {
            locks: &self.connect_locks,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn pending_connect_locks(&self) -> usize {
        self.connect_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 连接到主机
    ///
    /// 已有存活会话时直接复用（不产生网络活动）；否则建立新连接。
    /// 失败时原样返回错误且不做任何注册，也不自动重试。
    pub async fn connect(&self, config: SshConfig) -> Result<SharedTransport, SshError> {
        let id = config.identity().key();

        if let Some(existing) = self.registry.reuse(&id) {
            debug!("[SSH Manager] Reusing connection {}", id);
            return Ok(existing);
        }

        let _slot = self.lock_connect(&id).await;

        // 等锁期间可能已有并发请求完成连接
        if let Some(existing) = self.registry.reuse(&id) {
            debug!("[SSH Manager] Reusing connection {}", id);
            return Ok(existing);
        }

        // 已失效但尚未清理的旧会话
        if let Some(stale) = self.registry.get(&id) {
            if self.registry.deregister(&id, &stale) {
                self.registry
                    .log
                    .append(LogEntry::info(format!("Connection closed for {}", id)));
            }
        }

        let log = self.registry.log();
        log.append(LogEntry::info(format!("Connecting to {}...", id)));

        match self.connector.connect(&config).await {
            Ok(transport) => {
                self.registry.register(&id, transport.clone());
                log.append(LogEntry::info(format!("Connected to {}", id)));
                self.watch_close(id, transport.clone());
                Ok(transport)
            }
            Err(e) => {
                log.append(LogEntry::error(format!(
                    "Connection error for {}: {}",
                    id, e
                )));
                Err(e)
            }
        }
    }

    /// 监听传输关闭，被动断开与主动断开都走同一条注销路径
    fn watch_close(&self, id: String, transport: SharedTransport) {
        let registry = self.registry.clone();
        let mut closed = transport.subscribe_closed();
        tokio::spawn(async move {
            // 发送端被释放同样视为关闭
            let _ = closed.wait_for(|closed| *closed).await;
            if registry.deregister(&id, &transport) {
                registry
                    .log
                    .append(LogEntry::warn(format!("Connection closed for {}", id)));
            }
        });
    }

    /// 按连接键片段查找会话（支持仅用主机名寻址）
    pub fn get_connection(&self, fragment: &str) -> Option<SharedTransport> {
        self.registry.find(fragment)
    }

    /// 当前活动连接键
    pub fn get_active(&self) -> Option<String> {
        self.registry.active()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.registry.get(id).is_some()
    }

    /// 所有存活连接键（已排序）
    pub fn connection_ids(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// 断开指定连接；连接不存在时什么也不做
    pub async fn disconnect(&self, id: &str) {
        let Some(transport) = self.registry.remove(id) else {
            return;
        };
        self.registry
            .log
            .append(LogEntry::info(format!("Disconnected from {}", id)));
        if let Err(e) = transport.close().await {
            warn!("[SSH Manager] Failed to close session {}: {}", id, e);
        }
    }

    /// 断开当前活动连接，返回其连接键
    pub async fn disconnect_active(&self) -> Option<String> {
        let id = self.get_active()?;
        self.disconnect(&id).await;
        Some(id)
    }

    /// 断开所有连接并清空状态（退出时调用）
    pub async fn disconnect_all(&self) {
        let sessions = self.registry.drain();
        if sessions.is_empty() {
            return;
        }

        let log = self.registry.log();
        let closes = sessions.into_iter().map(|(id, transport)| {
            let log = log.clone();
            async move {
                log.append(LogEntry::info(format!("Disconnected from {}", id)));
                if let Err(e) = transport.close().await {
                    warn!("[SSH Manager] Failed to close session {}: {}", id, e);
                }
            }
        });
        join_all(closes).await;
    }
}
