// 终端注册表 - 创建终端并在宿主终端就绪后完成绑定
//
// 宿主先拿到终端句柄再异步构建自己的终端对象，构建完成后调用 `bind`；
// 在此之前的输出由桥接器缓存。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use tracing::{debug, info};

use super::bridge::{BridgeState, TerminalBridge, TerminalSink};
use crate::constants::terminal::NAME_PREFIX;
use crate::models::settings::TerminalSettings;
use crate::ssh::{SshError, SshManager};

/// 新建终端的句柄
#[derive(Clone)]
pub struct TerminalHandle {
    pub id: String,
    /// 展示名称 `SSH: <host>`
    pub name: String,
    pub bridge: Arc<TerminalBridge>,
}

/// 终端提供者
pub struct TerminalProvider {
    manager: Arc<SshManager>,
    settings: TerminalSettings,
    terminals: RwLock<HashMap<String, Arc<TerminalBridge>>>,
}

impl TerminalProvider {
    pub fn new(manager: Arc<SshManager>, settings: TerminalSettings) -> Self {
        Self {
            manager,
            settings,
            terminals: RwLock::new(HashMap::new()),
        }
    }

    /// 为已连接的主机创建终端（尚未打开 shell）
    pub fn create_terminal(&self, host: &str) -> Result<TerminalHandle, SshError> {
        let transport = self
            .manager
            .get_connection(host)
            .ok_or_else(|| SshError::Unavailable(host.to_string()))?;

        let id = uuid::Uuid::new_v4().to_string();
        let name = format!("{}: {}", NAME_PREFIX, host);
        let bridge = Arc::new(TerminalBridge::new(
            name.clone(),
            transport,
            self.settings.clone(),
        ));

        self.terminals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), bridge.clone());
        info!("[Terminal] Created {} ({})", name, id);

        Ok(TerminalHandle { id, name, bridge })
    }

    /// 宿主终端就绪后绑定输出；终端不存在时返回 false
    pub fn bind(&self, id: &str, sink: TerminalSink) -> bool {
        match self.get(id) {
            Some(bridge) => {
                debug!("[Terminal] Bound sink to {}", id);
                bridge.attach_sink(sink);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<TerminalBridge>> {
        self.terminals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<TerminalBridge>> {
        self.terminals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn terminal_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .terminals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// 移除已关闭的终端，返回移除数量
    pub fn prune_closed(&self) -> usize {
        let mut terminals = self.terminals.write().unwrap_or_else(PoisonError::into_inner);
        let before = terminals.len();
        terminals.retain(|_, bridge| bridge.state() != BridgeState::Closed);
        before - terminals.len()
    }

    /// 关闭并移除所有终端
    pub async fn close_all(&self) {
        let bridges: Vec<Arc<TerminalBridge>> = self
            .terminals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, bridge)| bridge)
            .collect();
        join_all(bridges.iter().map(|bridge| bridge.close())).await;
    }
}
