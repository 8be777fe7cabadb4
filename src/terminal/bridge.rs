// 终端桥接器 - 连接 shell channel 和宿主终端
// 负责打开 PTY、转发输入输出、尺寸同步以及关闭通知

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::constants::terminal::OPEN_FAILURE_EXIT_CODE;
use crate::models::settings::TerminalSettings;
use crate::ssh::session::PtyRequest;
use crate::ssh::transport::{ShellChannel, Transport};
use crate::ssh::SharedTransport;

/// 桥接器状态 `Unopened -> Opening -> Open -> Closed`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Unopened,
    Opening,
    Open,
    Closed,
}

/// 终端尺寸
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminalDimensions {
    pub cols: u32,
    pub rows: u32,
}

impl TerminalDimensions {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }
}

/// 发给宿主终端的事件
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalEvent {
    /// 原样转发的输出字节
    Output(Vec<u8>),
    /// 通道已关闭，附带可选的退出码；总是最后一个事件
    Closed(Option<u32>),
}

/// 宿主终端的事件接收端
pub type TerminalSink = mpsc::UnboundedSender<TerminalEvent>;

struct BridgeInner {
    state: BridgeState,
    dimensions: Option<TerminalDimensions>,
    channel: Option<Arc<dyn ShellChannel>>,
    /// Opening 期间收到 close 请求
    close_requested: bool,
    sink: Option<TerminalSink>,
    /// 绑定前缓存的输出
    pending: VecDeque<Vec<u8>>,
    pending_bytes: usize,
    pending_close: Option<Option<u32>>,
    max_pending_bytes: usize,
    overflow_warned: bool,
}

/// 终端桥接器
///
/// 一个桥接器在整个生命周期内只绑定一个 shell 通道，关闭后不会重新打开。
pub struct TerminalBridge {
    name: String,
    transport: SharedTransport,
    settings: TerminalSettings,
    inner: Arc<Mutex<BridgeInner>>,
    /// 串行化尺寸下发，保证远端最终收到的是最后一次设置的尺寸
    resize_lock: tokio::sync::Mutex<()>,
}

impl TerminalBridge {
    pub fn new(name: impl Into<String>, transport: SharedTransport, settings: TerminalSettings) -> Self {
        Self {
            name: name.into(),
            transport,
            inner: Arc::new(Mutex::new(BridgeInner {
                state: BridgeState::Unopened,
                dimensions: None,
                channel: None,
                close_requested: false,
                sink: None,
                pending: VecDeque::new(),
                pending_bytes: 0,
                pending_close: None,
                max_pending_bytes: settings.max_pending_output_bytes,
                overflow_warned: false,
            })),
            resize_lock: tokio::sync::Mutex::new(()),
            settings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BridgeInner> {
        lock_inner(&self.inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BridgeState {
        self.lock().state
    }

    /// 当前尺寸（未设置时为 None）
    pub fn dimensions(&self) -> Option<TerminalDimensions> {
        self.lock().dimensions
    }

    /// 打开 shell 通道
    ///
    /// 未指定尺寸时依次使用之前 `set_dimensions` 的值和默认值。
    /// 失败时把错误文本写入输出并直接进入 Closed。
    pub async fn open(&self, initial: Option<TerminalDimensions>) {
        let dims = {
            let mut inner = self.lock();
            if inner.state != BridgeState::Unopened {
                debug!("[Terminal] {} already {:?}, ignoring open", self.name, inner.state);
                return;
            }
            let dims = initial.or(inner.dimensions).unwrap_or(TerminalDimensions {
                cols: self.settings.default_cols,
                rows: self.settings.default_rows,
            });
            inner.dimensions = Some(dims);
            inner.state = BridgeState::Opening;
            dims
        };

        let pty = PtyRequest {
            term: self.settings.term.clone(),
            col_width: dims.cols,
            row_height: dims.rows,
            ..Default::default()
        };
        info!(
            "[Terminal] Opening {} ({}x{}) on {}",
            self.name,
            dims.cols,
            dims.rows,
            self.transport.id()
        );

        let channel = match self.transport.open_shell(pty).await {
            Ok(channel) => channel,
            Err(e) => {
                error!("[Terminal] Failed to open shell for {}: {}", self.name, e);
                emit(&self.inner, TerminalEvent::Output(format!("Error: {}\r\n", e).into_bytes()));
                finish(&self.inner, Some(OPEN_FAILURE_EXIT_CODE));
                return;
            }
        };

        // 打开期间尺寸可能已变化
        let _resize = self.resize_lock.lock().await;
        let (resize_to, close_now) = {
            let mut inner = self.lock();
            inner.state = BridgeState::Open;
            inner.channel = Some(channel.clone());
            let resize_to = inner
                .dimensions
                .filter(|current| *current != dims && channel.capabilities().resize);
            (resize_to, inner.close_requested)
        };

        spawn_reader(self.name.clone(), channel.clone(), self.inner.clone());

        if let Some(dims) = resize_to {
            debug!("[Terminal] Applying deferred resize {}x{}", dims.cols, dims.rows);
            if let Err(e) = channel.resize(dims.cols, dims.rows).await {
                warn!("[Terminal] Failed to resize {}: {}", self.name, e);
            }
        }
        if close_now {
            self.close_channel(&channel).await;
        }
    }

    /// 写入用户输入；未打开或已关闭时静默忽略
    pub async fn handle_input(&self, data: &[u8]) {
        let channel = {
            let inner = self.lock();
            if inner.state != BridgeState::Open {
                trace!("[Terminal] Dropping {} bytes of input for {}", data.len(), self.name);
                return;
            }
            inner.channel.clone()
        };
        if let Some(channel) = channel {
            if let Err(e) = channel.write(data).await {
                warn!("[Terminal] Failed to write to {}: {}", self.name, e);
            }
        }
    }

    /// 设置终端尺寸
    ///
    /// 打开前只记录，打开后在通道支持时下发 window-change。
    pub async fn set_dimensions(&self, dims: TerminalDimensions) {
        let _resize = self.resize_lock.lock().await;
        let channel = {
            let mut inner = self.lock();
            if inner.state == BridgeState::Closed {
                return;
            }
            inner.dimensions = Some(dims);
            if inner.state != BridgeState::Open {
                return;
            }
            inner.channel.clone()
        };

        let Some(channel) = channel else {
            return;
        };
        if !channel.capabilities().resize {
            trace!("[Terminal] {} does not support resize", self.name);
            return;
        }
        if let Err(e) = channel.resize(dims.cols, dims.rows).await {
            warn!("[Terminal] Failed to resize {}: {}", self.name, e);
        }
    }

    /// 关闭终端
    ///
    /// 已打开的通道走与远端退出相同的关闭路径。
    pub async fn close(&self) {
        let channel = {
            let mut inner = self.lock();
            match inner.state {
                BridgeState::Unopened => None,
                BridgeState::Opening => {
                    inner.close_requested = true;
                    return;
                }
                BridgeState::Open => inner.channel.clone(),
                BridgeState::Closed => return,
            }
        };

        match channel {
            Some(channel) => self.close_channel(&channel).await,
            None => finish(&self.inner, None),
        }
    }

    async fn close_channel(&self, channel: &Arc<dyn ShellChannel>) {
        info!("[Terminal] Closing {}", self.name);
        if let Err(e) = channel.close().await {
            warn!("[Terminal] Failed to close {}: {}", self.name, e);
        }
    }

    /// 绑定宿主终端，先按顺序补发缓存的事件
    pub fn attach_sink(&self, sink: TerminalSink) {
        let mut inner = self.lock();
        let pending = std::mem::take(&mut inner.pending);
        if !pending.is_empty() {
            debug!(
                "[Terminal] Flushing {} buffered bytes to {}",
                inner.pending_bytes, self.name
            );
        }
        inner.pending_bytes = 0;
        for chunk in pending {
            let _ = sink.send(TerminalEvent::Output(chunk));
        }
        if let Some(code) = inner.pending_close.take() {
            let _ = sink.send(TerminalEvent::Closed(code));
        }
        inner.sink = Some(sink);
    }
}

fn lock_inner(inner: &Mutex<BridgeInner>) -> MutexGuard<'_, BridgeInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 发送事件；尚未绑定时缓存，缓存超限时丢弃最旧的输出
fn emit_locked(inner: &mut BridgeInner, event: TerminalEvent) {
    let limit = inner.max_pending_bytes;
    if let Some(sink) = &inner.sink {
        if sink.send(event).is_err() {
            trace!("[Terminal] Sink detached, dropping event");
        }
        return;
    }

    match event {
        TerminalEvent::Output(data) => {
            inner.pending_bytes += data.len();
            inner.pending.push_back(data);
            while inner.pending_bytes > limit {
                warn_overflow(inner, limit);
                let excess = inner.pending_bytes - limit;
                let last = inner.pending.len() == 1;
                let Some(front) = inner.pending.front_mut() else {
                    break;
                };
                if last && front.len() > excess {
                    // 仅剩的一块仍超出上限时只保留其末尾
                    front.drain(..excess);
                    inner.pending_bytes -= excess;
                } else {
                    inner.pending_bytes -= front.len();
                    inner.pending.pop_front();
                }
            }
        }
        TerminalEvent::Closed(code) => inner.pending_close = Some(code),
    }
}

fn warn_overflow(inner: &mut BridgeInner, limit: usize) {
    if !inner.overflow_warned {
        warn!(
            "[Terminal] Output buffer exceeded {} bytes before a terminal was attached, dropping oldest output",
            limit
        );
        inner.overflow_warned = true;
    }
}

fn emit(inner: &Mutex<BridgeInner>, event: TerminalEvent) {
    emit_locked(&mut lock_inner(inner), event);
}

/// 进入 Closed 并发出关闭事件（只发一次）
fn finish(inner: &Mutex<BridgeInner>, code: Option<u32>) {
    let mut guard = lock_inner(inner);
    if guard.state == BridgeState::Closed {
        return;
    }
    guard.state = BridgeState::Closed;
    guard.channel = None;
    emit_locked(&mut guard, TerminalEvent::Closed(code));
}

/// 启动 PTY 读取循环，直到通道关闭
fn spawn_reader(name: String, channel: Arc<dyn ShellChannel>, inner: Arc<Mutex<BridgeInner>>) {
    tokio::spawn(async move {
        debug!("[PTY Reader] Started for {}", name);
        loop {
            match channel.read().await {
                Ok(Some(data)) if !data.is_empty() => {
                    trace!("[PTY Reader] Received {} bytes", data.len());
                    emit(&inner, TerminalEvent::Output(data));
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("[PTY Reader] Channel closed");
                    break;
                }
                Err(e) => {
                    error!("[PTY Reader] Error: {}", e);
                    break;
                }
            }
        }
        finish(&inner, None);
        debug!("[PTY Reader] Stopped for {}", name);
    });
}
