// 全局常量

/// SSH 默认端口
pub const DEFAULT_PORT: u16 = 22;

/// 默认连接超时（毫秒）
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// 默认心跳间隔（毫秒）
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 10_000;

/// 默认容忍的心跳丢失次数
pub const DEFAULT_KEEPALIVE_MAX: u32 = 3;

/// 远程资源地址的 scheme
pub const URI_SCHEME: &str = "openssh";

/// 默认的主机记录文件
pub const DEFAULT_SSH_CONFIG_FILE: &str = "~/.ssh/config";

/// 手动连接占位记录
pub mod manual_host {
    pub const NAME: &str = "Manual Connection";
    pub const HOST: &str = "Enter hostname";
    pub const USER: &str = "Enter username";
}

/// 终端相关默认值
pub mod terminal {
    pub const TERM: &str = "xterm-256color";
    pub const DEFAULT_COLS: u32 = 80;
    pub const DEFAULT_ROWS: u32 = 24;
    /// 终端名称前缀（"SSH: <host>"）
    pub const NAME_PREFIX: &str = "SSH";
    /// 终端尚未绑定时缓存输出的上限
    pub const MAX_PENDING_OUTPUT_BYTES: usize = 1024 * 1024;
    /// 打开 shell 失败时的退出码
    pub const OPEN_FAILURE_EXIT_CODE: u32 = 1;
}
