// 数据模型模块

pub mod host;
pub mod settings;

pub use host::{HostIdentity, HostRecord};
pub use settings::{AppSettings, ConnectionSettings, TerminalSettings};
