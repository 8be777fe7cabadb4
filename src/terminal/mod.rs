// Terminal 模块 - shell 通道与宿主终端之间的桥接

pub mod bridge;
pub mod registry;

pub use bridge::{BridgeState, TerminalBridge, TerminalDimensions, TerminalEvent, TerminalSink};
pub use registry::{TerminalHandle, TerminalProvider};
