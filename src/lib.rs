// openssh-remote - 通过单条 SSH 连接访问远程文件系统与交互式终端

pub mod constants;
pub mod models;
pub mod services;
pub mod ssh;
pub mod terminal;

#[cfg(test)]
pub(crate) mod test_utils;
