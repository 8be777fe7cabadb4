// 服务层

pub mod sftp;
pub mod ssh_config;
pub mod storage;
