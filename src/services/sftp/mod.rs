// 远程文件系统服务
//
// - types: 基础数据类型与远程资源地址
// - backend: SFTP 线路层 (SftpBackend, WireError)
// - provider: 文件系统适配器 (RemoteFileSystem)

pub mod backend;
pub mod provider;
pub mod types;

pub use backend::{SftpBackend, WireAttributes, WireDirEntry, WireError, WireStatus};
pub use provider::RemoteFileSystem;
pub use types::{
    DeleteOptions, FileStat, FileType, RemoteUri, RenameOptions, WatchHandle, WatchOptions,
    WriteOptions,
};
