// openssh-remote - 命令行入口
//
// 用法: openssh-remote [主机名 [远程路径]]
// 不带参数时列出主机记录；带主机名时连接该主机并列出目录。

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use openssh_remote::models::HostRecord;
use openssh_remote::services::sftp::{RemoteFileSystem, RemoteUri};
use openssh_remote::services::{ssh_config, storage};
use openssh_remote::ssh::{Credential, SshClient, SshConfig, SshManager};

/// 密码从环境变量读取，避免出现在命令行历史里
const PASSWORD_ENV: &str = "OPENSSH_REMOTE_PASSWORD";

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug cargo run
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false) // 不显示 target（模块路径）
        .init();

    let settings = storage::load_settings().unwrap_or_else(|e| {
        warn!("[Config] Failed to load settings, using defaults: {:#}", e);
        Default::default()
    });
    let hosts_file = storage::ssh_config_path(&settings);
    let hosts = ssh_config::load_hosts(&hosts_file)?;

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        print_hosts(&hosts);
        return Ok(());
    };
    let path = args.next().unwrap_or_else(|| "/".to_string());

    let record = hosts
        .iter()
        .find(|host| host.name == name)
        .with_context(|| format!("No host named '{}' in {}", name, hosts_file.display()))?;

    let credential = match std::env::var(PASSWORD_ENV) {
        Ok(password) => Credential::password(password),
        Err(_) => Credential::default(),
    };
    let config = SshConfig::from_host(record, credential, &settings.connection);

    let manager = Arc::new(SshManager::new(Arc::new(SshClient::new())));
    let result = list_directory(&manager, config, record, &path).await;

    manager.disconnect_all().await;
    result
}

fn print_hosts(hosts: &[HostRecord]) {
    if hosts.is_empty() {
        println!("No hosts configured");
        return;
    }
    for host in hosts {
        println!("{:<24} {}", host.name, host.description());
    }
}

async fn list_directory(
    manager: &Arc<SshManager>,
    config: SshConfig,
    record: &HostRecord,
    path: &str,
) -> Result<()> {
    if let Err(e) = manager.connect(config).await {
        eprint!("{}", manager.log().render());
        bail!("Failed to connect to {}: {}", record.description(), e);
    }
    info!("Connected to {}", record.description());

    let fs = RemoteFileSystem::new(manager.clone());
    let uri = RemoteUri::new(record.host.clone(), path);
    let mut entries = fs
        .read_directory(&uri)
        .await
        .with_context(|| format!("Failed to list {}", uri))?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, file_type) in entries {
        println!("{:<10} {}", format!("{:?}", file_type), name);
    }
    Ok(())
}
