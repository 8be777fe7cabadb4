// 主机记录来源 - 读写 ssh config 风格的主机列表文件
//
// 只识别 Host / HostName / User / Port / IdentityFile 五个指令，
// 其余指令原样保留在文件中但不参与解析。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::constants::{manual_host, DEFAULT_PORT};
use crate::models::HostRecord;

/// 展开以 `~` 开头的路径
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(path)
}

/// 手动连接占位记录，总是排在列表第一位
pub fn manual_host_record() -> HostRecord {
    HostRecord {
        name: manual_host::NAME.to_string(),
        host: manual_host::HOST.to_string(),
        port: None,
        user: manual_host::USER.to_string(),
        private_key_path: None,
    }
}

/// 读取主机列表
///
/// 文件不存在时返回空列表（不含占位记录）。
pub fn load_hosts(path: &Path) -> Result<Vec<HostRecord>> {
    if !path.exists() {
        debug!("[Config] Host file {} does not exist", path.display());
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Unable to read host file {}", path.display()))?;
    Ok(parse_hosts(&content))
}

/// 正在累积的 Host 块
#[derive(Default)]
struct PendingHost {
    name: String,
    host: Option<String>,
    user: Option<String>,
    port: Option<u16>,
    private_key_path: Option<PathBuf>,
}

impl PendingHost {
    /// 缺少 HostName 或 User 的块被丢弃
    fn finish(self) -> Option<HostRecord> {
        Some(HostRecord {
            name: self.name,
            host: self.host?,
            port: self.port,
            user: self.user?,
            private_key_path: self.private_key_path,
        })
    }
}

/// 解析主机列表文本，并在最前面插入手动连接记录
pub fn parse_hosts(content: &str) -> Vec<HostRecord> {
    let mut hosts = vec![manual_host_record()];
    let mut current: Option<PendingHost> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = split_directive(line) else {
            continue;
        };

        if key.eq_ignore_ascii_case("host") {
            if let Some(record) = current.take().and_then(PendingHost::finish) {
                hosts.push(record);
            }
            current = Some(PendingHost {
                name: value.to_string(),
                ..Default::default()
            });
            continue;
        }

        // Host 行之前的指令不属于任何块
        let Some(host) = current.as_mut() else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "hostname" => host.host = Some(value.to_string()),
            "user" => host.user = Some(value.to_string()),
            "port" => match value.parse() {
                Ok(port) => host.port = Some(port),
                Err(_) => warn!("[Config] Ignoring invalid port '{}' for {}", value, host.name),
            },
            "identityfile" => host.private_key_path = Some(expand_path(value)),
            _ => {}
        }
    }

    if let Some(record) = current.and_then(PendingHost::finish) {
        hosts.push(record);
    }
    hosts
}

/// 拆分 `key value`；key 只能由字母、数字和下划线组成
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(char::is_whitespace)?;
    let value = value.trim();
    if key.is_empty()
        || value.is_empty()
        || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }
    Some((key, value))
}

/// 追加一条 Host 块到文件末尾，必要时创建父目录
pub fn save_host(path: &Path, record: &HostRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Unable to create directory {}", parent.display()))?;
        }
    }

    let mut content = if path.exists() {
        fs::read_to_string(path)
            .with_context(|| format!("Unable to read host file {}", path.display()))?
    } else {
        String::new()
    };
    if path.exists() && !content.ends_with('\n') {
        content.push('\n');
    }

    content.push_str(&format!("\nHost {}\n", record.name));
    content.push_str(&format!("    HostName {}\n", record.host));
    content.push_str(&format!("    User {}\n", record.user));
    if let Some(port) = record.port.filter(|port| *port != DEFAULT_PORT) {
        content.push_str(&format!("    Port {}\n", port));
    }
    if let Some(key) = &record.private_key_path {
        content.push_str(&format!("    IdentityFile {}\n", key.display()));
    }

    fs::write(path, content)
        .with_context(|| format!("Unable to write host file {}", path.display()))?;
    debug!("[Config] Saved host {} to {}", record.name, path.display());
    Ok(())
}
