//! 配置加载 / Configuration loading
//!
//! TOML 文件叠加 `NEXUS_IM_*` 环境变量；所有字段都有默认值，
//! 没有配置文件也能启动。
//! TOML file layered with `NEXUS_IM_*` environment variables; every field
//! has a default so the node starts without a file.

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub ws_port: u16,
    pub timeout_ms: u64,
    pub node_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ws_port: 6000,
            timeout_ms: 60_000,
            node_id: "node-local".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { enabled: false, url: "redis://127.0.0.1:6379".to_string() }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: "data/nexus-im".to_string() }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub bus: BusConfig,
    pub storage: StorageConfig,
}

pub fn load(path: &str) -> Result<AppConfig> {
    let cfg = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::with_prefix("NEXUS_IM").separator("__"))
        .build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load("config/does-not-exist").unwrap();
        assert_eq!(cfg.server.ws_port, 6000);
        assert_eq!(cfg.server.node_id, "node-local");
        assert!(!cfg.bus.enabled);
    }
}
