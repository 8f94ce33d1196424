use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: Option<AuthConfig>,
    pub stats: StatsConfig,
    pub agent: AgentConfig,
    pub selection: SelectionPolicy,
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Sampling interval of the stats reporter, in milliseconds
    pub interval_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl StatsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_idle_per_host: usize,
    pub connect_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 16,
            connect_timeout_ms: 10_000,
        }
    }
}

impl AgentConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// How the built-in instance manager picks an instance when the request
/// does not force one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    FirstAvailable,
    RoundRobin,
    StickyDomain,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Extra headers injected into every request relayed through this instance
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Config {
    /// Loads the configuration.
    ///
    /// The YAML file named by `GATEWAY_CONFIG` is read when set; `LISTEN`
    /// overrides the listen address either way.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("GATEWAY_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(content)?;

        for (idx, instance) in cfg.instances.iter().enumerate() {
            if instance.name.is_empty() {
                anyhow::bail!("instance #{idx} has an empty name");
            }
            if cfg.instances[..idx].iter().any(|i| i.name == instance.name) {
                anyhow::bail!("duplicate instance name {}", instance.name);
            }
        }

        Ok(cfg)
    }
}
