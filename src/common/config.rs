//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < `PORT` < `WA_BRIDGE_*` environment < CLI
use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
/// Text sent when a caller leaves the message empty.
pub const DEFAULT_MESSAGE_TEXT: &str = "Olá!";
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const ENV_PREFIX: &str = "WA_BRIDGE_";

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "wa-bridge")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("wa-bridge.toml"))
}

/// Caller-throughput ceiling per client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests allowed per client per window
    pub max_requests: u32,
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            max_requests: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    pub default_text: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            default_text: DEFAULT_MESSAGE_TEXT.to_string(),
        }
    }
}

/// How the sidecar driver process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub command: String,
    pub args: Vec<String>,
    /// Where the driver persists authentication material
    pub session_dir: PathBuf,
    pub request_timeout_secs: u64,
}

impl TransportSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            command: "node".to_string(),
            args: vec!["driver.js".to_string()],
            session_dir: PathBuf::from("./session"),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Print each new scan code to the terminal
    pub print_qr: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self { print_qr: true }
    }
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub body_limit_bytes: usize,
    pub rate_limit: RateLimitSettings,
    pub messages: MessageSettings,
    pub transport: TransportSettings,
    pub display: DisplaySettings,
}

impl AppConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.rate_limit.window_ms > 0,
            "Invalid config: rate_limit.window_ms must be > 0"
        );
        ensure!(
            self.rate_limit.max_requests >= 1,
            "Invalid config: rate_limit.max_requests must be >= 1"
        );
        ensure!(
            self.body_limit_bytes > 0,
            "Invalid config: body_limit_bytes must be > 0"
        );
        ensure!(
            !self.transport.command.trim().is_empty(),
            "Invalid config: transport.command must not be empty"
        );
        ensure!(
            self.transport.request_timeout_secs > 0,
            "Invalid config: transport.request_timeout_secs must be > 0"
        );
        ensure!(
            !self.messages.default_text.is_empty(),
            "Invalid config: messages.default_text must not be empty"
        );
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            rate_limit: RateLimitSettings::default(),
            messages: MessageSettings::default(),
            transport: TransportSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Loads config from defaults, `path` (if it exists), and the environment.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::raw().only(&["PORT"]))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("Failed to load configuration")?;

    config.validate()?;

    Ok(config)
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(port) = overrides.port {
        config.port = port;
    }

    config
}
