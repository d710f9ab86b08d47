//! Gateway configuration: an optional TOML file overlaid with environment
//! variables.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::policy::EmissionPolicy;
use crate::publisher::ApiClientOptions;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_CONFIG_PATH: &str = "gateway_config.toml";
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// CIDR ranges or addresses allowed to call `/events`. Empty allows all.
    pub allowed_client_ips: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            allowed_client_ips: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub address: Option<String>,
    pub token: Option<String>,
    pub ignore_cert_warnings: bool,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: None,
            token: None,
            ignore_cert_warnings: false,
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    /// Event-kind patterns to forward. Nothing is forwarded when empty.
    pub emitted_events: EmissionPolicy,
    pub hook_uuid: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write daily-rotated log files here when set.
    pub directory: Option<PathBuf>,
    pub max_files: Option<usize>,
}

impl GatewayConfig {
    /// Reads `path` if it exists, then applies the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.with_env(|name| std::env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path).map_err(|e| {
            GatewayError::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        Ok(toml::from_str(config_str)?)
    }

    /// Overlays values found through `lookup` (normally the process
    /// environment) on top of this configuration.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = lookup("ALLOWED_CLIENT_IPS") {
            self.server.allowed_client_ips = split_list(&v);
        }
        if let Some(v) = lookup("API_ADDRESS") {
            self.api.address = Some(v);
        }
        if let Some(v) = lookup("API_TOKEN") {
            self.api.token = Some(v);
        }
        if let Some(v) = lookup("API_IGNORE_CERT_WARNINGS") {
            self.api.ignore_cert_warnings = parse_bool("API_IGNORE_CERT_WARNINGS", &v)?;
        }
        if let Some(v) = lookup("EMITTED_EVENTS") {
            self.webhook.emitted_events = EmissionPolicy::new(split_list(&v));
        }
        if let Some(v) = lookup("HOOK_UUID") {
            self.webhook.hook_uuid = Some(v);
        }
        if let Some(v) = lookup("WEBHOOK_SECRET") {
            self.webhook.secret = Some(v);
        }
        if let Some(v) = lookup("LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    /// Options for the event bus client. Address and token are required.
    pub fn api_client_options(&self) -> Result<ApiClientOptions> {
        let address = required("API_ADDRESS", self.api.address.as_deref())?;
        let token = required("API_TOKEN", self.api.token.as_deref())?;
        Ok(ApiClientOptions::new(address, token)
            .with_insecure_connections(self.api.ignore_cert_warnings)
            .with_timeout(Duration::from_secs(self.api.timeout_secs)))
    }
}

fn required<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::ConfigError(format!("value not found for {}", name)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Ok(true),
        "0" | "f" | "false" | "no" => Ok(false),
        _ => Err(GatewayError::ConfigError(format!(
            "value {:?} for {} was not parsable as a bool",
            value, name
        ))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
