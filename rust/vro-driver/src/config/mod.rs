//! Driver configuration.
//!
//! Loaded once at startup from, in increasing precedence:
//! 1. Built-in defaults
//! 2. A config file (`config/vro-driver.{yaml,toml,json}` or an explicit path)
//! 3. Environment variables prefixed `VRO__` (`VRO__URL`,
//!    `VRO__WORKFLOWS__ALLOCATE_MACHINE__ID`, ...)
//! 4. `VRO_PASSWORD`
//!
//! The result is validated with [`ConfigValidator`] and is immutable
//! afterwards; drivers share it behind an `Arc`.
//!
//! ```rust,ignore
//! use vro_driver::config::DriverConfig;
//!
//! let config = DriverConfig::load(None)?;
//! println!("{}", config.driver_url());
//! ```

pub mod error;
pub mod validator;

pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::workflow::{WorkflowCatalog, WorkflowTemplate};

/// Driver-level configuration, set once per driver instance.
#[derive(Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Orchestrator base URL, e.g. `https://vro.example.com:8281`.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub business_unit: String,
    /// Verify the orchestrator's TLS certificate.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// Upper bound on a single synchronous wait.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// Delay between two execution status queries.
    #[serde(default = "default_wait_interval_secs")]
    pub wait_interval_secs: u64,
    /// Per HTTP request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Workflow templates keyed by operation tag.
    #[serde(default)]
    pub workflows: BTreeMap<String, WorkflowTemplate>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_verify_ssl() -> bool {
    true
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_wait_interval_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            tenant: String::new(),
            business_unit: String::new(),
            verify_ssl: default_verify_ssl(),
            max_wait_secs: default_max_wait_secs(),
            wait_interval_secs: default_wait_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            workflows: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant", &self.tenant)
            .field("business_unit", &self.business_unit)
            .field("verify_ssl", &self.verify_ssl)
            .field("max_wait_secs", &self.max_wait_secs)
            .field("wait_interval_secs", &self.wait_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("workflows", &self.workflows)
            .field("logging", &self.logging)
            .finish()
    }
}

impl DriverConfig {
    /// Load and validate configuration.
    ///
    /// `path` selects an explicit config file, which must then exist.
    /// Use [`Self::load_unchecked`] to skip validation.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = Self::load_unchecked(path)?;

        ConfigValidator::validate(&config)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;

        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked(path: Option<&Path>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("config/vro-driver").required(false),
        };

        let config = config::Config::builder()
            .set_default("verify_ssl", default_verify_ssl())?
            .set_default("max_wait_secs", default_max_wait_secs())?
            .set_default("wait_interval_secs", default_wait_interval_secs())?
            .set_default("request_timeout_secs", default_request_timeout_secs())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("VRO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut driver_config: DriverConfig = config.try_deserialize()?;

        if let Ok(password) = std::env::var("VRO_PASSWORD") {
            driver_config.password = password;
        }

        Ok(driver_config)
    }

    /// Identity of this driver instance, stamped into every reference it creates.
    #[must_use]
    pub fn driver_url(&self) -> String {
        format!(
            "vro:{}/{}/{}",
            self.url.trim_end_matches('/'),
            self.tenant,
            self.business_unit
        )
    }

    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    #[must_use]
    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_interval_secs)
    }

    /// Build the workflow catalog from the configured templates.
    pub fn catalog(&self) -> ConfigResult<WorkflowCatalog> {
        WorkflowCatalog::from_entries(&self.workflows).map_err(|unknown| {
            ConfigurationError::invalid(
                format!("unknown workflow tags: {}", unknown.join(", ")),
                "Remove the unknown entries from the workflows section",
            )
        })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive. `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::workflow::TemplateTag;

    pub(crate) fn valid_config() -> DriverConfig {
        let workflows = TemplateTag::ALL
            .into_iter()
            .map(|tag| {
                (
                    tag.as_str().to_string(),
                    WorkflowTemplate::new(format!("{tag} workflow"), format!("wf-{tag}")),
                )
            })
            .collect();

        DriverConfig {
            url: "https://vro.example.com:8281/".to_string(),
            username: "svc-provision".to_string(),
            password: "secret".to_string(),
            tenant: "acme".to_string(),
            business_unit: "web".to_string(),
            workflows,
            ..DriverConfig::default()
        }
    }

    #[test]
    fn test_driver_url() {
        assert_eq!(
            valid_config().driver_url(),
            "vro:https://vro.example.com:8281/acme/web"
        );
    }

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert!(config.verify_ssl);
        assert_eq!(config.max_wait(), Duration::from_secs(600));
        assert_eq!(config.wait_interval(), Duration::from_secs(15));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", valid_config());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_catalog() {
        let catalog = valid_config().catalog().unwrap();
        assert_eq!(
            catalog.resolve(TemplateTag::GetMachineInfo).unwrap().id,
            "wf-get_machine_info"
        );
        assert!(catalog.missing_required().is_empty());
    }
}
