//! Configuration validation.
//!
//! Every check runs and all failures are reported together, so an operator
//! can fix a broken configuration in one pass.

use url::Url;

use super::DriverConfig;
use super::error::{ConfigResult, ConfigurationError};
use crate::workflow::TemplateTag;

/// Validates a [`DriverConfig`] before a driver is built from it.
#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the whole driver configuration.
    pub fn validate(config: &DriverConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_url(&config.url) {
            errors.push(e);
        }
        errors.extend(Self::validate_identity(config));
        errors.extend(Self::validate_timing(config));
        errors.extend(Self::validate_workflows(config));

        match ConfigurationError::collect(errors) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// The orchestrator URL must parse and use http or https.
    pub fn validate_url(url: &str) -> ConfigResult<()> {
        if url.trim().is_empty() {
            return Err(ConfigurationError::missing_required(
                "url",
                "Connecting to the orchestrator",
                "VRO__URL",
            ));
        }
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
            Ok(parsed) => Err(ConfigurationError::invalid(
                format!("url scheme '{}' is not supported", parsed.scheme()),
                "Use an http:// or https:// orchestrator URL, e.g. https://vro.example.com:8281",
            )),
            Err(e) => Err(ConfigurationError::invalid(
                format!("url '{url}' does not parse: {e}"),
                "Set VRO__URL to the orchestrator base URL, e.g. https://vro.example.com:8281",
            )),
        }
    }

    fn validate_identity(config: &DriverConfig) -> Vec<ConfigurationError> {
        let required = [
            ("username", &config.username, "Authenticating against the orchestrator", "VRO__USERNAME"),
            ("tenant", &config.tenant, "Driver URL and allocation requests", "VRO__TENANT"),
            (
                "business_unit",
                &config.business_unit,
                "Driver URL and allocation requests",
                "VRO__BUSINESS_UNIT",
            ),
        ];

        required
            .into_iter()
            .filter(|(_, value, _, _)| value.trim().is_empty())
            .map(|(setting, _, context, env_var)| {
                ConfigurationError::missing_required(setting, context, env_var)
            })
            .collect()
    }

    fn validate_timing(config: &DriverConfig) -> Vec<ConfigurationError> {
        let mut errors = Vec::new();

        if config.wait_interval_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "wait_interval_secs must be greater than 0",
                "Set VRO__WAIT_INTERVAL_SECS to the poll interval in seconds (default 15)",
            ));
        } else if config.max_wait_secs < config.wait_interval_secs {
            errors.push(ConfigurationError::invalid(
                format!(
                    "max_wait_secs ({}) is shorter than wait_interval_secs ({})",
                    config.max_wait_secs, config.wait_interval_secs
                ),
                "Raise VRO__MAX_WAIT_SECS or lower VRO__WAIT_INTERVAL_SECS",
            ));
        }

        if config.request_timeout_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "request_timeout_secs must be greater than 0",
                "Set VRO__REQUEST_TIMEOUT_SECS to the per-request timeout in seconds (default 60)",
            ));
        }

        errors
    }

    fn validate_workflows(config: &DriverConfig) -> Vec<ConfigurationError> {
        let mut errors = Vec::new();

        for key in config.workflows.keys() {
            if key.parse::<TemplateTag>().is_err() {
                let known: Vec<&str> = TemplateTag::ALL.iter().map(|t| t.as_str()).collect();
                errors.push(ConfigurationError::invalid(
                    format!("unknown workflow tag '{key}'"),
                    format!("Use one of: {}", known.join(", ")),
                ));
            }
        }

        for tag in TemplateTag::REQUIRED {
            let env_prefix = format!("VRO__WORKFLOWS__{}", tag.as_str().to_ascii_uppercase());
            match config.workflows.get(tag.as_str()) {
                None => errors.push(ConfigurationError::missing_required(
                    format!("workflows.{tag}"),
                    format!("Submitting the {tag} workflow"),
                    format!("{env_prefix}__NAME and {env_prefix}__ID"),
                )),
                Some(template) => {
                    if template.name.trim().is_empty() || template.id.trim().is_empty() {
                        errors.push(ConfigurationError::invalid(
                            format!("workflows.{tag} needs both a name and an id"),
                            format!("Set {env_prefix}__NAME and {env_prefix}__ID"),
                        ));
                    }
                }
            }
        }

        errors
    }
}
