//! Configuration error types with actionable messages.

use std::fmt;

/// Configuration errors, each carrying enough context to fix the problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A value is present but unusable.
    Invalid {
        /// What is wrong.
        message: String,
        /// How to fix it.
        fix_hint: String,
    },
    /// A required setting is missing or empty.
    MissingRequired {
        /// The missing setting name.
        setting: String,
        /// What needs it.
        context: String,
        /// Environment variable that sets it.
        env_var: String,
    },
    /// Multiple errors occurred.
    Multiple(Vec<ConfigurationError>),
}

impl std::error::Error for ConfigurationError {}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { message, fix_hint } => {
                write!(f, "Invalid configuration: {message}\n\nHow to fix: {fix_hint}")
            }
            Self::MissingRequired {
                setting,
                context,
                env_var,
            } => {
                write!(
                    f,
                    "Missing required configuration: {setting}\n\n\
                    Required for: {context}\n\
                    Set via: {env_var}"
                )
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple configuration errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "\n{}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl ConfigurationError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid(message: impl Into<String>, fix_hint: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            fix_hint: fix_hint.into(),
        }
    }

    /// Create a missing required configuration error.
    #[must_use]
    pub fn missing_required(
        setting: impl Into<String>,
        context: impl Into<String>,
        env_var: impl Into<String>,
    ) -> Self {
        Self::MissingRequired {
            setting: setting.into(),
            context: context.into(),
            env_var: env_var.into(),
        }
    }

    /// Collapse a list of errors: `None` when empty, the error itself when
    /// alone, otherwise a `Multiple` wrapper.
    #[must_use]
    pub fn collect(mut errors: Vec<ConfigurationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => Some(Self::Multiple(errors)),
        }
    }

    /// Number of errors (1 for single errors, N for multiple).
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Multiple(errors) => errors.len(),
            _ => 1,
        }
    }

    /// Iterate over the individual errors.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationError> {
        match self {
            Self::Multiple(errors) => errors.iter().collect::<Vec<_>>().into_iter(),
            single => vec![single].into_iter(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_display() {
        let err = ConfigurationError::invalid(
            "wait_interval_secs must be greater than 0",
            "Set VRO__WAIT_INTERVAL_SECS=15",
        );
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("How to fix"));
    }

    #[test]
    fn test_missing_required_display() {
        let err = ConfigurationError::missing_required(
            "tenant",
            "Driver URL and allocation requests",
            "VRO__TENANT",
        );
        let msg = err.to_string();
        assert!(msg.contains("tenant"));
        assert!(msg.contains("VRO__TENANT"));
    }

    #[test]
    fn test_collect() {
        assert!(ConfigurationError::collect(Vec::new()).is_none());

        let single = ConfigurationError::collect(vec![ConfigurationError::invalid("a", "b")]);
        assert_eq!(single.map(|e| e.count()), Some(1));

        let multiple = ConfigurationError::collect(vec![
            ConfigurationError::invalid("a", "b"),
            ConfigurationError::invalid("c", "d"),
        ])
        .unwrap();
        assert_eq!(multiple.count(), 2);
        assert_eq!(multiple.iter().count(), 2);
        assert!(multiple.to_string().contains("Multiple configuration errors"));
    }
}
