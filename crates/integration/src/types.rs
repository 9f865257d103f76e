//! Core types for collaborator calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a module in a batch install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleAction {
    Enable,
    Upgrade,
    Disable,
}

impl ModuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Upgrade => "upgrade",
            Self::Disable => "disable",
        }
    }
}

impl std::fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a batch module request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleChange {
    /// Target module id
    pub id: String,
    /// Module id being replaced, for upgrades
    pub from: Option<String>,
    pub action: ModuleAction,
}

impl ModuleChange {
    pub fn enable(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: None,
            action: ModuleAction::Enable,
        }
    }

    pub fn upgrade(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: to.into(),
            from: Some(from.into()),
            action: ModuleAction::Upgrade,
        }
    }

    pub fn disable(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: None,
            action: ModuleAction::Disable,
        }
    }

    /// Change that undoes this one
    pub fn inverse(&self) -> Self {
        match (&self.action, &self.from) {
            (ModuleAction::Enable, _) => Self::disable(&self.id),
            (ModuleAction::Disable, _) => Self::enable(&self.id),
            (ModuleAction::Upgrade, Some(from)) => Self::upgrade(&self.id, from),
            (ModuleAction::Upgrade, None) => Self::disable(&self.id),
        }
    }
}

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_delay() {
        let config = RetryConfig::new(5, Duration::from_millis(100), 2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_config_max_delay() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(300),
            ..RetryConfig::new(5, Duration::from_millis(100), 2.0)
        };

        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(300));
    }

    #[test]
    fn test_module_change_inverse() {
        assert_eq!(
            ModuleChange::enable("mod-a-1.0.0").inverse(),
            ModuleChange::disable("mod-a-1.0.0")
        );
        assert_eq!(
            ModuleChange::upgrade("mod-a-1.0.0", "mod-a-1.1.0").inverse(),
            ModuleChange::upgrade("mod-a-1.1.0", "mod-a-1.0.0")
        );
    }
}
