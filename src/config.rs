//! Application and scheduler configuration.
//!
//! Values are layered: built-in defaults, then `flashcards.toml` (or the path
//! given on the command line), then `FLASHCARDS_`-prefixed environment
//! variables. Nested keys use a double underscore, e.g.
//! `FLASHCARDS_SCHEDULER__INTERVAL_MODIFIER=1.5`.

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "flashcards.toml";
pub const DEFAULT_DATABASE_PATH: &str = "db.sqlite3";

/// Largest accepted `maximum_interval`, in days (a little under 2,740 years).
pub const MAXIMUM_INTERVAL_LIMIT: f64 = 1_000_000.0;

/// Suggested range for the user-adjustable interval modifier.
pub const SUGGESTED_MODIFIER_RANGE: (f64, f64) = (0.5, 2.0);

/// Tunables for interval computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Multiplier applied on top of the ease for "easy" ratings.
    pub easy_bonus: f64,
    /// Global multiplier for every computed interval except "again" resets.
    pub interval_modifier: f64,
    /// Fraction of the previous interval kept on "hard".
    pub hard_factor: f64,
    /// Interval in days a card resets to when rated "again".
    pub again_interval: f64,
    /// First-review interval for "hard".
    pub hard_interval: f64,
    /// First-review interval for "good"; "easy" scales it by `easy_bonus`.
    pub initial_interval: f64,
    /// Upper bound in days for any computed interval.
    pub maximum_interval: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            easy_bonus: 2.0,
            interval_modifier: 1.0,
            hard_factor: 0.5,
            again_interval: 0.1,
            hard_interval: 0.5,
            initial_interval: 1.0,
            maximum_interval: 36500.0,
        }
    }
}

impl SchedulerConfig {
    /// Rejects values that would produce negative or non-finite intervals.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("easy_bonus", self.easy_bonus),
            ("interval_modifier", self.interval_modifier),
            ("hard_factor", self.hard_factor),
            ("again_interval", self.again_interval),
            ("hard_interval", self.hard_interval),
            ("initial_interval", self.initial_interval),
            ("maximum_interval", self.maximum_interval),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if self.maximum_interval > MAXIMUM_INTERVAL_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "maximum_interval must be at most {MAXIMUM_INTERVAL_LIMIT} days, got {}",
                self.maximum_interval
            )));
        }

        let (low, high) = SUGGESTED_MODIFIER_RANGE;
        if !(low..=high).contains(&self.interval_modifier) {
            warn!(
                interval_modifier = self.interval_modifier,
                "interval modifier outside suggested range {low}..={high}"
            );
        }
        Ok(())
    }
}

/// Top-level configuration for the `flashcards` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// User studying when none is given on the command line.
    pub user_id: i64,
    pub scheduler: SchedulerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            user_id: 1,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_PATH);
        Self::from_figment(
            Figment::from(Serialized::defaults(AppConfig::default()))
                .merge(Toml::file(path))
                .merge(Env::prefixed("FLASHCARDS_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment.extract()?;
        config.scheduler.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = SchedulerConfig::default();
        assert_eq!(config.easy_bonus, 2.0);
        assert_eq!(config.interval_modifier, 1.0);
        assert_eq!(config.hard_factor, 0.5);
        assert_eq!(config.again_interval, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(
            Toml::string(
                r#"
                database_path = "study.db"
                [scheduler]
                easy_bonus = 1.3
                "#,
            ),
        );
        let config = AppConfig::from_figment(figment).unwrap();
        assert_eq!(config.database_path, PathBuf::from("study.db"));
        assert_eq!(config.scheduler.easy_bonus, 1.3);
        assert_eq!(config.scheduler.interval_modifier, 1.0);
        assert_eq!(config.user_id, 1);
    }

    #[test]
    fn non_positive_modifier_is_rejected() {
        let config = SchedulerConfig {
            interval_modifier: 0.0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SchedulerConfig {
            easy_bonus: f64::NAN,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn huge_maximum_interval_is_rejected() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(
            Toml::string(
                r#"
                [scheduler]
                maximum_interval = 1e12
                "#,
            ),
        );
        assert!(matches!(
            AppConfig::from_figment(figment),
            Err(Error::InvalidConfig(_))
        ));

        let config = SchedulerConfig {
            maximum_interval: MAXIMUM_INTERVAL_LIMIT,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_modifier_is_allowed() {
        let config = SchedulerConfig {
            interval_modifier: 3.0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
