//! TOML simulation configuration, following a "parse permissive,
//! validate strict, name the field" pattern: serde deserializes
//! whatever the file has, then [`SimConfig::validate`] checks the
//! cross-field invariants the type system can't express.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Solver/dispatcher run parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    pub case_name: String,
    pub number_of_buses: u32,

    /// `dt_sol`: the solver's own integration step, seconds.
    pub simulation_time_step_s: f64,

    /// `dt_fw`: the framework/dispatcher tick, seconds. Must be an
    /// integer multiple of `simulation_time_step_s`.
    pub framework_time_step_s: f64,

    pub hard_time_limit_s: f64,

    #[serde(default = "default_scheduling_mode")]
    pub scheduling_mode: u8,

    #[serde(default = "default_frequency_margin_hz")]
    pub frequency_safety_margin_hz: f64,

    #[serde(default)]
    pub frequency_channel_bus: Option<i64>,

    #[serde(default)]
    pub ignore_cnv_file: bool,

    #[serde(default)]
    pub ignore_snp_file: bool,

    #[serde(default = "default_progress_print_time_s")]
    pub progress_print_time_s: f64,
}

fn default_scheduling_mode() -> u8 {
    2
}

fn default_frequency_margin_hz() -> f64 {
    0.1
}

fn default_progress_print_time_s() -> f64 {
    30.0
}

impl SimConfig {
    pub fn load(path: &std::path::Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: SimConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.number_of_buses == 0 {
            return Err(ConfigError::Invalid("number_of_buses must be > 0".into()));
        }
        if self.simulation_time_step_s <= 0.0 {
            return Err(ConfigError::Invalid(
                "simulation_time_step_s must be > 0".into(),
            ));
        }
        if self.framework_time_step_s <= 0.0 {
            return Err(ConfigError::Invalid(
                "framework_time_step_s must be > 0".into(),
            ));
        }
        let ratio = self.framework_time_step_s / self.simulation_time_step_s;
        if (ratio - ratio.round()).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "framework_time_step_s ({}) must be an integer multiple of simulation_time_step_s ({})",
                self.framework_time_step_s, self.simulation_time_step_s
            )));
        }
        if self.hard_time_limit_s <= 0.0 {
            return Err(ConfigError::Invalid("hard_time_limit_s must be > 0".into()));
        }
        if !(1..=4).contains(&self.scheduling_mode) {
            return Err(ConfigError::Invalid(format!(
                "scheduling_mode must be 1-4, got {}",
                self.scheduling_mode
            )));
        }
        if self.frequency_safety_margin_hz < 0.0 {
            return Err(ConfigError::Invalid(
                "frequency_safety_margin_hz must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> &'static str {
        r#"
            case_name = "IEEE9"
            number_of_buses = 9
            simulation_time_step_s = 0.1
            framework_time_step_s = 1.0
            hard_time_limit_s = 600.0
        "#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: SimConfig = toml::from_str(base_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.scheduling_mode, 2);
        assert!((config.frequency_safety_margin_hz - 0.1).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_integer_step_ratio() {
        let text = r#"
            case_name = "IEEE9"
            number_of_buses = 9
            simulation_time_step_s = 0.1
            framework_time_step_s = 1.05
            hard_time_limit_s = 600.0
        "#;
        let config: SimConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_scheduling_mode() {
        let text = r#"
            case_name = "IEEE9"
            number_of_buses = 9
            simulation_time_step_s = 0.1
            framework_time_step_s = 1.0
            hard_time_limit_s = 600.0
            scheduling_mode = 7
        "#;
        let config: SimConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }
}
