//! Configuration file support for decoplan.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/decoplan/config.toml`.
//! All depths and pressures are in metres of sea water (msw); rates in m/min.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ascent: AscentConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub buhlmann: BuhlmannConfig,

    #[serde(default)]
    pub vpm: VpmConfig,

    #[serde(default)]
    pub gas_use: GasUseConfig,

    #[serde(default)]
    pub logbook: LogbookConfig,
}

/// Ascent, descent and stop layout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AscentConfig {
    #[serde(default = "default_ascent_rate")]
    pub ascent_rate: f64,

    #[serde(default = "default_descent_rate")]
    pub descent_rate: f64,

    #[serde(default = "default_stop_interval")]
    pub stop_interval: f64,

    #[serde(default = "default_min_stop_time")]
    pub min_stop_time: f64,

    /// Skip the 3 m stop and spend that time at 6 m instead
    #[serde(default)]
    pub last_stop_double_interval: bool,

    /// Bubble model only: 1 m stop spacing from 9 m upwards
    #[serde(default)]
    pub shallow_fine_interval: bool,

    /// Level times include the transit from the previous depth
    #[serde(default)]
    pub travel_time_in_duration: bool,
}

impl Default for AscentConfig {
    fn default() -> Self {
        Self {
            ascent_rate: default_ascent_rate(),
            descent_rate: default_descent_rate(),
            stop_interval: default_stop_interval(),
            min_stop_time: default_min_stop_time(),
            last_stop_double_interval: false,
            shallow_fine_interval: false,
            travel_time_in_duration: false,
        }
    }
}

/// Ambient conditions at the surface
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConfig {
    #[serde(default = "default_surface_pressure")]
    pub surface_pressure: f64,

    /// Alveolar water vapour pressure used by the dissolved-gas model
    #[serde(default = "default_water_vapor_pressure")]
    pub water_vapor_pressure: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            surface_pressure: default_surface_pressure(),
            water_vapor_pressure: default_water_vapor_pressure(),
        }
    }
}

/// ZH-L16 coefficient set
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZhlVariant {
    Zhl16b,
    Zhl16c,
}

/// Dissolved-gas model parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BuhlmannConfig {
    #[serde(default = "default_gf_low")]
    pub gf_low: f64,

    #[serde(default = "default_gf_high")]
    pub gf_high: f64,

    #[serde(default = "default_variant")]
    pub variant: ZhlVariant,
}

impl Default for BuhlmannConfig {
    fn default() -> Self {
        Self {
            gf_low: default_gf_low(),
            gf_high: default_gf_high(),
            variant: default_variant(),
        }
    }
}

/// Bubble model parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VpmConfig {
    /// 0 (least) to 4 (most conservative)
    #[serde(default = "default_conservatism")]
    pub conservatism: u8,

    #[serde(default = "default_true")]
    pub critical_volume: bool,

    /// Critical-volume parameter in fsw-min
    #[serde(default = "default_lambda")]
    pub lambda: f64,

    /// N/m
    #[serde(default = "default_surface_tension")]
    pub surface_tension: f64,

    /// N/m
    #[serde(default = "default_skin_compression")]
    pub skin_compression: f64,

    /// Minutes
    #[serde(default = "default_regeneration_time_constant")]
    pub regeneration_time_constant: f64,

    /// Atmospheres
    #[serde(default = "default_gradient_onset_of_impermeability")]
    pub gradient_onset_of_impermeability: f64,

    #[serde(default = "default_other_gases_mmhg")]
    pub other_gases_mmhg: f64,

    /// Upper bound on critical-volume passes per ascent
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for VpmConfig {
    fn default() -> Self {
        Self {
            conservatism: default_conservatism(),
            critical_volume: true,
            lambda: default_lambda(),
            surface_tension: default_surface_tension(),
            skin_compression: default_skin_compression(),
            regeneration_time_constant: default_regeneration_time_constant(),
            gradient_onset_of_impermeability: default_gradient_onset_of_impermeability(),
            other_gases_mmhg: default_other_gases_mmhg(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Respiratory minute volumes in litres/min at surface pressure
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GasUseConfig {
    #[serde(default = "default_rmv_dive")]
    pub rmv_dive: f64,

    #[serde(default = "default_rmv_deco")]
    pub rmv_deco: f64,
}

impl Default for GasUseConfig {
    fn default() -> Self {
        Self {
            rmv_dive: default_rmv_dive(),
            rmv_deco: default_rmv_deco(),
        }
    }
}

/// Logbook storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogbookConfig {
    #[serde(default = "default_logbook_path")]
    pub path: PathBuf,
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            path: default_logbook_path(),
        }
    }
}

/// Immutable settings handed to the planner.
///
/// Taken once from [`Config::settings`]; the planner never reads the
/// configuration file itself.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Settings {
    pub ascent: AscentConfig,
    pub environment: EnvironmentConfig,
    pub buhlmann: BuhlmannConfig,
    pub vpm: VpmConfig,
    pub gas_use: GasUseConfig,
}

// Default value functions
fn default_ascent_rate() -> f64 {
    9.0
}

fn default_descent_rate() -> f64 {
    18.0
}

fn default_stop_interval() -> f64 {
    3.0
}

fn default_min_stop_time() -> f64 {
    1.0
}

fn default_surface_pressure() -> f64 {
    10.0
}

fn default_water_vapor_pressure() -> f64 {
    0.627
}

fn default_gf_low() -> f64 {
    0.30
}

fn default_gf_high() -> f64 {
    0.85
}

fn default_variant() -> ZhlVariant {
    ZhlVariant::Zhl16c
}

fn default_conservatism() -> u8 {
    2
}

fn default_true() -> bool {
    true
}

fn default_lambda() -> f64 {
    7500.0
}

fn default_surface_tension() -> f64 {
    0.0179
}

fn default_skin_compression() -> f64 {
    0.257
}

fn default_regeneration_time_constant() -> f64 {
    20160.0
}

fn default_gradient_onset_of_impermeability() -> f64 {
    8.2
}

fn default_other_gases_mmhg() -> f64 {
    102.0
}

fn default_max_iterations() -> u32 {
    50
}

fn default_rmv_dive() -> f64 {
    20.0
}

fn default_rmv_deco() -> f64 {
    15.0
}

fn default_logbook_path() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("decoplan").join("logbook.jsonl")
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("decoplan").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Snapshot of the values a computation reads when it starts
    pub fn settings(&self) -> Settings {
        Settings {
            ascent: self.ascent.clone(),
            environment: self.environment.clone(),
            buhlmann: self.buhlmann.clone(),
            vpm: self.vpm.clone(),
            gas_use: self.gas_use.clone(),
        }
    }

    /// Reject settings the planner cannot work with
    pub fn validate(&self) -> Result<()> {
        self.settings().validate()
    }
}

impl Settings {
    /// Reject values that would stall or poison a computation
    pub fn validate(&self) -> Result<()> {
        let a = &self.ascent;
        if !(a.ascent_rate > 0.0) {
            return Err(Error::Config(format!(
                "ascent_rate must be positive, got {}",
                a.ascent_rate
            )));
        }
        if !(a.descent_rate > 0.0) {
            return Err(Error::Config(format!(
                "descent_rate must be positive, got {}",
                a.descent_rate
            )));
        }
        if !(a.stop_interval > 0.0) {
            return Err(Error::Config(format!(
                "stop_interval must be positive, got {}",
                a.stop_interval
            )));
        }
        if !(a.min_stop_time > 0.0) {
            return Err(Error::Config(format!(
                "min_stop_time must be positive, got {}",
                a.min_stop_time
            )));
        }

        let env = &self.environment;
        if !(env.surface_pressure > env.water_vapor_pressure) || env.water_vapor_pressure < 0.0 {
            return Err(Error::Config(format!(
                "surface_pressure ({}) must exceed water_vapor_pressure ({})",
                env.surface_pressure, env.water_vapor_pressure
            )));
        }

        let gf = &self.buhlmann;
        if !(gf.gf_low > 0.0 && gf.gf_low <= 1.5) || !(gf.gf_high > 0.0 && gf.gf_high <= 1.5) {
            return Err(Error::Config(format!(
                "gradient factors must be in (0, 1.5], got {}/{}",
                gf.gf_low, gf.gf_high
            )));
        }
        if gf.gf_low > gf.gf_high {
            return Err(Error::Config(format!(
                "gf_low ({}) must not exceed gf_high ({})",
                gf.gf_low, gf.gf_high
            )));
        }

        let vpm = &self.vpm;
        if vpm.conservatism > 4 {
            return Err(Error::Config(format!(
                "vpm conservatism must be 0-4, got {}",
                vpm.conservatism
            )));
        }
        if !(vpm.skin_compression > vpm.surface_tension) || !(vpm.surface_tension > 0.0) {
            return Err(Error::Config(
                "skin_compression must exceed surface_tension and both must be positive".into(),
            ));
        }
        if !(vpm.lambda > 0.0) || !(vpm.regeneration_time_constant > 0.0) {
            return Err(Error::Config(
                "lambda and regeneration_time_constant must be positive".into(),
            ));
        }
        if vpm.max_iterations == 0 {
            return Err(Error::Config("vpm max_iterations must be at least 1".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ascent.ascent_rate, 9.0);
        assert_eq!(config.ascent.stop_interval, 3.0);
        assert_eq!(config.environment.surface_pressure, 10.0);
        assert_eq!(config.buhlmann.variant, ZhlVariant::Zhl16c);
        assert_eq!(config.vpm.conservatism, 2);
        assert!(config.vpm.critical_volume);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[buhlmann]
gf_low = 0.2
variant = "zhl16b"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.buhlmann.gf_low, 0.2);
        assert_eq!(config.buhlmann.gf_high, 0.85); // default
        assert_eq!(config.buhlmann.variant, ZhlVariant::Zhl16b);
        assert_eq!(config.ascent.ascent_rate, 9.0); // default section
    }

    #[test]
    fn test_validate_rejects_inverted_gradient_factors() {
        let mut config = Config::default();
        config.buhlmann.gf_low = 0.9;
        config.buhlmann.gf_high = 0.7;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_rates() {
        let mut config = Config::default();
        config.ascent.ascent_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ascent.min_stop_time = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_validate_without_config() {
        assert!(Settings::default().validate().is_ok());

        let mut settings = Settings::default();
        settings.ascent.stop_interval = 0.0;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        let mut settings = Settings::default();
        settings.ascent.min_stop_time = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_snapshot_is_detached() {
        let mut config = Config::default();
        let settings = config.settings();
        config.buhlmann.gf_low = 0.5;
        assert_eq!(settings.buhlmann.gf_low, 0.30);
        assert_eq!(settings.gas_use.rmv_deco, 15.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.vpm.conservatism = 4;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.vpm.conservatism, 4);
    }
}
