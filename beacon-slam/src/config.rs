//! Configuration for beacon-slam
//!
//! Loads the localizer configuration from a TOML file. Every section is
//! optional; missing sections and keys take their defaults.

use crate::algorithms::frames::ReconcilerConfig;
use crate::engine::EngineConfig;
use crate::error::Result;
use crate::io::ReplayConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level localizer configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Particle filter settings
    pub engine: EngineConfig,
    /// Tracking-frame alignment
    pub reconciler: ReconcilerConfig,
    /// Log replay preprocessing
    pub replay: ReplayConfig,
}

impl LocalizerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: LocalizerConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.reconciler.axis_convention.rotation()?;
        self.replay.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::frames::AxisConvention;
    use crate::error::LocalizeError;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = LocalizerConfig::default();
        assert_eq!(config.engine.num_particles, 200);
        assert_eq!(config.engine.resampling_threshold, 0.5);
        assert_eq!(config.reconciler.axis_convention, AxisConvention::YUpToZUp);
        assert!(!config.reconciler.correct_heading);
        assert_eq!(config.replay.max_range, 30.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = LocalizerConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[engine]"));
        assert!(toml_string.contains("[engine.motion]"));
        assert!(toml_string.contains("[reconciler]"));
        assert!(toml_string.contains("[replay]"));
        assert!(toml_string.contains("num_particles = 200"));
        assert!(toml_string.contains("axis_convention = \"y_up_to_z_up\""));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
[engine]
num_particles = 500
seed = 7

[engine.rssi]
path_loss_exponent = 3.0

[reconciler]
axis_convention = "identity"
correct_heading = true

[replay]
range_bias = 0.4
"#;

        let config: LocalizerConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.engine.num_particles, 500);
        assert_eq!(config.engine.seed, 7);
        assert_eq!(config.engine.rssi.path_loss_exponent, 3.0);
        assert_eq!(config.engine.rssi.reference_rssi, -59.0);
        assert_eq!(config.engine.motion.noise_floor, 0.002);
        assert_eq!(config.reconciler.axis_convention, AxisConvention::Identity);
        assert!(config.reconciler.correct_heading);
        assert_eq!(config.replay.range_bias, 0.4);
        assert_eq!(config.replay.max_range, 30.0);
    }

    #[test]
    fn test_custom_axis_quaternion() {
        let toml_content = r#"
[reconciler.axis_convention.quaternion]
w = 1.0
i = 0.0
j = 0.0
k = 0.0
"#;
        let config: LocalizerConfig = toml::from_str(toml_content).unwrap();
        assert!(matches!(
            config.reconciler.axis_convention,
            AxisConvention::Quaternion { w, .. } if w == 1.0
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacon-slam.toml");

        let mut config = LocalizerConfig::default();
        config.engine.num_particles = 321;
        config.engine.seed = 11;
        config.reconciler.correct_heading = true;
        config.to_file(&path).unwrap();

        let loaded = LocalizerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[engine]\nnum_particles = 0\n").unwrap();
        assert!(matches!(
            LocalizerConfig::from_file(&path),
            Err(LocalizeError::Config(_))
        ));

        fs::write(&path, "[engine\n").unwrap();
        assert!(matches!(
            LocalizerConfig::from_file(&path),
            Err(LocalizeError::Config(_))
        ));
    }
}
