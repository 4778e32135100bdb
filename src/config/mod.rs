//! Configuration types for the waveform filter.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which neighbour channels the corroboration check scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorroborationScope {
    /// Only the channel that produced the tested point's bottom detection.
    #[default]
    Selected,
    /// Narrow channel first, then wide, each with its own rise counter.
    Both,
}

/// Parameters for one filter pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Consensus search radius in meters
    #[serde(default = "default_search_radius")]
    pub search_radius_m: f64,

    /// Half-width (samples) of the corroboration scan window
    #[serde(default = "default_search_width")]
    pub search_width: usize,

    /// Rising samples a neighbour must show to corroborate a point
    #[serde(default = "default_rise_threshold")]
    pub rise_threshold: usize,

    /// Minimum leading-edge run length on the narrow channel
    #[serde(default = "default_run_required")]
    pub narrow_run_required: i32,

    /// Minimum leading-edge run length on the wide channel
    #[serde(default = "default_run_required")]
    pub wide_run_required: i32,

    /// Minimum leading-edge slope (counts per sample)
    #[serde(default = "default_slope_required")]
    pub slope_required: f32,

    /// Narrow channel amplitude required above the AC zero offset (0 disables)
    #[serde(default)]
    pub narrow_ac_offset_required: i32,

    /// Wide channel amplitude required above the AC zero offset (0 disables)
    #[serde(default)]
    pub wide_ac_offset_required: i32,

    /// Evaluate the trailing slope as well as the leading one
    #[serde(default)]
    pub enable_backslope_check: bool,

    /// Samples searched after the bottom bin for the peak, and after the peak
    /// for the end of the backslope
    #[serde(default = "default_edge_window")]
    pub edge_window: usize,

    #[serde(default)]
    pub corroboration_scope: CorroborationScope,
}

fn default_search_radius() -> f64 {
    5.0
}

fn default_search_width() -> usize {
    8
}

fn default_rise_threshold() -> usize {
    5
}

fn default_run_required() -> i32 {
    6
}

fn default_slope_required() -> f32 {
    0.5
}

fn default_edge_window() -> usize {
    50
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            search_radius_m: default_search_radius(),
            search_width: default_search_width(),
            rise_threshold: default_rise_threshold(),
            narrow_run_required: default_run_required(),
            wide_run_required: default_run_required(),
            slope_required: default_slope_required(),
            narrow_ac_offset_required: 0,
            wide_ac_offset_required: 0,
            enable_backslope_check: false,
            edge_window: default_edge_window(),
            corroboration_scope: CorroborationScope::default(),
        }
    }
}

impl FilterConfig {
    /// Check that every parameter is usable, naming the first bad one.
    pub fn validate(&self) -> Result<(), String> {
        if !self.search_radius_m.is_finite() || self.search_radius_m <= 0.0 {
            return Err(format!(
                "search_radius_m must be a positive number, got {}",
                self.search_radius_m
            ));
        }
        if self.rise_threshold == 0 {
            return Err("rise_threshold must be at least 1".to_string());
        }
        if self.edge_window == 0 {
            return Err("edge_window must be at least 1".to_string());
        }
        if !self.slope_required.is_finite() || self.slope_required < 0.0 {
            return Err(format!(
                "slope_required must be a non-negative number, got {}",
                self.slope_required
            ));
        }
        Ok(())
    }

    /// Side of one search grid cell: twice the search radius.
    #[inline]
    pub fn cell_side_m(&self) -> f64 {
        self.search_radius_m * 2.0
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub filter: FilterConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_config() {
        let config = FilterConfig::default();
        assert_eq!(config.search_radius_m, 5.0);
        assert_eq!(config.edge_window, 50);
        assert_eq!(config.slope_required, 0.5);
        assert!(!config.enable_backslope_check);
        assert_eq!(config.corroboration_scope, CorroborationScope::Selected);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "filter:\n  search_radius_m: 2.5\n  corroboration_scope: both\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.filter.search_radius_m, 2.5);
        assert_eq!(config.filter.cell_side_m(), 5.0);
        assert_eq!(config.filter.corroboration_scope, CorroborationScope::Both);
        assert_eq!(config.filter.search_width, 8);
        assert_eq!(config.filter.narrow_run_required, 6);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let yaml = "filter:\n  search_radus_m: 2.5\n";
        assert!(serde_yaml::from_str::<PipelineConfig>(yaml).is_err());
        assert!(serde_yaml::from_str::<PipelineConfig>("filters: {}\n").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = FilterConfig::default();
        config.search_radius_m = 0.0;
        assert!(config.validate().is_err());

        let mut config = FilterConfig::default();
        config.search_radius_m = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = FilterConfig::default();
        config.rise_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = FilterConfig::default();
        config.slope_required = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("filter.yaml");

        let mut config = PipelineConfig::default();
        config.filter.enable_backslope_check = true;
        config.filter.rise_threshold = 7;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert!(loaded.filter.enable_backslope_check);
        assert_eq!(loaded.filter.rise_threshold, 7);
    }
}
