//! Network configuration
//!
//! Loaded from TOML or built in code. Every field has a default, so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use railnet_common::{Error, Result};

use crate::merge::MERGE_EPSILON;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Maximum per-axis horizontal delta for two endpoints to share a node
    pub merge_epsilon: f64,
    /// Rescale served distances so they stay comparable to straight-line ones
    pub use_distance_balancing: bool,
    /// Add the station-to-node gaps of both stations to graph distances
    pub include_station_offset: bool,
    /// Warm the distance cache for every station pair right after the build
    pub precompute_station_distances: bool,
    /// Derive the scaling factor after the build. Without it the factor stays 1.0.
    pub calibrate: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            merge_epsilon: MERGE_EPSILON,
            use_distance_balancing: true,
            include_station_offset: false,
            precompute_station_distances: true,
            calibrate: true,
        }
    }
}

impl NetworkConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: NetworkConfig =
            toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.merge_epsilon.is_finite() || self.merge_epsilon < 0.0 {
            return Err(Error::Config(format!(
                "merge_epsilon must be a finite, non-negative number (got {})",
                self.merge_epsilon
            )));
        }
        Ok(())
    }
}
