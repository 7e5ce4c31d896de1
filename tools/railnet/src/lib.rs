//! Input loading and network helpers for the `railnet` command

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use railnet_routing::{GraphState, NetworkConfig, RailNetwork, Station, TrackSegment};

/// Network file: `{ "tracks": [...], "stations": [...] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInput {
    pub tracks: Vec<TrackSegment>,
    #[serde(default)]
    pub stations: Vec<Station>,
}

impl NetworkInput {
    pub fn parse(json: &str) -> railnet_common::Result<Self> {
        serde_json::from_str(json).map_err(|e| railnet_common::Error::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read network file {}", path.display()))?;
        let input = Self::parse(&json)
            .with_context(|| format!("Failed to parse network file {}", path.display()))?;
        tracing::debug!(
            tracks = input.tracks.len(),
            stations = input.stations.len(),
            "Loaded network file"
        );
        Ok(input)
    }

    pub fn station(&self, id: &str) -> Result<&Station> {
        match self.stations.iter().find(|s| s.id == id) {
            Some(station) => Ok(station),
            None => bail!("Unknown station '{}'", id),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<NetworkConfig> {
    match path {
        Some(path) => NetworkConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(NetworkConfig::default()),
    }
}

/// Build in the background and wait for the final state
pub async fn build_network(
    config: NetworkConfig,
    input: &NetworkInput,
) -> Result<Arc<RailNetwork>> {
    if input.tracks.is_empty() || input.stations.is_empty() {
        bail!("Network file needs at least one track and one station");
    }

    let network = Arc::new(RailNetwork::new(config));
    let Some(handle) = network.try_build(input.tracks.clone(), input.stations.clone()) else {
        bail!("Network build was already started");
    };

    let state = handle.await.context("Build task failed")?;
    if state != GraphState::Built {
        tracing::warn!(
            state = %state,
            "Rail graph is not available, distances fall back to straight lines"
        );
    }
    Ok(network)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairDistance {
    pub from: String,
    pub to: String,
    pub distance: f64,
    pub straight_line: f64,
}

/// Distance for every unordered station pair, in input order
pub fn station_matrix(network: &RailNetwork, stations: &[Station]) -> Vec<PairDistance> {
    let mut rows = Vec::with_capacity(stations.len() * stations.len().saturating_sub(1) / 2);
    for (i, from) in stations.iter().enumerate() {
        for to in &stations[i + 1..] {
            rows.push(PairDistance {
                from: from.id.clone(),
                to: to.id.clone(),
                distance: network.distance_or_fallback(from, to),
                straight_line: from.straight_line_distance(to),
            });
        }
    }
    rows
}
