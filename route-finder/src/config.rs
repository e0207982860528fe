use city_registry::{Coordinate, SRI_LANKA_CENTER};
use serde::Deserialize;

/// Settings that callers may override. Anything missing from the input keeps its default.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the OSRM-compatible routing service lives, without a trailing slash
    pub routing_url: String,
    pub profile: String,
    /// The id of the element the map is drawn into
    pub container: String,
    pub center: Coordinate,
    pub zoom: u8,
    /// Pixels kept clear around the start and end when zooming to a route
    pub fit_padding: [u32; 2],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routing_url: "https://router.project-osrm.org".to_string(),
            profile: "driving".to_string(),
            container: "map".to_string(),
            center: SRI_LANKA_CENTER,
            zoom: 8,
            fit_padding: [50, 50],
        }
    }
}

impl Config {
    pub fn from_json(input: &str) -> anyhow::Result<Config> {
        Ok(serde_json::from_str(input)?)
    }
}
