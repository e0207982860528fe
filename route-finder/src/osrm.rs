use anyhow::{Context, Result};
use city_registry::Coordinate;
use geo::LineString;
use geojson::de::deserialize_geometry;
use log::debug;
use serde::Deserialize;

use crate::Config;

/// Something that can find a driving route between two points.
#[allow(async_fn_in_trait)]
pub trait RouteService {
    /// A single attempt. An error means the service couldn't be reached or didn't answer with
    /// something parseable; a well-formed "no route" answer is still `Ok`.
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteResponse>;
}

/// The parts of an OSRM `route` response that matter here
#[derive(Deserialize, Debug)]
pub struct RouteResponse {
    pub code: String,
    pub message: Option<String>,
    pub routes: Option<Vec<RouteCandidate>>,
}

#[derive(Deserialize, Debug)]
pub struct RouteCandidate {
    /// OSRM uses (longitude, latitude) order, same as geo
    #[serde(deserialize_with = "deserialize_geometry")]
    pub geometry: LineString,
    /// Meters
    #[serde(default)]
    pub distance: f64,
    /// Seconds
    #[serde(default)]
    pub duration: f64,
}

impl RouteResponse {
    pub fn is_ok(&self) -> bool {
        self.code == "Ok"
    }

    pub fn first_candidate(&self) -> Option<&RouteCandidate> {
        if !self.is_ok() {
            return None;
        }
        self.routes.as_ref()?.first()
    }

    /// The first candidate's path, in (latitude, longitude) order
    pub fn first_path(&self) -> Option<Vec<Coordinate>> {
        let route = self.first_candidate()?;
        Some(
            route
                .geometry
                .coords()
                .map(|pt| Coordinate {
                    lat: pt.y,
                    lon: pt.x,
                })
                .collect(),
        )
    }
}

/// Talks to an OSRM server over HTTP. No API key, no retries, no timeout.
pub struct OsrmClient {
    client: reqwest::Client,
    base_url: String,
    profile: String,
}

impl OsrmClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.routing_url.trim_end_matches('/').to_string(),
            profile: config.profile.clone(),
        }
    }

    pub fn route_url(&self, from: Coordinate, to: Coordinate) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, self.profile, from.lon, from.lat, to.lon, to.lat
        )
    }
}

impl RouteService for OsrmClient {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteResponse> {
        let url = self.route_url(from, to);
        debug!("Requesting {url}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?;
        // OSRM describes failures like NoRoute in the body of a 400, so don't bail on the status
        let status = resp.status();
        let body = resp
            .json::<RouteResponse>()
            .await
            .with_context(|| format!("parsing the {status} response from {url}"))?;
        Ok(body)
    }
}
