//! Pick a start and end city, then draw the driving route between them on a web map. Routing
//! itself is delegated to an OSRM server; the map is drawn by whatever implements `MapSurface`.

mod config;
pub mod map_view;
pub mod osrm;
pub mod requester;
#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(test)]
mod tests;

pub use city_registry::{Coordinate, LocationRegistry, RegistryError};

pub use config::Config;
pub use map_view::{GeoJsonSurface, MapSurface, MapView, MarkerRole, TileLayer, Viewport};
pub use osrm::{OsrmClient, RouteCandidate, RouteResponse, RouteService};
pub use requester::{
    Notices, PendingRoute, Presenter, RouteError, RouteOutcome, RouteRequester, Selection,
};
#[cfg(target_arch = "wasm32")]
pub use wasm::JsRouteFinder;
