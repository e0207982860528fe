use anyhow::Result;
use city_registry::{Coordinate, LocationRegistry, RegistryError};
use log::{debug, error, info};

use crate::map_view::{MapSurface, MapView, MarkerRole};
use crate::osrm::{RouteResponse, RouteService};
use crate::Config;

pub const NO_ROUTE_MESSAGE: &str = "Could not find a route between the selected locations";
pub const FETCH_FAILED_MESSAGE: &str = "Error fetching route. Please try again.";

/// Whatever shows things to the user.
pub trait Presenter {
    /// A blocking message
    fn alert(&mut self, message: &str);
    /// Observable state changed; redraw anything that depends on it. Called once at the end of
    /// every request that got past validation.
    fn refresh(&mut self, loading: bool);
}

/// Remembers what should be shown, so the caller can deliver it later.
#[derive(Default, Debug)]
pub struct Notices {
    pub alerts: Vec<String>,
    pub refreshes: Vec<bool>,
}

impl Presenter for Notices {
    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }

    fn refresh(&mut self, loading: bool) {
        self.refreshes.push(loading);
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RouteError {
    #[error("Please select both start and end locations")]
    MissingSelection,
    #[error("Start and end locations must be different")]
    SameLocation,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct Selection {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// A request that got past validation and is waiting on the routing service
#[derive(Debug)]
pub struct PendingRoute {
    seq: u64,
    pub from: Coordinate,
    pub to: Coordinate,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum RouteOutcome {
    Drawn { points: usize },
    NoRoute,
    Failed,
    /// A newer request was started before this one's response arrived
    Superseded,
}

pub struct RouteRequester<'a, S: MapSurface> {
    registry: &'a LocationRegistry,
    map: MapView<S>,
    selection: Selection,
    loading: bool,
    fit_padding: [u32; 2],
    // The sequence number of the most recent request; only its response is drawn
    latest: u64,
}

impl<'a, S: MapSurface> RouteRequester<'a, S> {
    pub fn new(registry: &'a LocationRegistry, map: MapView<S>, config: &Config) -> Self {
        Self {
            registry,
            map,
            selection: Selection::default(),
            loading: false,
            fit_padding: config.fit_padding,
            latest: 0,
        }
    }

    pub fn registry(&self) -> &LocationRegistry {
        self.registry
    }

    pub fn map(&self) -> &MapView<S> {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapView<S> {
        &mut self.map
    }

    pub fn set_fit_padding(&mut self, padding: [u32; 2]) {
        self.fit_padding = padding;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn select_start(&mut self, name: Option<String>) {
        self.selection.start = name;
    }

    pub fn select_end(&mut self, name: Option<String>) {
        self.selection.end = name;
    }

    /// Validates, resets the overlays, and places both markers. The caller should then ask the
    /// routing service and pass the result to `finish`.
    pub fn begin<P: Presenter>(
        &mut self,
        start: &str,
        end: &str,
        presenter: &mut P,
    ) -> Result<PendingRoute, RouteError> {
        if start.is_empty() || end.is_empty() {
            return Err(reject(RouteError::MissingSelection, presenter));
        }
        if start == end {
            return Err(reject(RouteError::SameLocation, presenter));
        }

        self.map.clear_overlays();

        let from = self.registry.coordinates_of(start)?;
        let to = self.registry.coordinates_of(end)?;

        self.map
            .place_marker(from, MarkerRole::Start, format!("Start: {start}"));
        self.map
            .place_marker(to, MarkerRole::End, format!("End: {end}"));

        self.latest += 1;
        self.loading = true;
        info!("Finding a route from {start} to {end}");
        Ok(PendingRoute {
            seq: self.latest,
            from,
            to,
        })
    }

    pub fn finish<P: Presenter>(
        &mut self,
        pending: PendingRoute,
        result: Result<RouteResponse>,
        presenter: &mut P,
    ) -> RouteOutcome {
        let outcome = if pending.seq != self.latest {
            debug!(
                "Ignoring the response to request {}, {} is newer",
                pending.seq, self.latest
            );
            RouteOutcome::Superseded
        } else {
            match result {
                Ok(resp) => match resp.first_path() {
                    Some(path) => {
                        let points = path.len();
                        self.map.draw_route(path);
                        self.map
                            .fit_to(&[pending.from, pending.to], self.fit_padding);
                        RouteOutcome::Drawn { points }
                    }
                    None => {
                        debug!(
                            "No route: {} {}",
                            resp.code,
                            resp.message.as_deref().unwrap_or("")
                        );
                        presenter.alert(NO_ROUTE_MESSAGE);
                        RouteOutcome::NoRoute
                    }
                },
                Err(err) => {
                    error!("Error fetching route: {err:#}");
                    presenter.alert(FETCH_FAILED_MESSAGE);
                    RouteOutcome::Failed
                }
            }
        };

        // A newer request is still in flight
        if outcome != RouteOutcome::Superseded {
            self.loading = false;
        }
        presenter.refresh(self.loading);
        outcome
    }

    pub async fn find_route<R: RouteService, P: Presenter>(
        &mut self,
        service: &R,
        start: &str,
        end: &str,
        presenter: &mut P,
    ) -> Result<RouteOutcome, RouteError> {
        let pending = self.begin(start, end, presenter)?;
        let result = service.route(pending.from, pending.to).await;
        Ok(self.finish(pending, result, presenter))
    }

    /// Like `find_route`, using whatever's currently selected
    pub async fn find_selected_route<R: RouteService, P: Presenter>(
        &mut self,
        service: &R,
        presenter: &mut P,
    ) -> Result<RouteOutcome, RouteError> {
        let Selection { start, end } = self.selection.clone();
        self.find_route(
            service,
            start.as_deref().unwrap_or(""),
            end.as_deref().unwrap_or(""),
            presenter,
        )
        .await
    }
}

fn reject<P: Presenter>(err: RouteError, presenter: &mut P) -> RouteError {
    presenter.alert(&err.to_string());
    err
}
