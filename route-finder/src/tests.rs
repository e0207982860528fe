use std::cell::RefCell;
use std::sync::Once;

use anyhow::{bail, Result};
use geo::Coord;
use log::{Level, Log, Metadata, Record};

use crate::requester::{FETCH_FAILED_MESSAGE, NO_ROUTE_MESSAGE};
use crate::*;

const COLOMBO_TO_KANDY: &str = r#"{
    "code": "Ok",
    "routes": [
        {
            "geometry": { "type": "LineString", "coordinates": [[79.86, 6.93], [80.63, 7.29]] },
            "distance": 115604.2,
            "duration": 9023.1,
            "legs": []
        }
    ],
    "waypoints": []
}"#;

const NO_ROUTE: &str = r#"{ "code": "NoRoute", "message": "Impossible route between points" }"#;

const EMPTY_ROUTES: &str = r#"{ "code": "Ok", "routes": [] }"#;

enum Canned {
    Body(&'static str),
    Unreachable,
}

/// Answers every request the same way, remembering what was asked
struct CannedService {
    answer: Canned,
    requests: RefCell<Vec<(Coordinate, Coordinate)>>,
}

impl CannedService {
    fn new(answer: Canned) -> Self {
        Self {
            answer,
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl RouteService for CannedService {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteResponse> {
        self.requests.borrow_mut().push((from, to));
        match self.answer {
            Canned::Body(body) => Ok(serde_json::from_str(body)?),
            Canned::Unreachable => bail!("connection refused"),
        }
    }
}

fn new_requester() -> RouteRequester<'static, GeoJsonSurface> {
    let config = Config::default();
    let map = MapView::initialize(
        GeoJsonSurface::new(config.container.clone()),
        config.center,
        config.zoom,
        TileLayer::default(),
    );
    RouteRequester::new(LocationRegistry::builtin(), map, &config)
}

fn find_route(
    requester: &mut RouteRequester<'static, GeoJsonSurface>,
    service: &CannedService,
    start: &str,
    end: &str,
    notices: &mut Notices,
) -> Result<RouteOutcome, RouteError> {
    pollster::block_on(requester.find_route(service, start, end, notices))
}

// Tests run on their own threads, so each one only sees what it logged itself
thread_local! {
    static LOGGED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct CapturingLogger;

impl Log for CapturingLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        LOGGED.with(|logged| {
            logged
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger;
static INSTALL_LOGGER: Once = Once::new();

/// Starts capturing log records for the current test
fn capture_logs() {
    INSTALL_LOGGER.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    });
    LOGGED.with(|logged| logged.borrow_mut().clear());
}

fn logged_errors() -> Vec<String> {
    LOGGED.with(|logged| {
        logged
            .borrow()
            .iter()
            .filter(|(level, _)| *level == Level::Error)
            .map(|(_, msg)| msg.clone())
            .collect()
    })
}

fn colombo() -> Coordinate {
    LocationRegistry::builtin().coordinates_of("Colombo").unwrap()
}

fn kandy() -> Coordinate {
    LocationRegistry::builtin().coordinates_of("Kandy").unwrap()
}

#[test]
fn test_initialize() {
    let requester = new_requester();
    let surface = requester.map().surface();
    assert_eq!(surface.container(), "map");
    let tiles = surface.tiles().unwrap();
    assert_eq!(tiles.attribution, "© OpenStreetMap contributors");
    assert_eq!(tiles.max_zoom, 19);
    assert_eq!(
        surface.viewport(),
        Some(Viewport::Center {
            center: Coordinate {
                lat: 7.8731,
                lon: 80.7718
            },
            zoom: 8
        })
    );
    assert_eq!(surface.num_layers(), 0);
    assert!(!requester.is_loading());
}

#[test]
fn test_route_drawn_with_flipped_axes() {
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Body(COLOMBO_TO_KANDY));
    let mut notices = Notices::default();

    let outcome = find_route(&mut requester, &service, "Colombo", "Kandy", &mut notices).unwrap();
    assert_eq!(outcome, RouteOutcome::Drawn { points: 2 });

    // The service was asked about the right places
    assert_eq!(*service.requests.borrow(), vec![(colombo(), kandy())]);

    let surface = requester.map().surface();
    let lines: Vec<&map_view::Polyline> = surface.polylines().collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(
        lines[0].points,
        vec![
            Coordinate {
                lat: 6.93,
                lon: 79.86
            },
            Coordinate {
                lat: 7.29,
                lon: 80.63
            }
        ]
    );
    assert_eq!(lines[0].style.color, "#3388ff");

    // Zoomed to the two cities, not the path
    match surface.viewport() {
        Some(Viewport::Fit { bounds, padding }) => {
            assert_eq!(bounds.min(), Coord::from(colombo()));
            assert_eq!(bounds.max(), Coord::from(kandy()));
            assert_eq!(padding, [50, 50]);
        }
        x => panic!("wrong viewport {x:?}"),
    }

    assert!(notices.alerts.is_empty());
    assert_eq!(notices.refreshes, vec![false]);
    assert!(!requester.is_loading());
    assert_eq!(requester.map().overlay_count(), 3);
}

#[test]
fn test_markers() {
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Body(COLOMBO_TO_KANDY));
    find_route(
        &mut requester,
        &service,
        "Colombo",
        "Kandy",
        &mut Notices::default(),
    )
    .unwrap();

    let markers: Vec<&map_view::Marker> = requester.map().surface().markers().collect();
    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0].role, MarkerRole::Start);
    assert_eq!(markers[0].popup, "Start: Colombo");
    assert_eq!(markers[0].at, colombo());
    assert_eq!(markers[1].role, MarkerRole::End);
    assert_eq!(markers[1].popup, "End: Kandy");
    assert_ne!(markers[0].icon.icon_url, markers[1].icon.icon_url);
    assert_eq!(markers[0].icon.icon_size, [25, 41]);
    assert_eq!(markers[1].icon.shadow_size, [41, 41]);

    // Only the start popup is open
    let gj: geojson::GeoJson = requester
        .map()
        .surface()
        .render_geojson()
        .parse()
        .unwrap();
    let geojson::GeoJson::FeatureCollection(fc) = gj else {
        panic!("not a FeatureCollection");
    };
    let open: Vec<bool> = fc
        .features
        .iter()
        .filter(|f| f.property("type").and_then(|x| x.as_str()) != Some("route"))
        .map(|f| f.property("popup_open").unwrap().as_bool().unwrap())
        .collect();
    assert_eq!(open, vec![true, false]);
}

#[test]
fn test_missing_selection_rejected() {
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Body(COLOMBO_TO_KANDY));
    find_route(
        &mut requester,
        &service,
        "Colombo",
        "Kandy",
        &mut Notices::default(),
    )
    .unwrap();
    let before = requester.map().surface().render_geojson();

    for (start, end) in [("", "Kandy"), ("Colombo", "")] {
        capture_logs();
        let mut notices = Notices::default();
        let result = find_route(&mut requester, &service, start, end, &mut notices);
        assert!(matches!(result, Err(RouteError::MissingSelection)));
        assert_eq!(
            notices.alerts,
            vec!["Please select both start and end locations"]
        );
        // Nothing changed, and nobody was told to redraw
        assert!(notices.refreshes.is_empty());
        assert_eq!(requester.map().surface().render_geojson(), before);
        assert!(logged_errors().is_empty());
    }
    assert_eq!(service.requests.borrow().len(), 1);
}

#[test]
fn test_same_location_rejected() {
    capture_logs();
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Body(COLOMBO_TO_KANDY));
    let mut notices = Notices::default();
    let result = find_route(&mut requester, &service, "Colombo", "Colombo", &mut notices);
    assert!(matches!(result, Err(RouteError::SameLocation)));
    assert_eq!(
        notices.alerts,
        vec!["Start and end locations must be different"]
    );
    assert_eq!(requester.map().overlay_count(), 0);
    assert!(service.requests.borrow().is_empty());
    assert!(logged_errors().is_empty());
}

#[test]
fn test_no_route() {
    for body in [NO_ROUTE, EMPTY_ROUTES] {
        capture_logs();
        let mut requester = new_requester();
        let service = CannedService::new(Canned::Body(body));
        let mut notices = Notices::default();

        let outcome =
            find_route(&mut requester, &service, "Jaffna", "Matara", &mut notices).unwrap();
        assert_eq!(outcome, RouteOutcome::NoRoute);
        assert_eq!(notices.alerts, vec![NO_ROUTE_MESSAGE]);
        assert_eq!(notices.refreshes, vec![false]);
        assert!(!requester.is_loading());

        // The markers stay
        assert!(!requester.map().has_route());
        assert_eq!(requester.map().overlay_count(), 2);

        // The service answered, so this isn't an error worth logging
        assert!(logged_errors().is_empty());
    }
}

#[test]
fn test_unreachable_service() {
    capture_logs();
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Unreachable);
    let mut notices = Notices::default();

    let outcome = find_route(&mut requester, &service, "Galle", "Ella", &mut notices).unwrap();
    assert_eq!(outcome, RouteOutcome::Failed);
    assert_eq!(notices.alerts, vec![FETCH_FAILED_MESSAGE]);
    assert_eq!(notices.refreshes, vec![false]);
    assert!(!requester.is_loading());
    assert_eq!(requester.map().overlay_count(), 2);

    let errors = logged_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Error fetching route"));
    assert!(errors[0].contains("connection refused"));
}

#[test]
fn test_malformed_response() {
    capture_logs();
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Body("<html>Bad gateway</html>"));
    let mut notices = Notices::default();

    let outcome = find_route(&mut requester, &service, "Galle", "Ella", &mut notices).unwrap();
    assert_eq!(outcome, RouteOutcome::Failed);
    assert_eq!(notices.alerts, vec![FETCH_FAILED_MESSAGE]);

    let errors = logged_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Error fetching route"));
}

#[test]
fn test_previous_overlays_cleared() {
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Body(COLOMBO_TO_KANDY));
    let mut notices = Notices::default();
    find_route(&mut requester, &service, "Colombo", "Kandy", &mut notices).unwrap();
    assert_eq!(requester.map().surface().num_layers(), 3);

    // Right after the markers are placed, the old route is gone
    let pending = requester.begin("Galle", "Negombo", &mut notices).unwrap();
    assert_eq!(requester.map().overlay_count(), 2);
    assert_eq!(requester.map().surface().num_layers(), 2);
    assert!(requester.is_loading());

    let outcome = requester.finish(
        pending,
        serde_json::from_str(COLOMBO_TO_KANDY).map_err(Into::into),
        &mut notices,
    );
    assert_eq!(outcome, RouteOutcome::Drawn { points: 2 });
    assert_eq!(requester.map().surface().num_layers(), 3);
    let popups: Vec<&str> = requester
        .map()
        .surface()
        .markers()
        .map(|m| m.popup.as_str())
        .collect();
    assert_eq!(popups, vec!["Start: Galle", "End: Negombo"]);
}

#[test]
fn test_stale_response_ignored() {
    let mut requester = new_requester();
    let mut notices = Notices::default();

    let first = requester.begin("Colombo", "Kandy", &mut notices).unwrap();
    let second = requester.begin("Galle", "Matara", &mut notices).unwrap();

    // The first answer arrives late
    let outcome = requester.finish(
        first,
        serde_json::from_str(COLOMBO_TO_KANDY).map_err(Into::into),
        &mut notices,
    );
    assert_eq!(outcome, RouteOutcome::Superseded);
    assert!(!requester.map().has_route());
    assert!(requester.is_loading());
    assert!(notices.alerts.is_empty());
    assert_eq!(notices.refreshes, vec![true]);

    let outcome = requester.finish(
        second,
        serde_json::from_str(NO_ROUTE).map_err(Into::into),
        &mut notices,
    );
    assert_eq!(outcome, RouteOutcome::NoRoute);
    assert!(!requester.is_loading());
    assert_eq!(notices.refreshes, vec![true, false]);
}

#[test]
fn test_clear_overlays_twice() {
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Body(COLOMBO_TO_KANDY));
    find_route(
        &mut requester,
        &service,
        "Colombo",
        "Kandy",
        &mut Notices::default(),
    )
    .unwrap();

    requester.map_mut().clear_overlays();
    assert_eq!(requester.map().overlay_count(), 0);
    assert_eq!(requester.map().surface().num_layers(), 0);
    requester.map_mut().clear_overlays();
    assert_eq!(requester.map().overlay_count(), 0);
    assert_eq!(requester.map().surface().num_layers(), 0);
}

#[test]
fn test_selection() {
    let mut requester = new_requester();
    let service = CannedService::new(Canned::Body(COLOMBO_TO_KANDY));
    let mut notices = Notices::default();

    requester.select_start(Some("Colombo".to_string()));
    let result = pollster::block_on(requester.find_selected_route(&service, &mut notices));
    assert!(matches!(result, Err(RouteError::MissingSelection)));

    requester.select_end(Some("Kandy".to_string()));
    let result = pollster::block_on(requester.find_selected_route(&service, &mut notices));
    assert_eq!(result.unwrap(), RouteOutcome::Drawn { points: 2 });
}

#[test]
fn test_every_pair_leaves_two_markers() {
    let registry = LocationRegistry::builtin();
    let mut requester = new_requester();
    let mut notices = Notices::default();
    for start in registry.names() {
        for end in registry.names() {
            if start == end {
                continue;
            }
            let pending = requester.begin(start, end, &mut notices).unwrap();
            assert_eq!(requester.map().overlay_count(), 2);
            requester.finish(
                pending,
                serde_json::from_str(COLOMBO_TO_KANDY).map_err(Into::into),
                &mut notices,
            );
            assert!(requester.map().surface().num_layers() <= 3);
        }
    }
}

#[test]
fn test_route_url() {
    let client = OsrmClient::new(&Config::default());
    assert_eq!(
        client.route_url(colombo(), kandy()),
        "https://router.project-osrm.org/route/v1/driving/79.8612,6.9271;80.6337,7.2906?overview=full&geometries=geojson"
    );

    let config = Config::from_json(
        r#"{ "routing_url": "http://localhost:5000/", "profile": "foot" }"#,
    )
    .unwrap();
    let client = OsrmClient::new(&config);
    assert_eq!(
        client.route_url(colombo(), kandy()),
        "http://localhost:5000/route/v1/foot/79.8612,6.9271;80.6337,7.2906?overview=full&geometries=geojson"
    );
}

#[test]
fn test_config_defaults() {
    let config = Config::from_json(r#"{ "zoom": 10 }"#).unwrap();
    assert_eq!(config.zoom, 10);
    assert_eq!(config.fit_padding, [50, 50]);
    assert_eq!(config.container, "map");
    assert!(Config::from_json(r#"{ "zoom": "far" }"#).is_err());
    // The map can't start somewhere that doesn't exist
    assert!(Config::from_json(r#"{ "center": { "lat": 500.0, "lon": -900.0 } }"#).is_err());
    let config = Config::from_json(r#"{ "center": { "lat": 6.0535, "lon": 80.2210 } }"#).unwrap();
    assert_eq!(config.center, Coordinate::new(6.0535, 80.2210).unwrap());
}

#[test]
fn test_parse_response() {
    let resp: RouteResponse = serde_json::from_str(COLOMBO_TO_KANDY).unwrap();
    assert!(resp.is_ok());
    let route = resp.first_candidate().unwrap();
    assert_eq!(route.distance, 115604.2);
    assert_eq!(route.geometry.0.len(), 2);

    let resp: RouteResponse = serde_json::from_str(NO_ROUTE).unwrap();
    assert!(!resp.is_ok());
    assert!(resp.first_path().is_none());
    assert_eq!(
        resp.message.as_deref(),
        Some("Impossible route between points")
    );
}

#[test]
fn test_unknown_city() {
    let mut requester = new_requester();
    let mut notices = Notices::default();
    let result = requester.begin("Colombo", "Atlantis", &mut notices);
    assert!(matches!(
        result,
        Err(RouteError::Registry(RegistryError::NotFound(_)))
    ));
    // Not something users can cause, so they aren't told about it
    assert!(notices.alerts.is_empty());
    assert!(!requester.is_loading());
}
