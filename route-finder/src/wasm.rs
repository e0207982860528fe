use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use js_sys::{Function, Promise};
use log::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::{
    Config, GeoJsonSurface, LocationRegistry, MapView, Notices, OsrmClient, RouteOutcome,
    RouteRequester, RouteService, TileLayer, Viewport,
};

static START: Once = Once::new();

type Requester = RouteRequester<'static, GeoJsonSurface>;

#[wasm_bindgen]
pub struct JsRouteFinder {
    // Shared with requests still waiting on the network
    requester: Rc<RefCell<Requester>>,
    service: Rc<OsrmClient>,
    on_change: Option<Function>,
}

#[wasm_bindgen]
impl JsRouteFinder {
    /// The element named by `config.container` (default "map") has to exist already.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<JsRouteFinder, JsValue> {
        START.call_once(|| {
            // Panics shouldn't happen, but if they do, console.log them.
            console_error_panic_hook::set_once();
            if let Err(err) = console_log::init_with_level(log::Level::Info) {
                web_sys::console::log_1(&format!("Couldn't set up logging: {err}").into());
            }
        });

        let config = parse_config(config)?;
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("no document to draw the map in"))?;
        if document.get_element_by_id(&config.container).is_none() {
            return Err(JsValue::from_str(&format!(
                "no element with id {:?} to draw the map in",
                config.container
            )));
        }

        let map = MapView::initialize(
            GeoJsonSurface::new(config.container.clone()),
            config.center,
            config.zoom,
            TileLayer::default(),
        );
        Ok(Self {
            requester: Rc::new(RefCell::new(RouteRequester::new(
                LocationRegistry::builtin(),
                map,
                &config,
            ))),
            service: Rc::new(OsrmClient::new(&config)),
            on_change: None,
        })
    }

    /// Changes the routing server and padding. Requests already in flight use the old server.
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, input: JsValue) -> Result<(), JsValue> {
        let config = parse_config(input)?;
        self.service = Rc::new(OsrmClient::new(&config));
        self.requester
            .borrow_mut()
            .set_fit_padding(config.fit_padding);
        Ok(())
    }

    /// The city names, in the order to show them
    pub fn cities(&self) -> Vec<String> {
        self.requester
            .borrow()
            .registry()
            .names()
            .map(|name| name.to_string())
            .collect()
    }

    #[wasm_bindgen(js_name = setStart)]
    pub fn set_start(&mut self, name: Option<String>) {
        self.requester.borrow_mut().select_start(name);
    }

    #[wasm_bindgen(js_name = setEnd)]
    pub fn set_end(&mut self, name: Option<String>) {
        self.requester.borrow_mut().select_end(name);
    }

    /// The callback gets the loading flag every time a request finishes.
    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&mut self, callback: Function) {
        self.on_change = Some(callback);
    }

    #[wasm_bindgen(js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.requester.borrow().is_loading()
    }

    /// Routes between the selected cities. The markers are placed before this returns; the
    /// promise resolves to "drawn", "no_route", "failed" or "superseded" once the routing
    /// service answers, or to "rejected" right away if the selection is empty or the same city
    /// twice. A name that isn't a known city rejects the promise with an error. The caller
    /// should redraw afterwards.
    #[wasm_bindgen(js_name = findRoute)]
    pub fn find_route(&self) -> Promise {
        let selection = self.requester.borrow().selection().clone();
        self.find_route_between(
            selection.start.unwrap_or_default(),
            selection.end.unwrap_or_default(),
        )
    }

    /// Like `findRoute`, but with explicit city names
    #[wasm_bindgen(js_name = findRouteBetween)]
    pub fn find_route_between(&self, start: String, end: String) -> Promise {
        let mut notices = Notices::default();
        let pending = self
            .requester
            .borrow_mut()
            .begin(&start, &end, &mut notices);
        deliver(notices, self.on_change.as_ref());
        let pending = match pending {
            Ok(pending) => pending,
            Err(crate::RouteError::Registry(err)) => return Promise::reject(&err_to_js(err)),
            Err(_) => return Promise::resolve(&JsValue::from_str("rejected")),
        };

        let requester = self.requester.clone();
        let service = self.service.clone();
        let on_change = self.on_change.clone();
        future_to_promise(async move {
            let result = service.route(pending.from, pending.to).await;
            let mut notices = Notices::default();
            // Don't hold the borrow while calling back into JS
            let outcome = requester
                .borrow_mut()
                .finish(pending, result, &mut notices);
            deliver(notices, on_change.as_ref());
            Ok(JsValue::from_str(outcome_name(outcome)))
        })
    }

    #[wasm_bindgen(js_name = clearOverlays)]
    pub fn clear_overlays(&mut self) {
        self.requester.borrow_mut().map_mut().clear_overlays();
    }

    #[wasm_bindgen(js_name = renderGeojson)]
    pub fn render_geojson(&self) -> String {
        self.requester.borrow().map().surface().render_geojson()
    }

    /// JSON describing the base tile layer
    #[wasm_bindgen(js_name = tileLayer)]
    pub fn tile_layer(&self) -> String {
        let requester = self.requester.borrow();
        let Some(tiles) = requester.map().surface().tiles() else {
            return "null".to_string();
        };
        serde_json::json!({
            "url": tiles.url_template,
            "attribution": tiles.attribution,
            "max_zoom": tiles.max_zoom,
        })
        .to_string()
    }

    /// JSON describing where the map should look: either a center and zoom, or bounds to fit
    /// with some padding
    pub fn viewport(&self) -> String {
        let value = match self.requester.borrow().map().surface().viewport() {
            Some(Viewport::Center { center, zoom }) => serde_json::json!({
                "center": [center.lat, center.lon],
                "zoom": zoom,
            }),
            Some(Viewport::Fit { bounds, padding }) => serde_json::json!({
                "bounds": [
                    [bounds.min().y, bounds.min().x],
                    [bounds.max().y, bounds.max().x],
                ],
                "padding": padding,
            }),
            None => serde_json::Value::Null,
        };
        value.to_string()
    }
}

fn parse_config(input: JsValue) -> Result<Config, JsValue> {
    if input.is_undefined() || input.is_null() {
        return Ok(Config::default());
    }
    serde_wasm_bindgen::from_value(input).map_err(err_to_js)
}

fn deliver(notices: Notices, on_change: Option<&Function>) {
    if let Some(window) = web_sys::window() {
        for message in notices.alerts {
            if let Err(err) = window.alert_with_message(&message) {
                warn!("Couldn't show {message:?}: {err:?}");
            }
        }
    }
    if let Some(callback) = on_change {
        for loading in notices.refreshes {
            if let Err(err) = callback.call1(&JsValue::NULL, &JsValue::from_bool(loading)) {
                warn!("onChange callback failed: {err:?}");
            }
        }
    }
}

fn outcome_name(outcome: RouteOutcome) -> &'static str {
    match outcome {
        RouteOutcome::Drawn { .. } => "drawn",
        RouteOutcome::NoRoute => "no_route",
        RouteOutcome::Failed => "failed",
        RouteOutcome::Superseded => "superseded",
    }
}

fn err_to_js<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}
