use std::collections::BTreeMap;

use city_registry::Coordinate;
use geo::{BoundingRect, Coord, LineString, Rect};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry};
use log::debug;

pub const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const TILE_ATTRIBUTION: &str = "© OpenStreetMap contributors";
pub const MAX_ZOOM: u8 = 19;

const SHADOW_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/images/marker-shadow.png";

pub const ROUTE_STYLE: RouteStyle = RouteStyle {
    color: "#3388ff",
    weight: 5.0,
    opacity: 0.8,
};

/// Handle to something added to a map surface
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LayerId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MarkerRole {
    Start,
    End,
}

impl MarkerRole {
    pub fn icon(self) -> Icon {
        let icon_url = match self {
            MarkerRole::Start => "https://raw.githubusercontent.com/pointhi/leaflet-color-markers/master/img/marker-icon-2x-green.png",
            MarkerRole::End => "https://raw.githubusercontent.com/pointhi/leaflet-color-markers/master/img/marker-icon-2x-red.png",
        };
        Icon {
            icon_url,
            shadow_url: SHADOW_URL,
            icon_size: [25, 41],
            icon_anchor: [12, 41],
            popup_anchor: [1, -34],
            shadow_size: [41, 41],
        }
    }

    fn label(self) -> &'static str {
        match self {
            MarkerRole::Start => "start",
            MarkerRole::End => "end",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Icon {
    pub icon_url: &'static str,
    pub shadow_url: &'static str,
    pub icon_size: [u32; 2],
    pub icon_anchor: [i32; 2],
    pub popup_anchor: [i32; 2],
    pub shadow_size: [u32; 2],
}

#[derive(Clone, PartialEq, Debug)]
pub struct TileLayer {
    pub url_template: String,
    pub attribution: String,
    pub max_zoom: u8,
}

impl Default for TileLayer {
    fn default() -> Self {
        Self {
            url_template: TILE_URL.to_string(),
            attribution: TILE_ATTRIBUTION.to_string(),
            max_zoom: MAX_ZOOM,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Marker {
    pub role: MarkerRole,
    pub at: Coordinate,
    pub icon: Icon,
    pub popup: String,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RouteStyle {
    pub color: &'static str,
    pub weight: f64,
    pub opacity: f64,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Polyline {
    pub points: Vec<Coordinate>,
    pub style: RouteStyle,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Viewport {
    Center { center: Coordinate, zoom: u8 },
    Fit { bounds: Rect, padding: [u32; 2] },
}

/// The mapping widget. Implementations draw whatever they're told; `MapView` decides what's on
/// the map.
pub trait MapSurface {
    fn set_view(&mut self, center: Coordinate, zoom: u8);
    fn add_tile_layer(&mut self, layer: TileLayer);
    fn add_marker(&mut self, marker: Marker) -> LayerId;
    fn open_popup(&mut self, id: LayerId);
    fn add_polyline(&mut self, line: Polyline) -> LayerId;
    /// Removing something that isn't there is a no-op
    fn remove_layer(&mut self, id: LayerId);
    fn fit_bounds(&mut self, bounds: Rect, padding: [u32; 2]);
}

/// Owns a surface and the overlays currently on it: at most one route line and one marker per
/// role.
pub struct MapView<S: MapSurface> {
    surface: S,
    start_marker: Option<LayerId>,
    end_marker: Option<LayerId>,
    route: Option<LayerId>,
}

impl<S: MapSurface> MapView<S> {
    pub fn initialize(mut surface: S, center: Coordinate, zoom: u8, tiles: TileLayer) -> Self {
        surface.set_view(center, zoom);
        surface.add_tile_layer(tiles);
        Self {
            surface,
            start_marker: None,
            end_marker: None,
            route: None,
        }
    }

    pub fn place_marker(&mut self, at: Coordinate, role: MarkerRole, label: String) -> LayerId {
        let slot = match role {
            MarkerRole::Start => &mut self.start_marker,
            MarkerRole::End => &mut self.end_marker,
        };
        if let Some(old) = slot.take() {
            self.surface.remove_layer(old);
        }
        let id = self.surface.add_marker(Marker {
            role,
            at,
            icon: role.icon(),
            popup: label,
        });
        if role == MarkerRole::Start {
            self.surface.open_popup(id);
        }
        *slot = Some(id);
        id
    }

    pub fn draw_route(&mut self, points: Vec<Coordinate>) -> LayerId {
        if let Some(old) = self.route.take() {
            self.surface.remove_layer(old);
        }
        debug!("Drawing a route with {} points", points.len());
        let id = self.surface.add_polyline(Polyline {
            points,
            style: ROUTE_STYLE,
        });
        self.route = Some(id);
        id
    }

    pub fn clear_overlays(&mut self) {
        for id in [
            self.route.take(),
            self.start_marker.take(),
            self.end_marker.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.surface.remove_layer(id);
        }
    }

    pub fn fit_to(&mut self, points: &[Coordinate], padding: [u32; 2]) {
        let line: LineString = points.iter().map(|pt| Coord::from(*pt)).collect();
        if let Some(bounds) = line.bounding_rect() {
            self.surface.fit_bounds(bounds, padding);
        }
    }

    /// How many markers and route lines are currently on the map
    pub fn overlay_count(&self) -> usize {
        [self.start_marker, self.end_marker, self.route]
            .into_iter()
            .flatten()
            .count()
    }

    pub fn has_route(&self) -> bool {
        self.route.is_some()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

enum Layer {
    Marker(Marker),
    Polyline(Polyline),
}

/// Keeps overlays in memory and hands them to a JS map as GeoJSON
pub struct GeoJsonSurface {
    container: String,
    tiles: Option<TileLayer>,
    viewport: Option<Viewport>,
    layers: BTreeMap<LayerId, Layer>,
    open_popup: Option<LayerId>,
    next_id: u32,
}

impl GeoJsonSurface {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            tiles: None,
            viewport: None,
            layers: BTreeMap::new(),
            open_popup: None,
            next_id: 0,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn tiles(&self) -> Option<&TileLayer> {
        self.tiles.as_ref()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.layers.values().filter_map(|layer| match layer {
            Layer::Marker(marker) => Some(marker),
            Layer::Polyline(_) => None,
        })
    }

    pub fn polylines(&self) -> impl Iterator<Item = &Polyline> {
        self.layers.values().filter_map(|layer| match layer {
            Layer::Polyline(line) => Some(line),
            Layer::Marker(_) => None,
        })
    }

    pub fn render_geojson(&self) -> String {
        let mut features = Vec::new();

        // Draw the route first, so markers sit on top of it
        for line in self.polylines() {
            let geometry: LineString = line.points.iter().map(|pt| Coord::from(*pt)).collect();
            let mut f = Feature::from(Geometry::from(&geometry));
            f.set_property("type", "route");
            f.set_property("color", line.style.color);
            f.set_property("weight", line.style.weight);
            f.set_property("opacity", line.style.opacity);
            features.push(f);
        }
        for (id, layer) in &self.layers {
            let Layer::Marker(marker) = layer else {
                continue;
            };
            let mut f = Feature::from(Geometry::from(geojson::Value::Point(vec![
                marker.at.lon,
                marker.at.lat,
            ])));
            f.set_property("type", marker.role.label());
            f.set_property("popup", marker.popup.clone());
            f.set_property("popup_open", self.open_popup == Some(*id));
            f.set_property("icon_url", marker.icon.icon_url);
            f.set_property("shadow_url", marker.icon.shadow_url);
            f.set_property("icon_size", marker.icon.icon_size.to_vec());
            f.set_property("icon_anchor", marker.icon.icon_anchor.to_vec());
            f.set_property("popup_anchor", marker.icon.popup_anchor.to_vec());
            f.set_property("shadow_size", marker.icon.shadow_size.to_vec());
            features.push(f);
        }

        GeoJson::from(features.into_iter().collect::<FeatureCollection>()).to_string()
    }

    fn next_layer(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl MapSurface for GeoJsonSurface {
    fn set_view(&mut self, center: Coordinate, zoom: u8) {
        self.viewport = Some(Viewport::Center { center, zoom });
    }

    fn add_tile_layer(&mut self, layer: TileLayer) {
        self.tiles = Some(layer);
    }

    fn add_marker(&mut self, marker: Marker) -> LayerId {
        let id = self.next_layer();
        self.layers.insert(id, Layer::Marker(marker));
        id
    }

    fn open_popup(&mut self, id: LayerId) {
        if self.layers.contains_key(&id) {
            self.open_popup = Some(id);
        }
    }

    fn add_polyline(&mut self, line: Polyline) -> LayerId {
        let id = self.next_layer();
        self.layers.insert(id, Layer::Polyline(line));
        id
    }

    fn remove_layer(&mut self, id: LayerId) {
        self.layers.remove(&id);
        if self.open_popup == Some(id) {
            self.open_popup = None;
        }
    }

    fn fit_bounds(&mut self, bounds: Rect, padding: [u32; 2]) {
        self.viewport = Some(Viewport::Fit { bounds, padding });
    }
}
