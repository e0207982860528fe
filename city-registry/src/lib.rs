use std::collections::HashMap;
use std::sync::LazyLock;

use geo::{Coord, Point};
use geojson::de::deserialize_geometry;
use serde::{Deserialize, Serialize};


/// A (latitude, longitude) pair in degrees.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

// Deserialized input, before the range check
#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = RegistryError;

    fn try_from(raw: RawCoordinate) -> Result<Coordinate, RegistryError> {
        Coordinate::new(raw.lat, raw.lon)
    }
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Coordinate, RegistryError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(RegistryError::OutOfRange { lat, lon });
        }
        Ok(Coordinate { lat, lon })
    }

    /// Only for the built-in table, which is known to be in range.
    const fn fixed(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }
}

impl From<Coordinate> for Coord {
    fn from(pt: Coordinate) -> Coord {
        Coord {
            x: pt.lon,
            y: pt.lat,
        }
    }
}

impl TryFrom<Coord> for Coordinate {
    type Error = RegistryError;

    fn try_from(pt: Coord) -> Result<Coordinate, RegistryError> {
        Coordinate::new(pt.y, pt.x)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("no location called {0:?}")]
    NotFound(String),
    #[error("{0:?} is listed more than once")]
    Duplicate(String),
    #[error("({lat}, {lon}) isn't a valid latitude/longitude")]
    OutOfRange { lat: f64, lon: f64 },
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),
}

/// A fixed mapping from place name to coordinate. The order of names is the insertion order.
pub struct LocationRegistry {
    entries: Vec<(String, Coordinate)>,
    lookup: HashMap<String, usize>,
}

const SRI_LANKA: [(&str, Coordinate); 25] = [
    ("Colombo", Coordinate::fixed(6.9271, 79.8612)),
    ("Kandy", Coordinate::fixed(7.2906, 80.6337)),
    ("Galle", Coordinate::fixed(6.0535, 80.2210)),
    ("Jaffna", Coordinate::fixed(9.6615, 80.0255)),
    ("Negombo", Coordinate::fixed(7.2008, 79.8737)),
    ("Anuradhapura", Coordinate::fixed(8.3114, 80.4037)),
    ("Trincomalee", Coordinate::fixed(8.5874, 81.2152)),
    ("Batticaloa", Coordinate::fixed(7.7310, 81.6747)),
    ("Matara", Coordinate::fixed(5.9549, 80.5550)),
    ("Kurunegala", Coordinate::fixed(7.4863, 80.3647)),
    ("Ratnapura", Coordinate::fixed(6.6828, 80.3992)),
    ("Badulla", Coordinate::fixed(6.9934, 81.0550)),
    ("Nuwara Eliya", Coordinate::fixed(6.9497, 80.7891)),
    ("Polonnaruwa", Coordinate::fixed(7.9403, 81.0188)),
    ("Dambulla", Coordinate::fixed(7.8675, 80.6517)),
    ("Hikkaduwa", Coordinate::fixed(6.1395, 80.1063)),
    ("Mirissa", Coordinate::fixed(5.9485, 80.4718)),
    ("Ella", Coordinate::fixed(6.8667, 81.0466)),
    ("Sigiriya", Coordinate::fixed(7.9570, 80.7603)),
    ("Hambantota", Coordinate::fixed(6.1429, 81.1212)),
    ("Chilaw", Coordinate::fixed(7.5758, 79.7953)),
    ("Kalmunai", Coordinate::fixed(7.4167, 81.8167)),
    ("Vavuniya", Coordinate::fixed(8.7514, 80.4971)),
    ("Mannar", Coordinate::fixed(8.9810, 79.9044)),
    ("Ampara", Coordinate::fixed(7.2975, 81.6820)),
];

/// Roughly the middle of Sri Lanka, where the map starts out.
pub const SRI_LANKA_CENTER: Coordinate = Coordinate::fixed(7.8731, 80.7718);

static BUILTIN: LazyLock<LocationRegistry> = LazyLock::new(|| LocationRegistry {
    entries: SRI_LANKA
        .iter()
        .map(|(name, pt)| (name.to_string(), *pt))
        .collect(),
    lookup: SRI_LANKA
        .iter()
        .enumerate()
        .map(|(idx, (name, _))| (name.to_string(), idx))
        .collect(),
});

impl LocationRegistry {
    /// The built-in table of Sri Lankan cities, built once on first use.
    pub fn builtin() -> &'static LocationRegistry {
        &BUILTIN
    }

    pub fn from_entries<I, S>(input: I) -> Result<LocationRegistry, RegistryError>
    where
        I: IntoIterator<Item = (S, Coordinate)>,
        S: Into<String>,
    {
        let mut registry = LocationRegistry {
            entries: Vec::new(),
            lookup: HashMap::new(),
        };
        for (name, pt) in input {
            let name = name.into();
            // Re-check, since the fields are public
            let pt = Coordinate::new(pt.lat, pt.lon)?;
            if registry.lookup.contains_key(&name) {
                return Err(RegistryError::Duplicate(name));
            }
            registry.lookup.insert(name.clone(), registry.entries.len());
            registry.entries.push((name, pt));
        }
        Ok(registry)
    }

    /// Reads a FeatureCollection of points, each with a `name` property.
    pub fn from_geojson(input_string: &str) -> Result<LocationRegistry, RegistryError> {
        let input: Vec<InputCity> =
            geojson::de::deserialize_feature_collection_str_to_vec(input_string)?;
        let mut entries = Vec::new();
        for city in input {
            entries.push((city.name, Coordinate::try_from(city.geometry.0)?));
        }
        LocationRegistry::from_entries(entries)
    }

    pub fn coordinates_of(&self, name: &str) -> Result<Coordinate, RegistryError> {
        match self.lookup.get(name) {
            Some(idx) => Ok(self.entries[*idx].1),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Deserialize)]
struct InputCity {
    #[serde(deserialize_with = "deserialize_geometry")]
    geometry: Point,
    name: String,
}
