//! Stations and the parent → children hierarchy

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{btree_map, BTreeMap, HashMap};

/// Geographic position of a station
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// One GTFS stop as returned by the `gtfs/stops` endpoint (GeoJSON feature)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopFeature {
    pub properties: StopProperties,
}

/// Properties of a GTFS stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopProperties {
    pub stop_id: String,

    #[serde(default)]
    pub stop_name: String,

    #[serde(default)]
    pub stop_lat: Option<f64>,

    #[serde(default)]
    pub stop_lon: Option<f64>,

    /// Owning station; the API sends `""` or `null` for top-level stations
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub parent_station: Option<String>,

    /// Remaining fields are carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StopProperties {
    /// Location when both coordinates are present
    pub fn location(&self) -> Option<Location> {
        match (self.stop_lat, self.stop_lon) {
            (Some(lat), Some(lon)) => Some(Location { lat, lon }),
            _ => None,
        }
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// A top-level station and the stops folded into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub location: Option<Location>,
    /// Child stop ids, no duplicates, in declaration order
    #[serde(default)]
    pub children: Vec<String>,
}

impl Station {
    pub fn new(name: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            name: name.into(),
            location,
            children: Vec::new(),
        }
    }
}

/// Parent station id → station
///
/// Every child appears under exactly one parent and no child is itself a key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hierarchy {
    stations: BTreeMap<String, Station>,
}

impl Hierarchy {
    pub fn new(stations: BTreeMap<String, Station>) -> Self {
        Self { stations }
    }

    /// Number of parent stations
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, parent_id: &str) -> Option<&Station> {
        self.stations.get(parent_id)
    }

    pub fn contains_parent(&self, id: &str) -> bool {
        self.stations.contains_key(id)
    }

    /// Parents in id order
    pub fn iter(&self) -> btree_map::Iter<'_, String, Station> {
        self.stations.iter()
    }

    /// Parents plus all their children
    pub fn entity_count(&self) -> usize {
        self.stations.values().map(|s| 1 + s.children.len()).sum()
    }

    /// child id → parent id
    pub fn child_parent_map(&self) -> HashMap<&str, &str> {
        let mut map = HashMap::with_capacity(self.entity_count());
        for (parent_id, station) in &self.stations {
            for child in &station.children {
                map.insert(child.as_str(), parent_id.as_str());
            }
        }
        map
    }

    pub fn into_inner(self) -> BTreeMap<String, Station> {
        self.stations
    }
}
