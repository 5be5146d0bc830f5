//! Survey area definition and distance helpers.

use crate::model::registro::GeoPoint;
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Users closer than this to the area center start centered on themselves.
pub const NEAR_AREA_KM: f64 = 10.0;

/// Axis-aligned geographic rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south_west: GeoPoint,
    pub north_east: GeoPoint,
}

impl GeoBounds {
    pub fn new(south_west: GeoPoint, north_east: GeoPoint) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south_west.latitude..=self.north_east.latitude).contains(&point.latitude)
            && (self.south_west.longitude..=self.north_east.longitude).contains(&point.longitude)
    }

    pub fn is_well_formed(&self) -> bool {
        self.south_west.validate().is_ok()
            && self.north_east.validate().is_ok()
            && self.south_west.latitude < self.north_east.latitude
            && self.south_west.longitude < self.north_east.longitude
    }
}

/// The fixed area shown by the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapArea {
    pub name: String,
    pub center: GeoPoint,
    pub zoom: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: GeoBounds,
}

impl Default for MapArea {
    /// Cravinhos-SP.
    fn default() -> Self {
        Self {
            name: "Cravinhos".to_string(),
            center: GeoPoint::new(-21.3367, -47.7453),
            zoom: 14,
            min_zoom: 12,
            max_zoom: 19,
            bounds: GeoBounds::new(GeoPoint::new(-21.40, -47.82), GeoPoint::new(-21.27, -47.67)),
        }
    }
}

impl MapArea {
    pub fn clamp_zoom(&self, zoom: u8) -> u8 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    /// Whether a point is close enough to open the map centered on it.
    pub fn is_near(&self, point: GeoPoint) -> bool {
        distance_km(point, self.center) < NEAR_AREA_KM
    }
}

/// Great-circle distance in kilometres.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let from = Point::new(a.longitude, a.latitude);
    let to = Point::new(b.longitude, b.latitude);
    Haversine::distance(from, to) / 1000.0
}

/// Formats coordinates as `lat, lng` with six decimals.
pub fn format_coords(latitude: f64, longitude: f64) -> String {
    format!("{latitude:.6}, {longitude:.6}")
}
