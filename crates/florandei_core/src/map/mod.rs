//! Map support: fixed survey area, geodesy, marker layer and tile math.
//!
//! # Responsibility
//! - Describe the fixed area the journal covers and its zoom limits.
//! - Keep one marker per registro plus a single draggable draft marker.
//! - Compute slippy-map tiles for the offline tile cache.
//!
//! Rendering is left to the front end; this module only holds state.

pub mod area;
pub mod markers;
pub mod tiles;

pub use area::{distance_km, format_coords, GeoBounds, MapArea, NEAR_AREA_KM};
pub use markers::{Marker, MarkerLayer, MapView, Popup, UserLocation};
pub use tiles::{tile_count_for_bounds, tiles_for_bounds, TileCoord, MAX_TILE_ZOOM};
