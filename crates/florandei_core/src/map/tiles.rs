//! Web-Mercator ("slippy map") tile addressing.

use crate::map::area::GeoBounds;
use crate::model::registro::GeoPoint;
use serde::Serialize;
use std::f64::consts::PI;

/// Latitude limit of the Web-Mercator projection.
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Deepest zoom any supported tile server renders.
pub const MAX_TILE_ZOOM: u8 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Tile containing `point` at `zoom`.
    pub fn containing(point: GeoPoint, zoom: u8) -> Self {
        let n = f64::from(1u32 << zoom.min(30));
        let max_index = n - 1.0;
        let lat_rad = point.latitude.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
        let x = ((point.longitude + 180.0) / 360.0 * n).floor();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();
        Self {
            z: zoom,
            x: x.clamp(0.0, max_index) as u32,
            y: y.clamp(0.0, max_index) as u32,
        }
    }

    /// Expands a `{s}/{z}/{x}/{y}` URL template.
    ///
    /// `{s}` rotates over `subdomains` by `(x + y) % len`.
    pub fn url(&self, template: &str, subdomains: &[String]) -> String {
        let subdomain = if subdomains.is_empty() {
            ""
        } else {
            let index = (u64::from(self.x) + u64::from(self.y)) % subdomains.len() as u64;
            subdomains[index as usize].as_str()
        };
        template
            .replace("{s}", subdomain)
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

fn corner_tiles(bounds: &GeoBounds, zoom: u8) -> (TileCoord, TileCoord) {
    let north_west = TileCoord::containing(
        GeoPoint::new(bounds.north_east.latitude, bounds.south_west.longitude),
        zoom,
    );
    let south_east = TileCoord::containing(
        GeoPoint::new(bounds.south_west.latitude, bounds.north_east.longitude),
        zoom,
    );
    (north_west, south_east)
}

/// Number of tiles [`tiles_for_bounds`] would return, without building them.
pub fn tile_count_for_bounds(bounds: &GeoBounds, zoom: u8) -> u64 {
    let (north_west, south_east) = corner_tiles(bounds, zoom);
    let columns = u64::from(south_east.x.saturating_sub(north_west.x)) + 1;
    let rows = u64::from(south_east.y.saturating_sub(north_west.y)) + 1;
    columns.saturating_mul(rows)
}

/// Every tile intersecting `bounds` at `zoom`, row by row.
pub fn tiles_for_bounds(bounds: &GeoBounds, zoom: u8) -> Vec<TileCoord> {
    let (north_west, south_east) = corner_tiles(bounds, zoom);

    let mut tiles = Vec::new();
    for y in north_west.y..=south_east.y {
        for x in north_west.x..=south_east.x {
            tiles.push(TileCoord { z: zoom, x, y });
        }
    }
    tiles
}
