//! Marker layer and map view state.
//!
//! # Invariants
//! - At most one marker per registro id.
//! - At most one temporary (draft) marker at a time.
//! - View zoom always stays within the area's zoom limits.

use crate::clock::format_date;
use crate::map::area::{distance_km, MapArea};
use crate::model::registro::{GeoPoint, Registro, RegistroId};
use chrono::TimeZone;
use std::fmt::Display;

pub const NEAR_USER_ZOOM: u8 = 16;
pub const USER_ZOOM: u8 = 17;
pub const MARKER_ZOOM: u8 = 18;
const POPUP_TITLE_CHARS: usize = 50;
const POPUP_TAG_COUNT: usize = 3;

/// Device position reported by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserLocation {
    pub point: GeoPoint,
    /// Accuracy radius in metres.
    pub accuracy_m: f64,
}

impl UserLocation {
    pub fn new(point: GeoPoint, accuracy_m: f64) -> Self {
        Self { point, accuracy_m }
    }

    /// e.g. `±12m`.
    pub fn accuracy_label(&self) -> String {
        format!("±{}m", self.accuracy_m.round() as i64)
    }
}

/// Short summary shown when a marker is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub title: String,
    /// First tags joined by `, `, when the registro has any.
    pub tags: Option<String>,
    /// `dd/mm/yyyy`.
    pub date: String,
}

impl Popup {
    pub fn for_registro<Tz: TimeZone>(registro: &Registro, tz: &Tz) -> Self
    where
        Tz::Offset: Display,
    {
        let mut title: String = registro.description.chars().take(POPUP_TITLE_CHARS).collect();
        if registro.description.chars().count() > POPUP_TITLE_CHARS {
            title.push_str("...");
        }

        let tags = if registro.tags.is_empty() {
            None
        } else {
            Some(
                registro
                    .tags
                    .iter()
                    .take(POPUP_TAG_COUNT)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        };

        Self {
            title,
            tags,
            date: format_date(registro.created_at, tz),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: RegistroId,
    pub position: GeoPoint,
    pub popup: Popup,
}

/// Markers for saved registros plus the draft marker.
#[derive(Debug, Default)]
pub struct MarkerLayer {
    markers: Vec<Marker>,
    temp: Option<GeoPoint>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all registro markers.
    pub fn load<Tz: TimeZone>(&mut self, registros: &[Registro], tz: &Tz)
    where
        Tz::Offset: Display,
    {
        self.clear();
        for registro in registros {
            self.add(registro, tz);
        }
    }

    /// Adds a marker, replacing any marker with the same id.
    pub fn add<Tz: TimeZone>(&mut self, registro: &Registro, tz: &Tz)
    where
        Tz::Offset: Display,
    {
        self.remove(&registro.id);
        self.markers.push(Marker {
            id: registro.id.clone(),
            position: registro.location(),
            popup: Popup::for_registro(registro, tz),
        });
    }

    /// Removes the marker for `id`; returns whether one existed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.markers.len();
        self.markers.retain(|marker| marker.id != id);
        self.markers.len() != before
    }

    pub fn get(&self, id: &str) -> Option<&Marker> {
        self.markers.iter().find(|marker| marker.id == id)
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    /// Places the draft marker, replacing the previous one.
    pub fn place_temp(&mut self, point: GeoPoint) {
        self.temp = Some(point);
    }

    /// Moves the draft marker after a drag; returns false when none is placed.
    pub fn move_temp(&mut self, point: GeoPoint) -> bool {
        match self.temp.as_mut() {
            Some(current) => {
                *current = point;
                true
            }
            None => false,
        }
    }

    pub fn remove_temp(&mut self) {
        self.temp = None;
    }

    pub fn temp(&self) -> Option<GeoPoint> {
        self.temp
    }

    /// Markers within `radius_km` of `point`, nearest first.
    pub fn nearest(&self, point: GeoPoint, radius_km: f64) -> Vec<(&Marker, f64)> {
        let mut found: Vec<(&Marker, f64)> = self
            .markers
            .iter()
            .map(|marker| (marker, distance_km(point, marker.position)))
            .filter(|(_, distance)| *distance <= radius_km)
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
        found
    }
}

/// Camera state of the map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    pub center: GeoPoint,
    pub zoom: u8,
    /// Registro whose popup is open.
    pub open_popup: Option<RegistroId>,
}

impl MapView {
    /// Starts on the area, or on the user when they are inside it.
    pub fn initial(area: &MapArea, user: Option<&UserLocation>) -> Self {
        match user {
            Some(user) if area.is_near(user.point) => Self {
                center: user.point,
                zoom: area.clamp_zoom(NEAR_USER_ZOOM),
                open_popup: None,
            },
            _ => Self {
                center: area.center,
                zoom: area.clamp_zoom(area.zoom),
                open_popup: None,
            },
        }
    }

    pub fn center_on_user(&mut self, area: &MapArea, user: &UserLocation) {
        self.center = user.point;
        self.zoom = area.clamp_zoom(USER_ZOOM);
        self.open_popup = None;
    }

    /// Centers on a registro marker and opens its popup; false when unknown.
    pub fn center_on_marker(&mut self, area: &MapArea, layer: &MarkerLayer, id: &str) -> bool {
        let Some(marker) = layer.get(id) else {
            return false;
        };
        self.center = marker.position;
        self.zoom = area.clamp_zoom(MARKER_ZOOM);
        self.open_popup = Some(marker.id.clone());
        true
    }
}
