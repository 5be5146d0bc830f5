//! Registro domain model.
//!
//! # Responsibility
//! - Define the observation record persisted by the journal.
//! - Normalize and validate user-provided fields before persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another registro.
//! - Coordinates are finite and within WGS84 ranges.
//! - `description` is trimmed and non-empty.
//! - `tags` hold no blanks and no duplicates; order is the user's order.
//! - `created_at` survives edits and imports; `updated_at` moves on every save.

use crate::model::photo::Photo;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Stable identifier of a registro.
///
/// Kept as a plain string: imported backups carry ids generated by older
/// clients that are not UUIDs.
pub type RegistroId = String;

/// Tags offered to the user before any custom tag is typed.
pub const SUGGESTED_TAGS: &[&str] = &[
    "Árvore Frutífera",
    "Nativa",
    "Exótica",
    "Medicinal",
    "Ornamental",
    "Floração",
    "Frutificação",
];

/// WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Checks that both coordinates are finite and in range.
    pub fn validate(&self) -> Result<(), RegistroValidationError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(RegistroValidationError::NonFiniteCoordinate);
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(RegistroValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(RegistroValidationError::LongitudeOutOfRange(
                self.longitude,
            ));
        }
        Ok(())
    }
}

/// Validation failures for registro fields.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistroValidationError {
    BlankId,
    BlankDescription,
    NonFiniteCoordinate,
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
    BlankTag,
    DuplicateTag(String),
}

impl Display for RegistroValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId => write!(f, "registro id cannot be blank"),
            Self::BlankDescription => write!(f, "registro description cannot be blank"),
            Self::NonFiniteCoordinate => write!(f, "registro coordinates must be finite"),
            Self::LatitudeOutOfRange(value) => {
                write!(f, "latitude {value} is outside [-90, 90]")
            }
            Self::LongitudeOutOfRange(value) => {
                write!(f, "longitude {value} is outside [-180, 180]")
            }
            Self::BlankTag => write!(f, "registro tags cannot be blank"),
            Self::DuplicateTag(tag) => write!(f, "registro tag `{tag}` is duplicated"),
        }
    }
}

impl Error for RegistroValidationError {}

/// Persisted observation record.
///
/// The photo payload is stored separately; `has_photo` tells readers whether
/// to fetch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registro {
    pub id: RegistroId,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub tags: Vec<String>,
    pub has_photo: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl Registro {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|value| value == tag)
    }

    /// Validates persisted-shape invariants.
    pub fn validate(&self) -> Result<(), RegistroValidationError> {
        if self.id.trim().is_empty() {
            return Err(RegistroValidationError::BlankId);
        }
        if self.description.trim().is_empty() {
            return Err(RegistroValidationError::BlankDescription);
        }
        self.location().validate()?;

        let mut seen = HashSet::new();
        for tag in &self.tags {
            if tag.trim().is_empty() {
                return Err(RegistroValidationError::BlankTag);
            }
            if !seen.insert(tag.as_str()) {
                return Err(RegistroValidationError::DuplicateTag(tag.clone()));
            }
        }
        Ok(())
    }
}

/// Save request for a new or edited registro.
///
/// `photo == None` means the saved registro has no photo, so an edit must
/// carry the existing photo forward to keep it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistroDraft {
    /// `None` creates a new registro with a generated id.
    pub id: Option<RegistroId>,
    /// `None` until the user picks a position on the map.
    pub location: Option<GeoPoint>,
    pub description: String,
    pub tags: Vec<String>,
    pub photo: Option<Photo>,
    /// `None` keeps the stored value on edit and uses "now" on create.
    pub created_at: Option<i64>,
}

impl RegistroDraft {
    pub fn new(location: GeoPoint, description: impl Into<String>) -> Self {
        Self {
            id: None,
            location: Some(location),
            description: description.into(),
            tags: Vec::new(),
            photo: None,
            created_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<RegistroId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_photo(mut self, photo: Photo) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Generates a fresh registro id.
pub fn generate_registro_id() -> RegistroId {
    Uuid::new_v4().to_string()
}

/// Normalizes one tag: trims and collapses inner whitespace.
///
/// Returns `None` for blank input. Case is preserved.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let collapsed = WHITESPACE_RE.replace_all(tag.trim(), " ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.into_owned())
    }
}

/// Normalizes and deduplicates tags, keeping first-occurrence order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(tags.len());
    for tag in tags {
        if let Some(value) = normalize_tag(tag) {
            if seen.insert(value.clone()) {
                normalized.push(value);
            }
        }
    }
    normalized
}
