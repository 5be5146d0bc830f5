//! JSON backup envelope for export/import.
//!
//! # Responsibility
//! - Define the on-disk backup shape (`{version, exportDate, registros[]}`).
//! - Convert between backup entries and domain drafts.
//! - Read and write backup files.
//!
//! # Invariants
//! - Timestamps are RFC 3339 UTC strings with millisecond precision.
//! - Photos travel inline as base64 `data:` URLs.
//! - Only `1.x` envelopes are accepted.

use crate::clock::{parse_rfc3339_ms, to_rfc3339_ms};
use crate::model::photo::{Photo, PhotoError};
use crate::model::registro::{GeoPoint, Registro, RegistroDraft};
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Format version written by this build.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Errors raised while reading, writing or decoding a backup.
#[derive(Debug)]
pub enum TransferError {
    /// Backup JSON does not match the envelope shape.
    InvalidFormat(String),
    UnsupportedVersion(String),
    InvalidTimestamp {
        field: &'static str,
        value: String,
    },
    InvalidPhoto {
        id: Option<String>,
        source: PhotoError,
    },
    Io(std::io::Error),
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat(message) => write!(f, "invalid backup format: {message}"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported backup version `{version}`")
            }
            Self::InvalidTimestamp { field, value } => {
                write!(f, "invalid `{field}` timestamp `{value}`")
            }
            Self::InvalidPhoto { id, source } => match id {
                Some(id) => write!(f, "invalid photo for registro {id}: {source}"),
                None => write!(f, "invalid photo: {source}"),
            },
            Self::Io(err) => write!(f, "backup file error: {err}"),
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidPhoto { source, .. } => Some(source),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Backup file envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub export_date: String,
    pub registros: Vec<ExportedRegistro>,
}

/// One registro inside a backup file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedRegistro {
    /// Absent ids get a fresh id on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub has_photo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

fn default_version() -> String {
    EXPORT_FORMAT_VERSION.to_string()
}

impl ExportEnvelope {
    pub fn new(registros: Vec<ExportedRegistro>, export_date_ms: i64) -> Self {
        Self {
            version: EXPORT_FORMAT_VERSION.to_string(),
            export_date: to_rfc3339_ms(export_date_ms),
            registros,
        }
    }

    /// Accepts any `1.x` version.
    pub fn check_version(&self) -> Result<(), TransferError> {
        let major = self.version.trim().split('.').next().unwrap_or_default();
        if major == "1" {
            Ok(())
        } else {
            Err(TransferError::UnsupportedVersion(self.version.clone()))
        }
    }
}

impl ExportedRegistro {
    pub fn from_registro(registro: &Registro, photo: Option<&Photo>) -> Self {
        Self {
            id: Some(registro.id.clone()),
            latitude: registro.latitude,
            longitude: registro.longitude,
            description: registro.description.clone(),
            tags: registro.tags.clone(),
            created_at: Some(to_rfc3339_ms(registro.created_at)),
            updated_at: Some(to_rfc3339_ms(registro.updated_at)),
            has_photo: photo.is_some(),
            photo: photo.map(Photo::to_data_url),
        }
    }

    /// Converts a backup entry into a save draft.
    ///
    /// `hasPhoto` is informational; only an actual `photo` payload is kept.
    pub fn into_draft(self) -> Result<RegistroDraft, TransferError> {
        let created_at = match self.created_at.as_deref() {
            Some(value) => Some(parse_rfc3339_ms(value).ok_or_else(|| {
                TransferError::InvalidTimestamp {
                    field: "createdAt",
                    value: value.to_string(),
                }
            })?),
            None => None,
        };

        let photo = match self.photo.as_deref() {
            Some(value) => Some(Photo::from_data_url(value).map_err(|source| {
                TransferError::InvalidPhoto {
                    id: self.id.clone(),
                    source,
                }
            })?),
            None => None,
        };

        Ok(RegistroDraft {
            id: self.id,
            location: Some(GeoPoint::new(self.latitude, self.longitude)),
            description: self.description,
            tags: self.tags,
            photo,
            created_at,
        })
    }
}

/// Parses backup JSON text.
pub fn parse_envelope(text: &str) -> Result<ExportEnvelope, TransferError> {
    serde_json::from_str(text).map_err(|err| TransferError::InvalidFormat(err.to_string()))
}

/// Reads and parses a backup file.
pub fn read_envelope(path: impl AsRef<Path>) -> Result<ExportEnvelope, TransferError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_envelope(&text)
}

/// Writes a backup file as pretty-printed JSON.
pub fn write_envelope(
    path: impl AsRef<Path>,
    envelope: &ExportEnvelope,
) -> Result<(), TransferError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, envelope)
        .map_err(|err| TransferError::InvalidFormat(err.to_string()))?;
    writer.flush()?;
    info!(
        "event=backup_write module=transfer status=ok registros={}",
        envelope.registros.len()
    );
    Ok(())
}

/// Default backup file name for the given instant: `florandei-backup-YYYY-MM-DD.json`.
pub fn backup_file_name(now_ms: i64) -> String {
    let date = to_rfc3339_ms(now_ms);
    let day = date.split('T').next().unwrap_or_default();
    format!("florandei-backup-{day}.json")
}
