//! Photo payload attached to a registro.
//!
//! # Responsibility
//! - Hold raw image bytes together with their MIME type.
//! - Convert to and from `data:` URLs used by the backup format.
//!
//! # Invariants
//! - `data` is never empty.
//! - `mime_type` is a lowercase `type/subtype` value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

static DATA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+)(?:;[^,;]+=[^,;]*)*;base64,(.*)$")
        .expect("valid data url regex")
});

/// Errors raised while building a photo.
#[derive(Debug)]
pub enum PhotoError {
    /// Input is not a base64 `data:` URL.
    InvalidDataUrl,
    /// Base64 payload cannot be decoded.
    InvalidBase64(base64::DecodeError),
    /// File extension does not map to a supported image type.
    UnsupportedExtension(String),
    EmptyData,
    Io(std::io::Error),
}

impl Display for PhotoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDataUrl => write!(f, "photo is not a base64 data url"),
            Self::InvalidBase64(err) => write!(f, "photo payload is not valid base64: {err}"),
            Self::UnsupportedExtension(ext) => {
                write!(f, "unsupported photo extension `{ext}`")
            }
            Self::EmptyData => write!(f, "photo payload is empty"),
            Self::Io(err) => write!(f, "cannot read photo: {err}"),
        }
    }
}

impl Error for PhotoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidBase64(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PhotoError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Image bytes stored beside a registro.
#[derive(Clone, PartialEq, Eq)]
pub struct Photo {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Debug for Photo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Photo {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Result<Self, PhotoError> {
        if data.is_empty() {
            return Err(PhotoError::EmptyData);
        }
        Ok(Self {
            mime_type: mime_type.into().trim().to_ascii_lowercase(),
            data,
        })
    }

    /// Parses a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(value: &str) -> Result<Self, PhotoError> {
        let caps = DATA_URL_RE
            .captures(value.trim())
            .ok_or(PhotoError::InvalidDataUrl)?;
        let mime_type = caps.get(1).map_or("", |m| m.as_str());
        let payload: String = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let data = STANDARD
            .decode(payload.as_bytes())
            .map_err(PhotoError::InvalidBase64)?;
        Self::new(mime_type, data)
    }

    /// Renders the photo as a base64 `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    /// Reads an image file, inferring the MIME type from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PhotoError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .map(|value| value.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let mime_type =
            mime_for_extension(&ext).ok_or_else(|| PhotoError::UnsupportedExtension(ext.clone()))?;
        let data = std::fs::read(path)?;
        Self::new(mime_type, data)
    }

    /// Preferred file extension for this photo's MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/jpeg" => "jpg",
            _ => "bin",
        }
    }
}

/// Maps a lowercase file extension to an image MIME type.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
