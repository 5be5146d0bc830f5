//! Core domain logic for Florandei, a field log of geo-tagged observations.
//! This crate is the single source of truth for registro invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod map;
pub mod model;
pub mod offline;
pub mod repo;
pub mod service;
pub mod transfer;

pub use config::{AppConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::photo::{Photo, PhotoError};
pub use model::registro::{
    GeoPoint, Registro, RegistroDraft, RegistroId, RegistroValidationError, SUGGESTED_TAGS,
};
pub use repo::registro_repo::{
    RegistroRepository, RepoError, RepoResult, SqliteRegistroRepository,
};
pub use repo::settings_repo::{SettingsRepository, SqliteSettingsRepository};
pub use service::registro_service::{
    RegistroFilter, RegistroService, RegistroWithPhoto, SortOrder,
};
pub use service::settings_service::SettingsService;
pub use service::stats::{Statistics, TagCount};
pub use service::ServiceError;
pub use transfer::{ExportEnvelope, ExportedRegistro, TransferError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
