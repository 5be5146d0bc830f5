//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep the CLI decoupled from storage details.

use crate::model::registro::{RegistroId, RegistroValidationError};
use crate::repo::registro_repo::RepoError;
use crate::transfer::TransferError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod registro_service;
pub mod settings_service;
pub mod stats;

/// Service error for registro and settings use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// No map position was chosen for the registro.
    MissingLocation,
    /// Description is blank after trimming.
    MissingDescription,
    Validation(RegistroValidationError),
    NotFound(RegistroId),
    Repo(RepoError),
    Transfer(TransferError),
    /// Setting value cannot be encoded as JSON.
    InvalidSetting(String),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingLocation => write!(f, "select a location for the registro"),
            Self::MissingDescription => write!(f, "add a description to the registro"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "registro not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Transfer(err) => write!(f, "{err}"),
            Self::InvalidSetting(message) => write!(f, "invalid setting value: {message}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent registro state: {details}")
            }
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Transfer(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<RegistroValidationError> for ServiceError {
    fn from(value: RegistroValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<TransferError> for ServiceError {
    fn from(value: TransferError) -> Self {
        Self::Transfer(value)
    }
}
