//! Registro use-case service.
//!
//! # Responsibility
//! - Provide save/get/list/filter/delete APIs for registros.
//! - Normalize drafts (description, tags, id, timestamps) before persistence.
//! - Produce statistics and backup envelopes; import backups.
//!
//! # Invariants
//! - Saves read back the stored registro before returning it.
//! - Every filter constraint narrows the result set; no constraint lists all.
//! - An import validates every entry before writing any of them.

use crate::clock::now_epoch_ms;
use crate::model::photo::Photo;
use crate::model::registro::{
    generate_registro_id, normalize_tag, normalize_tags, Registro, RegistroDraft,
};
use crate::repo::registro_repo::RegistroRepository;
use crate::service::stats::{compute_statistics, Statistics};
use crate::service::ServiceError;
use crate::transfer::{ExportEnvelope, ExportedRegistro};
use log::{info, warn};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Result order for filtered listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest first.
    #[default]
    DateDesc,
    /// Oldest first.
    DateAsc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DateDesc => "date-desc",
            Self::DateAsc => "date-asc",
        }
    }
}

impl Display for SortOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "date-desc" => Ok(Self::DateDesc),
            "date-asc" => Ok(Self::DateAsc),
            other => Err(format!(
                "unsupported sort order `{other}`; expected date-desc|date-asc"
            )),
        }
    }
}

/// Listing filter. Blank `search`/`tag` values impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistroFilter {
    /// Case-insensitive substring of the description.
    pub search: Option<String>,
    /// Exact tag the registro must carry.
    pub tag: Option<String>,
    pub sort: SortOrder,
}

impl RegistroFilter {
    /// Returns whether a registro passes the search and tag constraints.
    pub fn matches(&self, registro: &Registro) -> bool {
        if let Some(needle) = self.search_needle() {
            if !registro.description.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if let Some(tag) = self.tag.as_deref().and_then(normalize_tag) {
            if !registro.has_tag(&tag) {
                return false;
            }
        }
        true
    }

    fn search_needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase)
    }
}

/// Registro together with its photo payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistroWithPhoto {
    pub registro: Registro,
    pub photo: Option<Photo>,
}

/// Registro service facade over repository implementations.
pub struct RegistroService<R: RegistroRepository> {
    repo: R,
}

impl<R: RegistroRepository> RegistroService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates or replaces a registro from a draft.
    ///
    /// A draft without an id creates a new registro. A draft without
    /// `created_at` keeps the stored value of an existing registro.
    pub fn save(&mut self, draft: RegistroDraft) -> Result<Registro, ServiceError> {
        let now = now_epoch_ms();
        let (registro, photo) = self.prepare(draft, now)?;
        let mode = self.persist(&registro, photo.as_ref())?;

        info!(
            "event=registro_save module=service status=ok mode={} tags={} has_photo={}",
            mode,
            registro.tags.len(),
            registro.has_photo
        );
        self.repo
            .get_registro(&registro.id)?
            .ok_or(ServiceError::InconsistentState(
                "saved registro not found in read-back",
            ))
    }

    /// Gets one registro with its photo.
    pub fn get(&self, id: &str) -> Result<Option<RegistroWithPhoto>, ServiceError> {
        let Some(registro) = self.repo.get_registro(id)? else {
            return Ok(None);
        };
        let photo = if registro.has_photo {
            self.repo.get_photo(id)?
        } else {
            None
        };
        Ok(Some(RegistroWithPhoto { registro, photo }))
    }

    /// Lists all registros, newest first.
    pub fn list(&self) -> Result<Vec<Registro>, ServiceError> {
        Ok(self.repo.list_registros()?)
    }

    /// Lists registros passing the filter, in the requested order.
    pub fn filter(&self, filter: &RegistroFilter) -> Result<Vec<Registro>, ServiceError> {
        let mut registros: Vec<Registro> = self
            .repo
            .list_registros()?
            .into_iter()
            .filter(|registro| filter.matches(registro))
            .collect();
        if filter.sort == SortOrder::DateAsc {
            registros.reverse();
        }
        Ok(registros)
    }

    /// Lists distinct tags, sorted.
    pub fn tags(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.repo.list_tags()?)
    }

    pub fn statistics(&self) -> Result<Statistics, ServiceError> {
        let registros = self.repo.list_registros()?;
        Ok(compute_statistics(&registros))
    }

    /// Deletes one registro and its photo.
    pub fn delete(&mut self, id: &str) -> Result<(), ServiceError> {
        self.repo.delete_registro(id)?;
        info!("event=registro_delete module=service status=ok");
        Ok(())
    }

    /// Deletes every registro and photo; returns how many registros were removed.
    pub fn clear(&mut self) -> Result<usize, ServiceError> {
        Ok(self.repo.clear_all()?)
    }

    /// Builds a backup envelope with every registro and inline photos.
    pub fn export(&self) -> Result<ExportEnvelope, ServiceError> {
        let registros = self.repo.list_registros()?;
        let mut entries = Vec::with_capacity(registros.len());
        for registro in &registros {
            let photo = if registro.has_photo {
                self.repo.get_photo(&registro.id)?
            } else {
                None
            };
            entries.push(ExportedRegistro::from_registro(registro, photo.as_ref()));
        }

        info!(
            "event=registros_export module=service status=ok registros={}",
            entries.len()
        );
        Ok(ExportEnvelope::new(entries, now_epoch_ms()))
    }

    /// Imports a backup envelope; returns how many registros were written.
    ///
    /// Entries are validated up front and written in one transaction, so a
    /// failing entry leaves the journal untouched.
    pub fn import(&mut self, envelope: ExportEnvelope) -> Result<usize, ServiceError> {
        envelope.check_version()?;
        let now = now_epoch_ms();

        let mut prepared = Vec::with_capacity(envelope.registros.len());
        for entry in envelope.registros {
            let draft = entry.into_draft()?;
            prepared.push(self.prepare(draft, now)?);
        }

        let imported = match self.repo.upsert_many(&prepared) {
            Ok(count) => count,
            Err(err) => {
                warn!("event=registros_import module=service status=error error={err}");
                return Err(err.into());
            }
        };

        info!("event=registros_import module=service status=ok imported={imported}");
        Ok(imported)
    }

    fn prepare(
        &self,
        draft: RegistroDraft,
        now: i64,
    ) -> Result<(Registro, Option<Photo>), ServiceError> {
        let location = draft.location.ok_or(ServiceError::MissingLocation)?;
        location.validate()?;

        let description = draft.description.trim().to_string();
        if description.is_empty() {
            return Err(ServiceError::MissingDescription);
        }

        let id = draft
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(generate_registro_id);

        let created_at = match draft.created_at {
            Some(value) => value,
            None => self
                .repo
                .get_registro(&id)?
                .map_or(now, |existing| existing.created_at),
        };

        let registro = Registro {
            id,
            latitude: location.latitude,
            longitude: location.longitude,
            description,
            tags: normalize_tags(&draft.tags),
            has_photo: draft.photo.is_some(),
            created_at,
            updated_at: now,
        };
        registro.validate()?;
        Ok((registro, draft.photo))
    }

    fn persist(
        &mut self,
        registro: &Registro,
        photo: Option<&Photo>,
    ) -> Result<&'static str, ServiceError> {
        let mode = if self.repo.get_registro(&registro.id)?.is_some() {
            "update"
        } else {
            "create"
        };
        self.repo.upsert_registro(registro, photo)?;
        Ok(mode)
    }
}
