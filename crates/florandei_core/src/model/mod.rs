//! Domain model for field observations.
//!
//! # Responsibility
//! - Define the canonical registro record and its save-time draft.
//! - Define the photo payload stored beside a registro.
//!
//! # Invariants
//! - Every registro is identified by a stable, non-blank `RegistroId`.
//! - A registro's photo lives outside the record; `has_photo` mirrors it.

pub mod photo;
pub mod registro;
