//! Registro/photo repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the CRUD facade over `registros`, `registro_tags` and `photos`.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - A registro, its ordered tags and its photo change in one transaction.
//! - `registros.has_photo` is 1 exactly when a `photos` row exists.
//! - Listing order is `created_at DESC, id ASC`.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::photo::Photo;
use crate::model::registro::{Registro, RegistroId, RegistroValidationError};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const REGISTRO_SELECT_SQL: &str = "SELECT
    id,
    latitude,
    longitude,
    description,
    has_photo,
    created_at,
    updated_at
FROM registros";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(RegistroValidationError),
    Db(DbError),
    NotFound(RegistroId),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "registro not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "database is missing required table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<RegistroValidationError> for RepoError {
    fn from(value: RegistroValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for registro CRUD operations.
pub trait RegistroRepository {
    /// Inserts or replaces one registro together with its tags and photo.
    ///
    /// `photo == None` removes any stored photo.
    fn upsert_registro(&mut self, registro: &Registro, photo: Option<&Photo>) -> RepoResult<()>;
    /// Writes every entry in one transaction; nothing is stored if any entry fails.
    fn upsert_many(&mut self, entries: &[(Registro, Option<Photo>)]) -> RepoResult<usize>;
    fn get_registro(&self, id: &str) -> RepoResult<Option<Registro>>;
    fn get_photo(&self, id: &str) -> RepoResult<Option<Photo>>;
    /// Lists every registro, newest first.
    fn list_registros(&self) -> RepoResult<Vec<Registro>>;
    /// Removes one registro with its tags and photo.
    fn delete_registro(&mut self, id: &str) -> RepoResult<()>;
    /// Removes every registro; returns how many were removed.
    fn clear_all(&mut self) -> RepoResult<usize>;
    /// Returns distinct tags sorted by name.
    fn list_tags(&self) -> RepoResult<Vec<String>>;
}

/// SQLite-backed registro repository.
pub struct SqliteRegistroRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteRegistroRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        for table in ["registros", "registro_tags", "photos"] {
            if !table_exists(conn, table)? {
                return Err(RepoError::MissingRequiredTable(table));
            }
        }
        Ok(Self { conn })
    }
}

impl RegistroRepository for SqliteRegistroRepository<'_> {
    fn upsert_registro(&mut self, registro: &Registro, photo: Option<&Photo>) -> RepoResult<()> {
        check_photo_flag(registro, photo)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_registro(&tx, registro, photo)?;
        tx.commit()?;
        debug!(
            "event=registro_upsert module=repo status=ok tags={} has_photo={}",
            registro.tags.len(),
            registro.has_photo
        );
        Ok(())
    }

    fn upsert_many(&mut self, entries: &[(Registro, Option<Photo>)]) -> RepoResult<usize> {
        for (registro, photo) in entries {
            check_photo_flag(registro, photo.as_ref())?;
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (registro, photo) in entries {
            write_registro(&tx, registro, photo.as_ref())?;
        }
        tx.commit()?;
        info!(
            "event=registro_upsert_many module=repo status=ok registros={}",
            entries.len()
        );
        Ok(entries.len())
    }

    fn get_registro(&self, id: &str) -> RepoResult<Option<Registro>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{REGISTRO_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            let tags = load_tags_for_registro(self.conn, id)?;
            return Ok(Some(parse_registro_row(row, tags)?));
        }
        Ok(None)
    }

    fn get_photo(&self, id: &str) -> RepoResult<Option<Photo>> {
        let photo = self
            .conn
            .query_row(
                "SELECT mime_type, data FROM photos WHERE registro_id = ?1;",
                [id],
                |row| {
                    Ok(Photo {
                        mime_type: row.get(0)?,
                        data: row.get(1)?,
                    })
                },
            )
            .optional()?;

        match photo {
            Some(photo) if photo.data.is_empty() => Err(RepoError::InvalidData(format!(
                "empty photo payload for registro {id}"
            ))),
            other => Ok(other),
        }
    }

    fn list_registros(&self) -> RepoResult<Vec<Registro>> {
        let mut all_tags = load_all_tags(self.conn)?;
        let mut stmt = self.conn.prepare(&format!(
            "{REGISTRO_SELECT_SQL} ORDER BY created_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut registros = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get("id")?;
            let tags = all_tags.remove(&id).unwrap_or_default();
            registros.push(parse_registro_row(row, tags)?);
        }
        Ok(registros)
    }

    fn delete_registro(&mut self, id: &str) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM photos WHERE registro_id = ?1;", [id])?;
        tx.execute("DELETE FROM registro_tags WHERE registro_id = ?1;", [id])?;
        let changed = tx.execute("DELETE FROM registros WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    fn clear_all(&mut self) -> RepoResult<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM photos;", [])?;
        tx.execute("DELETE FROM registro_tags;", [])?;
        let removed = tx.execute("DELETE FROM registros;", [])?;
        tx.commit()?;
        info!("event=registros_clear module=repo status=ok removed={removed}");
        Ok(removed)
    }

    fn list_tags(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT tag FROM registro_tags ORDER BY tag ASC;")?;
        let mut rows = stmt.query([])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(row.get(0)?);
        }
        Ok(tags)
    }
}

fn check_photo_flag(registro: &Registro, photo: Option<&Photo>) -> RepoResult<()> {
    registro.validate()?;
    if registro.has_photo != photo.is_some() {
        return Err(RepoError::InvalidData(format!(
            "registro {} has_photo={} does not match the photo payload",
            registro.id, registro.has_photo
        )));
    }
    Ok(())
}

fn write_registro(
    tx: &Transaction<'_>,
    registro: &Registro,
    photo: Option<&Photo>,
) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO registros (
            id,
            latitude,
            longitude,
            description,
            has_photo,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (id) DO UPDATE SET
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            description = excluded.description,
            has_photo = excluded.has_photo,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at;",
        params![
            registro.id.as_str(),
            registro.latitude,
            registro.longitude,
            registro.description.as_str(),
            bool_to_int(registro.has_photo),
            registro.created_at,
            registro.updated_at,
        ],
    )?;

    tx.execute(
        "DELETE FROM registro_tags WHERE registro_id = ?1;",
        [registro.id.as_str()],
    )?;
    for (position, tag) in registro.tags.iter().enumerate() {
        tx.execute(
            "INSERT INTO registro_tags (registro_id, position, tag) VALUES (?1, ?2, ?3);",
            params![registro.id.as_str(), position as i64, tag.as_str()],
        )?;
    }

    match photo {
        Some(photo) => {
            tx.execute(
                "INSERT INTO photos (registro_id, mime_type, data)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (registro_id) DO UPDATE SET
                    mime_type = excluded.mime_type,
                    data = excluded.data,
                    stored_at = (strftime('%s', 'now') * 1000);",
                params![
                    registro.id.as_str(),
                    photo.mime_type.as_str(),
                    photo.data.as_slice()
                ],
            )?;
        }
        None => {
            tx.execute(
                "DELETE FROM photos WHERE registro_id = ?1;",
                [registro.id.as_str()],
            )?;
        }
    }

    Ok(())
}

fn parse_registro_row(row: &Row<'_>, tags: Vec<String>) -> RepoResult<Registro> {
    let has_photo = match row.get::<_, i64>("has_photo")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid has_photo value `{other}` in registros.has_photo"
            )));
        }
    };

    let registro = Registro {
        id: row.get("id")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        description: row.get("description")?,
        tags,
        has_photo,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    registro.validate()?;
    Ok(registro)
}

fn load_tags_for_registro(conn: &Connection, registro_id: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT tag
         FROM registro_tags
         WHERE registro_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([registro_id])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(row.get(0)?);
    }
    Ok(tags)
}

fn load_all_tags(conn: &Connection) -> RepoResult<HashMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT registro_id, tag
         FROM registro_tags
         ORDER BY registro_id ASC, position ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut tags: HashMap<String, Vec<String>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let registro_id: String = row.get(0)?;
        tags.entry(registro_id).or_default().push(row.get(1)?);
    }
    Ok(tags)
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
