//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for items and reference
//!   data.
//! - Isolate SQLite query details from service orchestration.
//! - Serialize all storage access behind one connection guard.
//!
//! # Invariants
//! - Validation and duplicate checks run before any mutation.
//! - Every write runs inside one unit of work; a storage error rolls the
//!   whole unit back.
//! - Reference lookups are cached and invalidated after every write to the
//!   corresponding table.

use crate::db::DbError;
use crate::media::PLACEHOLDER_IMAGE_PATH;
use crate::model::reference::ReferenceKind;
use crate::model::validation::ValidationError;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub mod cache;
pub mod item_repo;
pub mod reference_repo;

pub use cache::{ReferenceCache, DEFAULT_REFERENCE_CACHE_TTL};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for catalog persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    /// Another record of the same entity already uses this name (ignoring case).
    DuplicateName {
        entity: &'static str,
        name: String,
    },
    /// Delete blocked because items still point at the reference row.
    ReferentialIntegrity {
        kind: ReferenceKind,
        id: i64,
        dependents: u64,
    },
    NotFound {
        entity: &'static str,
        id: i64,
    },
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicateName { entity, name } => {
                write!(f, "{entity} `{name}` already exists")
            }
            Self::ReferentialIntegrity {
                kind,
                id,
                dependents,
            } => write!(
                f,
                "{} {id} is still used by {dependents} item(s)",
                kind.label()
            ),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted catalog data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
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

impl RepoError {
    /// Whether this error came from the storage driver rather than a domain rule.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Db(_) | Self::InvalidData(_))
    }
}

/// SQLite-backed catalog repository.
///
/// Owns the single connection and the reference-data cache. Implements both
/// [`item_repo::ItemRepository`] and [`reference_repo::ReferenceRepository`].
pub struct SqliteCatalogRepository {
    conn: Mutex<Connection>,
    cache: ReferenceCache,
    placeholder_image: String,
}

impl SqliteCatalogRepository {
    /// Wraps a migrated connection (see [`crate::db::open_db`]).
    pub fn new(conn: Connection) -> Self {
        Self::with_cache_ttl(conn, DEFAULT_REFERENCE_CACHE_TTL)
    }

    pub fn with_cache_ttl(conn: Connection, ttl: Duration) -> Self {
        Self {
            conn: Mutex::new(conn),
            cache: ReferenceCache::new(ttl),
            placeholder_image: PLACEHOLDER_IMAGE_PATH.to_string(),
        }
    }

    /// Overrides the image path treated as the shared placeholder.
    pub fn with_placeholder_image(mut self, path: impl Into<String>) -> Self {
        self.placeholder_image = path.into();
        self
    }

    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    /// Runs a read-only closure against the guarded connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let guard = self.lock();
        f(&guard)
    }

    /// Runs `f` inside one immediate transaction. The transaction commits only
    /// when `f` returns `Ok`; any error drops it, which rolls back.
    pub(crate) fn unit_of_work<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let mut guard = self.lock();
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-operation drops its transaction, so the connection
        // itself is still consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Extended SQLite result code for the constraint that failed, if any.
pub(crate) fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Some(failure.extended_code)
        }
        _ => None,
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        constraint_code(err),
        Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        constraint_code(err),
        Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
    )
}

pub(crate) fn exists_by_id(conn: &Connection, table: &str, id: i64) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);"),
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
