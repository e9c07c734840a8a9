//! Use-case services.
//!
//! # Responsibility
//! - Apply access gates and rate limits, then delegate to the repository or
//!   credential store.
//! - Give presentation code one error type per call.
//!
//! # Invariants
//! - Gates run before any side effect; a rejected call changes nothing.
//! - Role gates run before rate limits so rejected calls never spend budget.

use crate::access::{AccessError, CredentialError};
use crate::import::ImportError;
use crate::media::MediaError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod catalog_service;
pub mod user_admin_service;

pub use catalog_service::{CatalogService, DashboardCounts, ImageUpload};
pub use user_admin_service::UserAdminService;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    Access(AccessError),
    Repo(RepoError),
    Media(MediaError),
    Import(ImportError),
    Credential(CredentialError),
}

impl ServiceError {
    /// Whether the failure came from storage rather than a rule or gate.
    pub fn is_storage(&self) -> bool {
        match self {
            Self::Repo(err) => err.is_storage(),
            Self::Import(ImportError::Repo(err)) => err.is_storage(),
            _ => false,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Media(err) => write!(f, "{err}"),
            Self::Import(err) => write!(f, "{err}"),
            Self::Credential(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Access(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Media(err) => Some(err),
            Self::Import(err) => Some(err),
            Self::Credential(err) => Some(err),
        }
    }
}

impl From<AccessError> for ServiceError {
    fn from(value: AccessError) -> Self {
        Self::Access(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<MediaError> for ServiceError {
    fn from(value: MediaError) -> Self {
        Self::Media(value)
    }
}

impl From<ImportError> for ServiceError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

impl From<CredentialError> for ServiceError {
    fn from(value: CredentialError) -> Self {
        Self::Credential(value)
    }
}
