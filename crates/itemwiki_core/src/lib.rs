//! Core domain logic for the item wiki.
//! This crate is the single source of truth for catalog and access invariants.

pub mod access;
pub mod config;
pub mod db;
pub mod import;
pub mod logging;
pub mod media;
pub mod model;
pub mod repo;
pub mod service;
pub mod update;

pub use access::{
    AccessError, AuthProvider, CredentialError, CredentialStore, LoginStatus, NewUser,
    RateLimiter, Session, UserSummary,
};
pub use config::{AppConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, seed_defaults, DbError};
pub use import::{ImportError, ImportReport, RowError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use media::{ImageStore, MediaError};
pub use model::item::{ItemDetails, ItemDraft, ItemId};
pub use model::reference::{ReferenceDraft, ReferenceEntry, ReferenceId, ReferenceKind};
pub use model::role::Role;
pub use model::validation::ValidationError;
pub use repo::item_repo::{ItemRepository, ItemSearchFilter};
pub use repo::reference_repo::ReferenceRepository;
pub use repo::{RepoError, RepoResult, SqliteCatalogRepository};
pub use service::{
    CatalogService, DashboardCounts, ImageUpload, ServiceError, ServiceResult, UserAdminService,
};
pub use update::{HttpUpdateChannel, InstallLayout, UpdateChannel, UpdateError, Updater};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
