//! Self-update channel.
//!
//! # Responsibility
//! - Fetch the published version marker, release notes and data bundle.
//! - Back up local database and credential files before replacing them.
//! - Record the installed version locally.
//!
//! # Invariants
//! - The bundle is downloaded and parsed before any local file changes.
//! - Backups land in `<app_root>/backup/` ahead of every replacement.
//! - Local files are replaced through a sibling temp file and a rename.
//! - Callers must close any open catalog connection before `apply`.

use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

pub mod version;

pub use version::{compare_versions, is_newer};

pub const VERSION_MARKER_FILE: &str = "latest_version.txt";
pub const RELEASE_NOTES_FILE: &str = "update_notes.txt";
pub const BUNDLE_FILE: &str = "item_wiki_db.zip";
pub const LOCAL_VERSION_FILE: &str = "version.txt";
pub const BACKUP_DIR: &str = "backup";
/// Version assumed when no local marker exists.
pub const DEFAULT_INSTALLED_VERSION: &str = "2.0.0";

const BUNDLE_DB_ENTRY: &str = "item_wiki.db";
const BUNDLE_CREDENTIALS_ENTRY: &str = ".streamlit/auth_config.yaml";
const BUNDLE_IMAGES_PREFIX: &str = "assets/images/";

pub type UpdateResult<T> = Result<T, UpdateError>;

#[derive(Debug)]
pub enum UpdateError {
    Http(reqwest::Error),
    Status { url: String, status: u16 },
    Zip(zip::result::ZipError),
    Io(std::io::Error),
    EmptyVersionMarker,
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(err) => write!(f, "update request failed: {err}"),
            Self::Status { url, status } => write!(f, "update server returned {status} for {url}"),
            Self::Zip(err) => write!(f, "update bundle is not a valid zip: {err}"),
            Self::Io(err) => write!(f, "update file operation failed: {err}"),
            Self::EmptyVersionMarker => write!(f, "published version marker is empty"),
        }
    }
}

impl Error for UpdateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Zip(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Status { .. } | Self::EmptyVersionMarker => None,
        }
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Zip(value)
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Remote source of published releases.
pub trait UpdateChannel {
    fn latest_version(&self) -> UpdateResult<String>;
    fn release_notes(&self) -> UpdateResult<String>;
    fn download_bundle(&self) -> UpdateResult<Vec<u8>>;
}

/// Channel serving the three release files under one base URL.
pub struct HttpUpdateChannel {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpUpdateChannel {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, file: &str) -> UpdateResult<reqwest::blocking::Response> {
        let url = format!("{}{file}", self.base_url);
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(UpdateError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

impl UpdateChannel for HttpUpdateChannel {
    fn latest_version(&self) -> UpdateResult<String> {
        let version = self.get(VERSION_MARKER_FILE)?.text()?.trim().to_string();
        if version.is_empty() {
            return Err(UpdateError::EmptyVersionMarker);
        }
        Ok(version)
    }

    fn release_notes(&self) -> UpdateResult<String> {
        Ok(self.get(RELEASE_NOTES_FILE)?.text()?)
    }

    fn download_bundle(&self) -> UpdateResult<Vec<u8>> {
        Ok(self.get(BUNDLE_FILE)?.bytes()?.to_vec())
    }
}

/// Local files touched by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub app_root: PathBuf,
    pub db_path: PathBuf,
    pub credentials_path: PathBuf,
    pub image_dir: PathBuf,
}

impl InstallLayout {
    pub fn version_file(&self) -> PathBuf {
        self.app_root.join(LOCAL_VERSION_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.app_root.join(BACKUP_DIR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub current_version: String,
    pub latest_version: String,
    pub has_update: bool,
    /// `None` when the notes could not be fetched.
    pub notes: Option<String>,
}

/// Files written by one successful [`Updater::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub version: String,
    pub replaced_database: bool,
    pub replaced_credentials: bool,
    pub images_copied: usize,
    pub backups: Vec<PathBuf>,
}

pub struct Updater<C> {
    channel: C,
    layout: InstallLayout,
}

impl<C: UpdateChannel> Updater<C> {
    pub fn new(channel: C, layout: InstallLayout) -> Self {
        Self { channel, layout }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Locally recorded version, or the default when none was written.
    pub fn current_version(&self) -> String {
        std::fs::read_to_string(self.layout.version_file())
            .ok()
            .map(|content| content.trim().to_string())
            .filter(|version| !version.is_empty())
            .unwrap_or_else(|| DEFAULT_INSTALLED_VERSION.to_string())
    }

    pub fn check(&self) -> UpdateResult<UpdateCheck> {
        let current_version = self.current_version();
        let latest_version = self.channel.latest_version()?;
        let notes = match self.channel.release_notes() {
            Ok(notes) => Some(notes),
            Err(err) => {
                warn!("event=update_notes module=update status=error error={err}");
                None
            }
        };

        let has_update = is_newer(&latest_version, &current_version);
        info!(
            "event=update_check module=update status=ok current={current_version} latest={latest_version} has_update={has_update}"
        );
        Ok(UpdateCheck {
            current_version,
            latest_version,
            has_update,
            notes,
        })
    }

    /// Downloads the bundle and installs it as `version`.
    pub fn apply(&self, version: &str) -> UpdateResult<AppliedUpdate> {
        let bundle = Bundle::parse(self.channel.download_bundle()?)?;

        let mut applied = AppliedUpdate {
            version: version.to_string(),
            backups: self.backup_current_files()?,
            ..AppliedUpdate::default()
        };

        if let Some(db) = bundle.database.as_deref() {
            replace_file(&self.layout.db_path, db)?;
            applied.replaced_database = true;
        }
        if let Some(credentials) = bundle.credentials.as_deref() {
            replace_file(&self.layout.credentials_path, credentials)?;
            applied.replaced_credentials = true;
        }
        for (name, bytes) in &bundle.images {
            replace_file(&self.layout.image_dir.join(name), bytes)?;
            applied.images_copied += 1;
        }

        replace_file(&self.layout.version_file(), version.as_bytes())?;
        info!(
            "event=update_apply module=update status=ok version={version} database={} credentials={} images={}",
            applied.replaced_database, applied.replaced_credentials, applied.images_copied
        );
        Ok(applied)
    }

    /// Check, then apply when a newer version is published.
    pub fn check_and_apply(&self) -> UpdateResult<Option<AppliedUpdate>> {
        let check = self.check()?;
        if !check.has_update {
            return Ok(None);
        }
        self.apply(&check.latest_version).map(Some)
    }

    fn backup_current_files(&self) -> UpdateResult<Vec<PathBuf>> {
        let backup_dir = self.layout.backup_dir();
        std::fs::create_dir_all(&backup_dir)?;

        let mut backups = Vec::new();
        for source in [&self.layout.db_path, &self.layout.credentials_path] {
            if !source.exists() {
                continue;
            }
            let Some(name) = source.file_name() else {
                continue;
            };
            let mut backup_name = name.to_os_string();
            backup_name.push(".bak");
            let target = backup_dir.join(backup_name);
            std::fs::copy(source, &target)?;
            backups.push(target);
        }
        Ok(backups)
    }
}

/// Recognized entries of a downloaded bundle.
#[derive(Debug, Default)]
struct Bundle {
    database: Option<Vec<u8>>,
    credentials: Option<Vec<u8>>,
    images: Vec<(String, Vec<u8>)>,
}

impl Bundle {
    fn parse(bytes: Vec<u8>) -> UpdateResult<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut bundle = Bundle::default();

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            // Entries escaping the archive root are ignored.
            let Some(path) = entry.enclosed_name().map(Path::to_path_buf) else {
                continue;
            };
            let name = path.to_string_lossy().replace('\\', "/");
            let name = name.trim_start_matches("./").to_string();

            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;

            if name == BUNDLE_DB_ENTRY {
                bundle.database = Some(content);
            } else if name == BUNDLE_CREDENTIALS_ENTRY {
                bundle.credentials = Some(content);
            } else if let Some(image) = name.strip_prefix(BUNDLE_IMAGES_PREFIX) {
                if !image.is_empty() && !image.contains('/') {
                    bundle.images.push((image.to_string(), content));
                }
            }
        }
        Ok(bundle)
    }
}

fn replace_file(target: &Path, content: &[u8]) -> UpdateResult<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut staging = target.as_os_str().to_os_string();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    std::fs::write(&staging, content)?;
    std::fs::rename(&staging, target)?;
    Ok(())
}
