//! File-backed credential store.
//!
//! # Responsibility
//! - Persist user accounts as YAML (`credentials.usernames.<name>`).
//! - Hash passwords with Argon2id and verify logins.
//! - Implement [`AuthProvider`] for session transitions.
//!
//! # Invariants
//! - Usernames match `^[A-Za-z0-9_]+$` and compare case-sensitively.
//! - Every rewrite first copies the previous file to `<file>.backup`.
//! - A user can never delete their own account.
//! - Plain-text passwords are returned to the caller once and never stored.

use crate::access::session::{AuthenticatedUser, Session};
use crate::model::role::Role;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Local;
use log::{info, warn};
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const MIN_PASSWORD_CHARS: usize = 8;
const GENERATED_PASSWORD_CHARS: usize = 12;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SYSTEM_ACTOR: &str = "system";

static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username regex must compile"));

pub type CredentialResult<T> = Result<T, CredentialError>;

#[derive(Debug)]
pub enum CredentialError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Hashing(String),
    InvalidUsername(String),
    DuplicateUser(String),
    UnknownUser(String),
    WeakPassword { min_chars: usize },
    InvalidCredentials,
    SelfDeletion,
}

impl Display for CredentialError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "credential file error: {err}"),
            Self::Yaml(err) => write!(f, "credential file is not valid YAML: {err}"),
            Self::Hashing(message) => write!(f, "password hashing failed: {message}"),
            Self::InvalidUsername(name) => write!(
                f,
                "invalid username `{name}`; use letters, digits and `_` only"
            ),
            Self::DuplicateUser(name) => write!(f, "user `{name}` already exists"),
            Self::UnknownUser(name) => write!(f, "user `{name}` does not exist"),
            Self::WeakPassword { min_chars } => {
                write!(f, "password must be at least {min_chars} characters")
            }
            Self::InvalidCredentials => write!(f, "invalid username or password"),
            Self::SelfDeletion => write!(f, "users cannot delete their own account"),
        }
    }
}

impl Error for CredentialError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Yaml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CredentialError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for CredentialError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

/// One stored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub force_password_change: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialTable {
    #[serde(default)]
    pub usernames: BTreeMap<String, UserRecord>,
}

/// Root document of the credential file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialFile {
    #[serde(default)]
    pub credentials: CredentialTable,
}

/// Account view without the password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub created_at: String,
    pub created_by: String,
    pub force_password_change: bool,
}

impl UserSummary {
    fn from_record(username: &str, record: &UserRecord) -> Self {
        Self {
            username: username.to_string(),
            display_name: record.name.clone(),
            email: record.email.clone(),
            role: record.role,
            created_at: record.created_at.clone(),
            created_by: record.created_by.clone(),
            force_password_change: record.force_password_change,
        }
    }
}

/// Input for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Success,
    /// Credentials were valid but the account must pick a new password.
    PasswordChangeRequired,
    InvalidCredentials,
}

/// Collaborator that turns credentials into session transitions.
pub trait AuthProvider {
    fn login(&self, username: &str, password: &str) -> CredentialResult<(Session, LoginStatus)>;

    fn logout(&self, session: Session) -> Session {
        session.logout()
    }
}

/// YAML credential store rooted at one file path.
pub struct CredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<file>.backup`, next to the credential file.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }

    /// Reads the file; a missing file is an empty store.
    pub fn load(&self) -> CredentialResult<CredentialFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(CredentialFile::default()),
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(CredentialFile::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Ensures the default admin exists. Returns its generated password when
    /// the account was created by this call.
    pub fn bootstrap(&self) -> CredentialResult<Option<String>> {
        if self
            .load()?
            .credentials
            .usernames
            .contains_key(DEFAULT_ADMIN_USERNAME)
        {
            return Ok(None);
        }

        self.modify(|file| {
            if file
                .credentials
                .usernames
                .contains_key(DEFAULT_ADMIN_USERNAME)
            {
                return Ok(None);
            }

            let password = generate_password();
            file.credentials.usernames.insert(
                DEFAULT_ADMIN_USERNAME.to_string(),
                UserRecord {
                    name: "Administrator".to_string(),
                    email: String::new(),
                    password: hash_password(&password)?,
                    role: Role::Admin,
                    created_at: now_timestamp(),
                    created_by: SYSTEM_ACTOR.to_string(),
                    updated_at: None,
                    force_password_change: true,
                },
            );
            info!(
                "event=credentials_bootstrap module=access status=ok user={DEFAULT_ADMIN_USERNAME}"
            );
            Ok(Some(password))
        })
    }

    /// Verifies a login. `Ok(None)` means unknown user or wrong password.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> CredentialResult<Option<UserSummary>> {
        let file = self.load()?;
        let Some(record) = file.credentials.usernames.get(username) else {
            return Ok(None);
        };
        if !verify_password(password, &record.password) {
            return Ok(None);
        }
        Ok(Some(UserSummary::from_record(username, record)))
    }

    /// Creates an account with a generated password, which is returned once.
    pub fn create_user(&self, user: &NewUser, created_by: &str) -> CredentialResult<String> {
        validate_username(&user.username)?;

        self.modify(|file| {
            if file.credentials.usernames.contains_key(&user.username) {
                return Err(CredentialError::DuplicateUser(user.username.clone()));
            }

            let password = generate_password();
            file.credentials.usernames.insert(
                user.username.clone(),
                UserRecord {
                    name: user.display_name.trim().to_string(),
                    email: user.email.trim().to_string(),
                    password: hash_password(&password)?,
                    role: user.role,
                    created_at: now_timestamp(),
                    created_by: created_by.to_string(),
                    updated_at: None,
                    force_password_change: true,
                },
            );
            info!(
                "event=user_create module=access status=ok role={}",
                user.role.as_str()
            );
            Ok(password)
        })
    }

    pub fn list_users(&self) -> CredentialResult<Vec<UserSummary>> {
        let file = self.load()?;
        Ok(file
            .credentials
            .usernames
            .iter()
            .map(|(username, record)| UserSummary::from_record(username, record))
            .collect())
    }

    /// Replaces the password with a generated one and forces a change at
    /// next login.
    pub fn reset_password(&self, username: &str) -> CredentialResult<String> {
        self.modify(|file| {
            let record = file
                .credentials
                .usernames
                .get_mut(username)
                .ok_or_else(|| CredentialError::UnknownUser(username.to_string()))?;

            let password = generate_password();
            record.password = hash_password(&password)?;
            record.force_password_change = true;
            record.updated_at = Some(now_timestamp());
            info!("event=password_reset module=access status=ok");
            Ok(password)
        })
    }

    /// Verifies `current`, stores `new` and clears the force-change flag.
    pub fn change_password(
        &self,
        username: &str,
        current: &str,
        new: &str,
    ) -> CredentialResult<()> {
        if new.chars().count() < MIN_PASSWORD_CHARS {
            return Err(CredentialError::WeakPassword {
                min_chars: MIN_PASSWORD_CHARS,
            });
        }

        self.modify(|file| {
            let record = file
                .credentials
                .usernames
                .get_mut(username)
                .ok_or(CredentialError::InvalidCredentials)?;
            if !verify_password(current, &record.password) {
                return Err(CredentialError::InvalidCredentials);
            }

            record.password = hash_password(new)?;
            record.force_password_change = false;
            record.updated_at = Some(now_timestamp());
            info!("event=password_change module=access status=ok");
            Ok(())
        })
    }

    pub fn delete_user(&self, username: &str, acting_username: &str) -> CredentialResult<()> {
        if username == acting_username {
            return Err(CredentialError::SelfDeletion);
        }

        self.modify(|file| {
            if file.credentials.usernames.remove(username).is_none() {
                return Err(CredentialError::UnknownUser(username.to_string()));
            }
            info!("event=user_delete module=access status=ok");
            Ok(())
        })
    }

    /// Read-modify-write under the store lock. The file is rewritten only
    /// when `f` succeeds.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut CredentialFile) -> CredentialResult<T>,
    ) -> CredentialResult<T> {
        let _guard = self.lock();
        let mut file = self.load()?;
        let value = f(&mut file)?;
        self.save(&file)?;
        Ok(value)
    }

    fn save(&self, file: &CredentialFile) -> CredentialResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            std::fs::copy(&self.path, self.backup_path())?;
        }

        let content = serde_yaml::to_string(file)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuthProvider for CredentialStore {
    fn login(&self, username: &str, password: &str) -> CredentialResult<(Session, LoginStatus)> {
        let Some(user) = self.authenticate(username, password)? else {
            warn!("event=login module=access status=error reason=invalid_credentials");
            return Ok((Session::anonymous(), LoginStatus::InvalidCredentials));
        };

        let status = if user.force_password_change {
            LoginStatus::PasswordChangeRequired
        } else {
            LoginStatus::Success
        };
        info!(
            "event=login module=access status=ok role={}",
            user.role.as_str()
        );

        let session = Session::anonymous().login_as(AuthenticatedUser {
            identity: user.username,
            display_name: user.display_name,
            role: user.role,
        });
        Ok((session, status))
    }
}

pub fn validate_username(username: &str) -> CredentialResult<()> {
    if USERNAME_PATTERN.is_match(username) {
        Ok(())
    } else {
        Err(CredentialError::InvalidUsername(username.to_string()))
    }
}

fn hash_password(password: &str) -> CredentialResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| CredentialError::Hashing(err.to_string()))
}

/// Unparseable stored hashes never verify.
fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_CHARS)
        .map(char::from)
        .collect()
}

fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::{hash_password, validate_username, verify_password};

    #[test]
    fn usernames_are_restricted_to_word_characters() {
        assert!(validate_username("player_2").is_ok());
        assert!(validate_username("Player2").is_ok());
        assert!(validate_username("player 2").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username("ผู้ใช้").is_err());
    }

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
