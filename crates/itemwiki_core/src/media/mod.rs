//! Item image validation and persistence.
//!
//! # Responsibility
//! - Validate uploaded image bytes (sniffed format, byte ceiling, pixel
//!   ceiling) before anything touches the filesystem.
//! - Persist accepted images under generated collision-resistant names.
//! - Remove superseded images without ever failing the caller.
//!
//! # Invariants
//! - The shared placeholder image is never deleted.
//! - Stored filenames are `YYYYMMDD_<16 hex><ext>`; the client-supplied name
//!   only contributes its (sanitized, allow-listed) extension.

use chrono::Local;
use log::{info, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub mod sniff;

pub use sniff::ImageFormat;

/// Relative path stored for items without an uploaded image.
pub const PLACEHOLDER_IMAGE_PATH: &str = "assets/images/placeholder.png";
/// Upload directory used when none is configured.
pub const DEFAULT_IMAGE_DIR: &str = "assets/images";
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 3000;

const ALLOWED_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".gif"];
const FALLBACK_EXTENSION: &str = ".png";
const FALLBACK_FILENAME: &str = "unknown_file";
const MAX_SANITIZED_FILENAME_CHARS: usize = 100;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-. ]").expect("filename regex must compile"));

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug)]
pub enum MediaError {
    Empty,
    TooLarge { size: usize, max: usize },
    UnsupportedFormat,
    /// The format was recognized but its header could not be parsed.
    Corrupt,
    DimensionsTooLarge { width: u32, height: u32, max: u32 },
    /// An upload arrived but no image directory was configured.
    StoreNotConfigured,
    Io(std::io::Error),
}

impl Display for MediaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "image upload is empty"),
            Self::TooLarge { size, max } => write!(
                f,
                "image is too large ({size} bytes, max {} MB)",
                max / 1024 / 1024
            ),
            Self::UnsupportedFormat => {
                write!(f, "file is not a supported image (PNG, JPG, JPEG, GIF)")
            }
            Self::Corrupt => write!(f, "image header is corrupt"),
            Self::DimensionsTooLarge { width, height, max } => write!(
                f,
                "image dimensions {width}x{height} exceed {max}x{max}px"
            ),
            Self::StoreNotConfigured => write!(f, "no image directory is configured"),
            Self::Io(err) => write!(f, "image storage error: {err}"),
        }
    }
}

impl Error for MediaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MediaError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Result of a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

/// Checks size, sniffed format and header dimensions, in that order.
pub fn validate_image(bytes: &[u8]) -> MediaResult<ImageInfo> {
    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(MediaError::TooLarge {
            size: bytes.len(),
            max: MAX_IMAGE_BYTES,
        });
    }

    let format = sniff::sniff_format(bytes).ok_or(MediaError::UnsupportedFormat)?;
    let (width, height) = sniff::read_dimensions(format, bytes).ok_or(MediaError::Corrupt)?;
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(MediaError::DimensionsTooLarge {
            width,
            height,
            max: MAX_IMAGE_DIMENSION,
        });
    }

    Ok(ImageInfo {
        format,
        width,
        height,
        size: bytes.len(),
    })
}

/// Strips directory components and characters outside `[\w\-. ]`.
/// Over-long names keep a 50-char stem plus the extension.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base, "").into_owned();

    let cleaned = if cleaned.chars().count() > MAX_SANITIZED_FILENAME_CHARS {
        let (stem, ext) = split_extension(&cleaned);
        format!("{}...{ext}", stem.chars().take(50).collect::<String>())
    } else {
        cleaned
    };

    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned
    }
}

/// Generates `YYYYMMDD_<16 hex><ext>` from the sanitized original name.
/// Extensions outside the allow-list become `.png`.
pub fn generate_image_filename(original: &str) -> String {
    let safe = sanitize_filename(original);
    let ext = split_extension(&safe).1.to_ascii_lowercase();
    let ext = if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        ext
    } else {
        FALLBACK_EXTENSION.to_string()
    };

    let random_id: u64 = rand::thread_rng().gen();
    format!("{}_{random_id:016x}{ext}", Local::now().format("%Y%m%d"))
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

/// Filesystem-backed image directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    image_dir: PathBuf,
}

impl ImageStore {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Validates and writes the upload; returns the stored path.
    pub fn save_upload(&self, original_filename: &str, bytes: &[u8]) -> MediaResult<PathBuf> {
        let image = validate_image(bytes)?;
        std::fs::create_dir_all(&self.image_dir)?;

        let target = self.image_dir.join(generate_image_filename(original_filename));
        std::fs::write(&target, bytes)?;

        info!(
            "event=image_saved module=media status=ok format={} width={} height={} bytes={}",
            image.format.mime_type(),
            image.width,
            image.height,
            image.size
        );
        Ok(target)
    }
}

/// Deletes `path` unless it is the placeholder. Failures are logged, never
/// returned.
pub fn remove_image_best_effort(path: &str, placeholder: &str) {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == placeholder || trimmed == PLACEHOLDER_IMAGE_PATH {
        return;
    }

    match std::fs::remove_file(trimmed) {
        Ok(()) => info!("event=image_removed module=media status=ok"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            "event=image_removed module=media status=error kind={:?}",
            err.kind()
        ),
    }
}
