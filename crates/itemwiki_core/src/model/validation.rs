//! Validation errors raised before any catalog mutation.

use crate::model::reference::ReferenceKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Write-side validation failure. Returned before the store is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Trimmed name is shorter than the minimum for this record kind.
    NameTooShort { min_chars: usize },
    /// A reference id was not supplied (zero or negative).
    MissingReference(ReferenceKind),
    /// A reference id does not exist in its table.
    UnknownReference { kind: ReferenceKind, id: i64 },
    /// An attribute was supplied for a reference kind that has no such column.
    UnsupportedAttribute {
        kind: ReferenceKind,
        attribute: &'static str,
    },
    /// Rarity color is not a `#rrggbb` hex value.
    InvalidColor(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameTooShort { min_chars } => {
                write!(f, "name must be at least {min_chars} characters")
            }
            Self::MissingReference(kind) => write!(f, "{} is required", kind.label()),
            Self::UnknownReference { kind, id } => {
                write!(f, "{} with id {id} does not exist", kind.label())
            }
            Self::UnsupportedAttribute { kind, attribute } => {
                write!(f, "{} has no `{attribute}` attribute", kind.label())
            }
            Self::InvalidColor(value) => {
                write!(f, "color `{value}` must be a #rrggbb hex value")
            }
        }
    }
}

impl Error for ValidationError {}
