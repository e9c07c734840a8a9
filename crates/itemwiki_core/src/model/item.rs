//! Item domain model.
//!
//! # Responsibility
//! - Define the write model (`ItemDraft`) and joined read model (`ItemDetails`).
//! - Normalize user input before persistence.
//!
//! # Invariants
//! - Trimmed names have at least `MIN_ITEM_NAME_CHARS` characters.
//! - All four reference ids are positive.
//! - Persisted descriptions never contain HTML tags.

use crate::media::PLACEHOLDER_IMAGE_PATH;
use crate::model::reference::{ReferenceId, ReferenceKind};
use crate::model::validation::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

pub type ItemId = i64;

/// Minimum item name length after trimming.
pub const MIN_ITEM_NAME_CHARS: usize = 2;

/// Write model for item create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    pub type_id: ReferenceId,
    pub rarity_id: ReferenceId,
    pub location_id: ReferenceId,
    pub tier_id: ReferenceId,
    pub description: String,
    /// `None` stores the shared placeholder image.
    pub image_path: Option<String>,
}

impl ItemDraft {
    pub fn new(
        name: impl Into<String>,
        type_id: ReferenceId,
        rarity_id: ReferenceId,
        location_id: ReferenceId,
        tier_id: ReferenceId,
    ) -> Self {
        Self {
            name: name.into(),
            type_id,
            rarity_id,
            location_id,
            tier_id,
            description: String::new(),
            image_path: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_image_path(mut self, image_path: impl Into<String>) -> Self {
        self.image_path = Some(image_path.into());
        self
    }

    /// Reference id for one kind.
    pub fn reference_id(&self, kind: ReferenceKind) -> ReferenceId {
        match kind {
            ReferenceKind::ItemType => self.type_id,
            ReferenceKind::Rarity => self.rarity_id,
            ReferenceKind::DropLocation => self.location_id,
            ReferenceKind::Tier => self.tier_id,
        }
    }

    /// Validates fields that can be checked without the store.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().chars().count() < MIN_ITEM_NAME_CHARS {
            return Err(ValidationError::NameTooShort {
                min_chars: MIN_ITEM_NAME_CHARS,
            });
        }

        for kind in ReferenceKind::ALL {
            if self.reference_id(kind) <= 0 {
                return Err(ValidationError::MissingReference(kind));
            }
        }

        Ok(())
    }

    /// Returns the persisted form: trimmed name, tag-free description and a
    /// concrete image path.
    pub fn normalized(&self) -> Self {
        let image_path = self
            .image_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(PLACEHOLDER_IMAGE_PATH)
            .to_string();

        Self {
            name: self.name.trim().to_string(),
            type_id: self.type_id,
            rarity_id: self.rarity_id,
            location_id: self.location_id,
            tier_id: self.tier_id,
            description: strip_html_tags(&self.description).trim().to_string(),
            image_path: Some(image_path),
        }
    }
}

/// Joined read model: an item with every reference resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub id: ItemId,
    pub name: String,
    pub type_id: ReferenceId,
    pub type_name: String,
    pub rarity_id: ReferenceId,
    pub rarity_name: String,
    pub rarity_color: String,
    pub rarity_icon: String,
    pub location_id: ReferenceId,
    pub location_name: String,
    pub tier_id: ReferenceId,
    pub tier_name: String,
    pub description: String,
    pub image_path: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl ItemDetails {
    /// Projects the joined record back onto its write model.
    pub fn to_draft(&self) -> ItemDraft {
        ItemDraft {
            name: self.name.clone(),
            type_id: self.type_id,
            rarity_id: self.rarity_id,
            location_id: self.location_id,
            tier_id: self.tier_id,
            description: self.description.clone(),
            image_path: Some(self.image_path.clone()),
        }
    }

    pub fn has_placeholder_image(&self) -> bool {
        self.image_path == PLACEHOLDER_IMAGE_PATH
    }
}

/// Removes anything that looks like an HTML tag.
pub fn strip_html_tags(value: &str) -> String {
    HTML_TAG_RE.replace_all(value, "").into_owned()
}
