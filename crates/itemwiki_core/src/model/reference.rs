//! Reference (master data) records: item types, rarities, drop locations
//! and tiers.
//!
//! # Invariants
//! - Each kind maps to exactly one table and one foreign-key column on `items`.
//! - Names are unique per kind, compared ignoring ASCII case.
//! - Display attributes only exist on the kinds whose table has the column.

use crate::model::validation::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid hex color regex"));

pub type ReferenceId = i64;

/// Default rarity color when none is given.
pub const DEFAULT_RARITY_COLOR: &str = "#808080";
/// Default rarity icon when none is given.
pub const DEFAULT_RARITY_ICON: &str = "⚪";

/// The four lookup tables items point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    ItemType,
    Rarity,
    DropLocation,
    Tier,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 4] = [
        ReferenceKind::ItemType,
        ReferenceKind::Rarity,
        ReferenceKind::DropLocation,
        ReferenceKind::Tier,
    ];

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::ItemType => "item_types",
            Self::Rarity => "rarities",
            Self::DropLocation => "drop_locations",
            Self::Tier => "tiers",
        }
    }

    /// Column on `items` holding the reference id.
    pub fn item_column(self) -> &'static str {
        match self {
            Self::ItemType => "type_id",
            Self::Rarity => "rarity_id",
            Self::DropLocation => "location_id",
            Self::Tier => "tier_id",
        }
    }

    /// Stable identifier used by CLI arguments and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemType => "type",
            Self::Rarity => "rarity",
            Self::DropLocation => "location",
            Self::Tier => "tier",
        }
    }

    /// User-facing label.
    pub fn label(self) -> &'static str {
        match self {
            Self::ItemType => "item type",
            Self::Rarity => "rarity",
            Self::DropLocation => "drop location",
            Self::Tier => "tier",
        }
    }

    pub fn has_display_order(self) -> bool {
        !matches!(self, Self::DropLocation)
    }

    /// `ORDER BY` clause used when listing this kind.
    pub(crate) fn list_order(self) -> &'static str {
        if self.has_display_order() {
            "display_order ASC, name COLLATE NOCASE ASC, id ASC"
        } else {
            "name COLLATE NOCASE ASC, id ASC"
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "type" | "item_type" | "item_types" => Some(Self::ItemType),
            "rarity" | "rarities" => Some(Self::Rarity),
            "location" | "drop_location" | "drop_locations" => Some(Self::DropLocation),
            "tier" | "tiers" => Some(Self::Tier),
            _ => None,
        }
    }
}

/// One persisted reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: ReferenceId,
    pub kind: ReferenceKind,
    pub name: String,
    /// Present for item types, rarities and tiers.
    pub display_order: Option<i64>,
    /// Present for rarities.
    pub color: Option<String>,
    /// Present for rarities.
    pub icon: Option<String>,
    /// Present for drop locations (may still be `None`).
    pub description: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Write model for creating or replacing a reference row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDraft {
    pub kind: ReferenceKind,
    pub name: String,
    pub display_order: Option<i64>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
}

impl ReferenceDraft {
    /// Creates a draft with only a name; display attributes fall back to
    /// table defaults.
    pub fn new(kind: ReferenceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            display_order: None,
            color: None,
            icon: None,
            description: None,
        }
    }

    pub fn with_display_order(mut self, order: i64) -> Self {
        self.display_order = Some(order);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks name presence and attribute applicability for this kind.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::NameTooShort { min_chars: 1 });
        }

        if self.display_order.is_some() && !self.kind.has_display_order() {
            return Err(self.unsupported("display_order"));
        }
        if self.kind != ReferenceKind::Rarity {
            if self.color.is_some() {
                return Err(self.unsupported("color"));
            }
            if self.icon.is_some() {
                return Err(self.unsupported("icon"));
            }
        }
        if self.description.is_some() && self.kind != ReferenceKind::DropLocation {
            return Err(self.unsupported("description"));
        }

        if let Some(color) = self.color.as_deref() {
            if !HEX_COLOR_RE.is_match(color.trim()) {
                return Err(ValidationError::InvalidColor(color.to_string()));
            }
        }

        Ok(())
    }

    /// Returns a copy with whitespace trimmed from text fields.
    pub fn normalized(&self) -> Self {
        Self {
            kind: self.kind,
            name: self.name.trim().to_string(),
            display_order: self.display_order,
            color: self.color.as_deref().map(|value| value.trim().to_string()),
            icon: self.icon.as_deref().map(|value| value.trim().to_string()),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }

    fn unsupported(&self, attribute: &'static str) -> ValidationError {
        ValidationError::UnsupportedAttribute {
            kind: self.kind,
            attribute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReferenceDraft, ReferenceKind};
    use crate::model::validation::ValidationError;

    #[test]
    fn parses_cli_aliases() {
        assert_eq!(ReferenceKind::parse("Type"), Some(ReferenceKind::ItemType));
        assert_eq!(
            ReferenceKind::parse("drop_location"),
            Some(ReferenceKind::DropLocation)
        );
        assert_eq!(ReferenceKind::parse("tiers"), Some(ReferenceKind::Tier));
        assert_eq!(ReferenceKind::parse("weapon"), None);
    }

    #[test]
    fn rejects_blank_name() {
        let err = ReferenceDraft::new(ReferenceKind::Tier, "   ")
            .validate()
            .expect_err("blank name must fail");
        assert_eq!(err, ValidationError::NameTooShort { min_chars: 1 });
    }

    #[test]
    fn rejects_attributes_the_table_does_not_have() {
        let err = ReferenceDraft::new(ReferenceKind::ItemType, "Weapon")
            .with_color("#ffffff")
            .validate()
            .expect_err("item types have no color");
        assert!(matches!(
            err,
            ValidationError::UnsupportedAttribute {
                attribute: "color",
                ..
            }
        ));

        let err = ReferenceDraft::new(ReferenceKind::DropLocation, "Cave")
            .with_display_order(3)
            .validate()
            .expect_err("locations have no display order");
        assert!(matches!(
            err,
            ValidationError::UnsupportedAttribute {
                attribute: "display_order",
                ..
            }
        ));
    }

    #[test]
    fn validates_rarity_color_format() {
        ReferenceDraft::new(ReferenceKind::Rarity, "Mythic")
            .with_color("#A1b2C3")
            .with_icon("🔴")
            .validate()
            .expect("valid rarity");

        let err = ReferenceDraft::new(ReferenceKind::Rarity, "Mythic")
            .with_color("red")
            .validate()
            .expect_err("named colors are rejected");
        assert_eq!(err, ValidationError::InvalidColor("red".to_string()));
    }

    #[test]
    fn normalized_trims_and_drops_empty_description() {
        let draft = ReferenceDraft::new(ReferenceKind::DropLocation, "  Cave ")
            .with_description("   ")
            .normalized();
        assert_eq!(draft.name, "Cave");
        assert_eq!(draft.description, None);
    }
}
