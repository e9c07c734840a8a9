//! Item repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and filtered search over `items` joined with its four
//!   reference tables.
//! - Remove item image files once the owning row is gone.
//!
//! # Invariants
//! - Write paths validate and normalize the draft before SQL mutations.
//! - Names are unique ignoring ASCII case; the check runs in the same unit of
//!   work as the write.
//! - Image cleanup is best-effort and never changes the operation result.

use crate::media::remove_image_best_effort;
use crate::model::item::{ItemDetails, ItemDraft, ItemId};
use crate::model::reference::{ReferenceId, ReferenceKind};
use crate::model::validation::ValidationError;
use crate::repo::{
    exists_by_id, is_foreign_key_violation, is_unique_violation, RepoError, RepoResult,
    SqliteCatalogRepository,
};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const ITEM_ENTITY: &str = "item";

const ITEM_DETAILS_SELECT_SQL: &str = "SELECT
    i.id,
    i.name,
    i.description,
    i.image_path,
    i.created_at,
    i.updated_at,
    t.id AS type_id,
    t.name AS type_name,
    r.id AS rarity_id,
    r.name AS rarity_name,
    r.color AS rarity_color,
    r.icon AS rarity_icon,
    l.id AS location_id,
    l.name AS location_name,
    tr.id AS tier_id,
    tr.name AS tier_name
FROM items i
INNER JOIN item_types t ON i.type_id = t.id
INNER JOIN rarities r ON i.rarity_id = r.id
INNER JOIN drop_locations l ON i.location_id = l.id
INNER JOIN tiers tr ON i.tier_id = tr.id";

/// Conjunctive item search filters. Empty fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSearchFilter {
    /// Substring match on item name (ASCII case-insensitive).
    pub name_contains: Option<String>,
    pub type_ids: Vec<ReferenceId>,
    pub rarity_ids: Vec<ReferenceId>,
    pub location_ids: Vec<ReferenceId>,
    pub tier_ids: Vec<ReferenceId>,
}

impl ItemSearchFilter {
    pub fn ids_for(&self, kind: ReferenceKind) -> &[ReferenceId] {
        match kind {
            ReferenceKind::ItemType => &self.type_ids,
            ReferenceKind::Rarity => &self.rarity_ids,
            ReferenceKind::DropLocation => &self.location_ids,
            ReferenceKind::Tier => &self.tier_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name_contains
            .as_deref()
            .map_or(true, |text| text.trim().is_empty())
            && ReferenceKind::ALL
                .iter()
                .all(|kind| self.ids_for(*kind).is_empty())
    }
}

/// Repository interface for item operations.
pub trait ItemRepository {
    fn create_item(&self, draft: &ItemDraft) -> RepoResult<ItemId>;
    /// Replaces every field. A draft without an image path keeps the stored
    /// image; a different path removes the superseded file after commit.
    fn update_item(&self, id: ItemId, draft: &ItemDraft) -> RepoResult<()>;
    /// Removes the row, then its image file (placeholder excepted).
    fn delete_item(&self, id: ItemId) -> RepoResult<()>;
    fn get_item(&self, id: ItemId) -> RepoResult<Option<ItemDetails>>;
    /// Results are ordered by name ascending (ignoring case), then id.
    fn search_items(&self, filter: &ItemSearchFilter) -> RepoResult<Vec<ItemDetails>>;
    fn is_duplicate_name(&self, name: &str, exclude_id: Option<ItemId>) -> RepoResult<bool>;
    fn count_items(&self) -> RepoResult<u64>;
    fn count_items_with_rarity(&self, rarity_name: &str) -> RepoResult<u64>;
    /// Image path shared by items without their own image; never deleted.
    fn placeholder_image(&self) -> &str;
}

impl ItemRepository for SqliteCatalogRepository {
    fn create_item(&self, draft: &ItemDraft) -> RepoResult<ItemId> {
        draft.validate()?;
        let item = draft.normalized();

        let id = self.unit_of_work(|tx| {
            ensure_references_exist(tx, &item)?;
            if name_taken(tx, &item.name, None)? {
                return Err(duplicate(&item.name));
            }

            tx.execute(
                "INSERT INTO items (
                    name,
                    type_id,
                    rarity_id,
                    location_id,
                    tier_id,
                    description,
                    image_path
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    item.name.as_str(),
                    item.type_id,
                    item.rarity_id,
                    item.location_id,
                    item.tier_id,
                    item.description.as_str(),
                    item.image_path.as_deref(),
                ],
            )
            .map_err(|err| map_write_error(err, &item.name))?;

            Ok(tx.last_insert_rowid())
        })?;

        info!("event=item_create module=repo status=ok item_id={id}");
        Ok(id)
    }

    fn update_item(&self, id: ItemId, draft: &ItemDraft) -> RepoResult<()> {
        draft.validate()?;
        let mut item = draft.normalized();
        let keep_image = draft
            .image_path
            .as_deref()
            .map_or(true, |path| path.trim().is_empty());

        let previous_image = self.unit_of_work(|tx| {
            let previous_image = image_path_of(tx, id)?.ok_or(RepoError::NotFound {
                entity: ITEM_ENTITY,
                id,
            })?;
            if keep_image {
                item.image_path = Some(previous_image.clone());
            }
            ensure_references_exist(tx, &item)?;
            if name_taken(tx, &item.name, Some(id))? {
                return Err(duplicate(&item.name));
            }

            tx.execute(
                "UPDATE items
                 SET
                    name = ?1,
                    type_id = ?2,
                    rarity_id = ?3,
                    location_id = ?4,
                    tier_id = ?5,
                    description = ?6,
                    image_path = ?7,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?8;",
                params![
                    item.name.as_str(),
                    item.type_id,
                    item.rarity_id,
                    item.location_id,
                    item.tier_id,
                    item.description.as_str(),
                    item.image_path.as_deref(),
                    id,
                ],
            )
            .map_err(|err| map_write_error(err, &item.name))?;

            Ok(previous_image)
        })?;

        if item.image_path.as_deref() != Some(previous_image.as_str()) {
            remove_image_best_effort(&previous_image, self.placeholder_image());
        }

        info!("event=item_update module=repo status=ok item_id={id}");
        Ok(())
    }

    fn delete_item(&self, id: ItemId) -> RepoResult<()> {
        let image_path = self.unit_of_work(|tx| {
            let image_path = image_path_of(tx, id)?.ok_or(RepoError::NotFound {
                entity: ITEM_ENTITY,
                id,
            })?;
            tx.execute("DELETE FROM items WHERE id = ?1;", [id])?;
            Ok(image_path)
        })?;

        remove_image_best_effort(&image_path, self.placeholder_image());
        info!("event=item_delete module=repo status=ok item_id={id}");
        Ok(())
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<ItemDetails>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("{ITEM_DETAILS_SELECT_SQL} WHERE i.id = ?1;"))?;
            let mut rows = stmt.query([id])?;
            if let Some(row) = rows.next()? {
                return Ok(Some(parse_item_row(row)?));
            }
            Ok(None)
        })
    }

    fn search_items(&self, filter: &ItemSearchFilter) -> RepoResult<Vec<ItemDetails>> {
        let mut sql = format!("{ITEM_DETAILS_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(text) = filter
            .name_contains
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
        {
            sql.push_str(" AND i.name LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(format!("%{}%", escape_like(text))));
        }

        for kind in ReferenceKind::ALL {
            let ids = filter.ids_for(kind);
            if ids.is_empty() {
                continue;
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND i.{} IN ({placeholders})", kind.item_column()));
            bind_values.extend(ids.iter().map(|id| Value::Integer(*id)));
        }

        sql.push_str(" ORDER BY i.name COLLATE NOCASE ASC, i.id ASC");

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            let mut items = Vec::new();
            while let Some(row) = rows.next()? {
                items.push(parse_item_row(row)?);
            }
            Ok(items)
        })
    }

    fn is_duplicate_name(&self, name: &str, exclude_id: Option<ItemId>) -> RepoResult<bool> {
        self.with_connection(|conn| name_taken(conn, name.trim(), exclude_id))
    }

    fn count_items(&self) -> RepoResult<u64> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM items;", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn count_items_with_rarity(&self, rarity_name: &str) -> RepoResult<u64> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*)
                 FROM items i
                 INNER JOIN rarities r ON i.rarity_id = r.id
                 WHERE r.name = ?1 COLLATE NOCASE;",
                [rarity_name.trim()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    fn placeholder_image(&self) -> &str {
        self.placeholder_image.as_str()
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<ItemDetails> {
    Ok(ItemDetails {
        id: row.get("id")?,
        name: row.get("name")?,
        type_id: row.get("type_id")?,
        type_name: row.get("type_name")?,
        rarity_id: row.get("rarity_id")?,
        rarity_name: row.get("rarity_name")?,
        rarity_color: row.get("rarity_color")?,
        rarity_icon: row.get("rarity_icon")?,
        location_id: row.get("location_id")?,
        location_name: row.get("location_name")?,
        tier_id: row.get("tier_id")?,
        tier_name: row.get("tier_name")?,
        description: row.get("description")?,
        image_path: row.get("image_path")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn ensure_references_exist(conn: &Connection, item: &ItemDraft) -> RepoResult<()> {
    for kind in ReferenceKind::ALL {
        let id = item.reference_id(kind);
        if !exists_by_id(conn, kind.table(), id)? {
            return Err(ValidationError::UnknownReference { kind, id }.into());
        }
    }
    Ok(())
}

fn name_taken(conn: &Connection, name: &str, exclude_id: Option<ItemId>) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM items
            WHERE name = ?1 COLLATE NOCASE
              AND (?2 IS NULL OR id != ?2)
        );",
        params![name, exclude_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn image_path_of(conn: &Connection, id: ItemId) -> RepoResult<Option<String>> {
    let path = conn
        .query_row("SELECT image_path FROM items WHERE id = ?1;", [id], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(path)
}

fn duplicate(name: &str) -> RepoError {
    RepoError::DuplicateName {
        entity: ITEM_ENTITY,
        name: name.to_string(),
    }
}

fn map_write_error(err: rusqlite::Error, name: &str) -> RepoError {
    if is_unique_violation(&err) {
        return duplicate(name);
    }
    if is_foreign_key_violation(&err) {
        return RepoError::InvalidData(format!(
            "item `{name}` references a row that no longer exists"
        ));
    }
    err.into()
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
