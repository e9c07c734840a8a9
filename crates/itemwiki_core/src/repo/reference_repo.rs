//! Reference data repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - CRUD over `item_types`, `rarities`, `drop_locations` and `tiers`.
//! - Serve ordered listings through the repository-owned TTL cache.
//!
//! # Invariants
//! - A reference row is deleted only when no item points at it; dependents
//!   are counted first and the store's `RESTRICT` key is the backstop.
//! - The cache entry for a kind is dropped after every write to its table.

use crate::model::reference::{ReferenceDraft, ReferenceEntry, ReferenceId, ReferenceKind};
use crate::repo::{
    exists_by_id, is_foreign_key_violation, is_unique_violation, RepoError, RepoResult,
    SqliteCatalogRepository,
};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

/// Repository interface for reference data.
pub trait ReferenceRepository {
    /// Ordered listing for one kind (display order first where the kind has one).
    fn list_references(&self, kind: ReferenceKind) -> RepoResult<Vec<ReferenceEntry>>;
    fn get_reference(
        &self,
        kind: ReferenceKind,
        id: ReferenceId,
    ) -> RepoResult<Option<ReferenceEntry>>;
    /// Case-insensitive name lookup.
    fn find_reference_by_name(
        &self,
        kind: ReferenceKind,
        name: &str,
    ) -> RepoResult<Option<ReferenceEntry>>;
    fn create_reference(&self, draft: &ReferenceDraft) -> RepoResult<ReferenceId>;
    /// Replaces the name and any attributes present in `draft`.
    fn update_reference(&self, id: ReferenceId, draft: &ReferenceDraft) -> RepoResult<()>;
    fn delete_reference(&self, kind: ReferenceKind, id: ReferenceId) -> RepoResult<()>;
    fn count_dependent_items(&self, kind: ReferenceKind, id: ReferenceId) -> RepoResult<u64>;
}

impl ReferenceRepository for SqliteCatalogRepository {
    fn list_references(&self, kind: ReferenceKind) -> RepoResult<Vec<ReferenceEntry>> {
        if let Some(cached) = self.cache().get(kind) {
            return Ok(cached.as_ref().clone());
        }

        let generation = self.cache().generation(kind);
        let listing = self.with_connection(|conn| load_references(conn, kind))?;
        Ok(self.cache().put(kind, generation, listing).as_ref().clone())
    }

    fn get_reference(
        &self,
        kind: ReferenceKind,
        id: ReferenceId,
    ) -> RepoResult<Option<ReferenceEntry>> {
        Ok(self
            .list_references(kind)?
            .into_iter()
            .find(|entry| entry.id == id))
    }

    fn find_reference_by_name(
        &self,
        kind: ReferenceKind,
        name: &str,
    ) -> RepoResult<Option<ReferenceEntry>> {
        let needle = name.trim().to_lowercase();
        Ok(self
            .list_references(kind)?
            .into_iter()
            .find(|entry| entry.name.to_lowercase() == needle))
    }

    fn create_reference(&self, draft: &ReferenceDraft) -> RepoResult<ReferenceId> {
        draft.validate()?;
        let draft = draft.normalized();
        let kind = draft.kind;

        let result = self.unit_of_work(|tx| {
            if reference_name_taken(tx, kind, &draft.name, None)? {
                return Err(duplicate(kind, &draft.name));
            }

            let (columns, values) = column_values(&draft);
            let placeholders = vec!["?"; columns.len()].join(", ");
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders});",
                    kind.table(),
                    columns.join(", ")
                ),
                params_from_iter(values),
            )
            .map_err(|err| map_write_error(err, kind, &draft.name))?;

            Ok(tx.last_insert_rowid())
        });
        self.cache().invalidate(kind);

        let id = result?;
        info!(
            "event=reference_create module=repo status=ok kind={} id={id}",
            kind.as_str()
        );
        Ok(id)
    }

    fn update_reference(&self, id: ReferenceId, draft: &ReferenceDraft) -> RepoResult<()> {
        draft.validate()?;
        let draft = draft.normalized();
        let kind = draft.kind;

        let result = self.unit_of_work(|tx| {
            if !exists_by_id(tx, kind.table(), id)? {
                return Err(not_found(kind, id));
            }
            if reference_name_taken(tx, kind, &draft.name, Some(id))? {
                return Err(duplicate(kind, &draft.name));
            }

            let (columns, mut values) = column_values(&draft);
            let assignments = columns
                .iter()
                .map(|column| format!("{column} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            values.push(Value::Integer(id));

            tx.execute(
                &format!("UPDATE {} SET {assignments} WHERE id = ?;", kind.table()),
                params_from_iter(values),
            )
            .map_err(|err| map_write_error(err, kind, &draft.name))?;
            Ok(())
        });
        self.cache().invalidate(kind);

        result?;
        info!(
            "event=reference_update module=repo status=ok kind={} id={id}",
            kind.as_str()
        );
        Ok(())
    }

    fn delete_reference(&self, kind: ReferenceKind, id: ReferenceId) -> RepoResult<()> {
        let result = self.unit_of_work(|tx| {
            if !exists_by_id(tx, kind.table(), id)? {
                return Err(not_found(kind, id));
            }

            let dependents = count_dependents(tx, kind, id)?;
            if dependents > 0 {
                return Err(RepoError::ReferentialIntegrity {
                    kind,
                    id,
                    dependents,
                });
            }

            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1;", kind.table()),
                [id],
            )
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    RepoError::ReferentialIntegrity {
                        kind,
                        id,
                        dependents: 0,
                    }
                } else {
                    err.into()
                }
            })?;
            Ok(())
        });
        self.cache().invalidate(kind);

        result?;
        info!(
            "event=reference_delete module=repo status=ok kind={} id={id}",
            kind.as_str()
        );
        Ok(())
    }

    fn count_dependent_items(&self, kind: ReferenceKind, id: ReferenceId) -> RepoResult<u64> {
        self.with_connection(|conn| count_dependents(conn, kind, id))
    }
}

fn select_columns(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::ItemType | ReferenceKind::Tier => {
            "id, name, display_order, NULL AS color, NULL AS icon, NULL AS description, created_at"
        }
        ReferenceKind::Rarity => {
            "id, name, display_order, color, icon, NULL AS description, created_at"
        }
        ReferenceKind::DropLocation => {
            "id, name, NULL AS display_order, NULL AS color, NULL AS icon, description, created_at"
        }
    }
}

fn load_references(conn: &Connection, kind: ReferenceKind) -> RepoResult<Vec<ReferenceEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} ORDER BY {};",
        select_columns(kind),
        kind.table(),
        kind.list_order()
    ))?;
    let mut rows = stmt.query([])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(parse_reference_row(row, kind)?);
    }
    Ok(entries)
}

fn parse_reference_row(row: &Row<'_>, kind: ReferenceKind) -> RepoResult<ReferenceEntry> {
    Ok(ReferenceEntry {
        id: row.get("id")?,
        kind,
        name: row.get("name")?,
        display_order: row.get("display_order")?,
        color: row.get("color")?,
        icon: row.get("icon")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
    })
}

/// Column names and bind values for the name plus every attribute set on
/// `draft`. Omitted attributes keep their table default (or current value).
fn column_values(draft: &ReferenceDraft) -> (Vec<&'static str>, Vec<Value>) {
    let mut columns = vec!["name"];
    let mut values = vec![Value::Text(draft.name.clone())];

    if let Some(order) = draft.display_order {
        columns.push("display_order");
        values.push(Value::Integer(order));
    }
    if let Some(color) = draft.color.as_ref() {
        columns.push("color");
        values.push(Value::Text(color.clone()));
    }
    if let Some(icon) = draft.icon.as_ref() {
        columns.push("icon");
        values.push(Value::Text(icon.clone()));
    }
    if let Some(description) = draft.description.as_ref() {
        columns.push("description");
        values.push(Value::Text(description.clone()));
    }

    (columns, values)
}

fn reference_name_taken(
    conn: &Connection,
    kind: ReferenceKind,
    name: &str,
    exclude_id: Option<ReferenceId>,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!(
            "SELECT EXISTS(
                SELECT 1
                FROM {}
                WHERE name = ?1 COLLATE NOCASE
                  AND (?2 IS NULL OR id != ?2)
            );",
            kind.table()
        ),
        params![name, exclude_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn count_dependents(conn: &Connection, kind: ReferenceKind, id: ReferenceId) -> RepoResult<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM items WHERE {} = ?1;", kind.item_column()),
        [id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn duplicate(kind: ReferenceKind, name: &str) -> RepoError {
    RepoError::DuplicateName {
        entity: kind.label(),
        name: name.to_string(),
    }
}

fn not_found(kind: ReferenceKind, id: ReferenceId) -> RepoError {
    RepoError::NotFound {
        entity: kind.label(),
        id,
    }
}

fn map_write_error(err: rusqlite::Error, kind: ReferenceKind, name: &str) -> RepoError {
    if is_unique_violation(&err) {
        return duplicate(kind, name);
    }
    err.into()
}
