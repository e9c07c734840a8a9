//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//! - Carry rows from the pre-normalization `items` layout into the current one.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Every step is safe to re-run except the legacy rename, which is guarded
//!   by inspecting the existing `items` layout.
//! - The legacy backfill only reads rows renamed by the same migration run. A
//!   leftover backup table from an earlier tool is never replayed.
//! - Timestamps are stored as epoch milliseconds. Tables created by earlier
//!   tools with text `TIMESTAMP` values are converted during migration.

use crate::db::{column_declared_type, table_exists, table_has_column, DbError, DbResult};
use crate::media::PLACEHOLDER_IMAGE_PATH;
use crate::model::reference::{DEFAULT_RARITY_COLOR, DEFAULT_RARITY_ICON};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

/// Table the legacy denormalized `items` table is renamed to.
pub const LEGACY_BACKUP_TABLE: &str = "items_old_backup";

/// Holding name for a normalized `items` table that is being rebuilt.
const REBUILD_SOURCE_TABLE: &str = "items_rebuild_source";

const REFERENCE_TABLES: &[&str] = &["item_types", "rarities", "drop_locations", "tiers"];

/// Name prefixes the legacy layout used to smuggle reference rows into `items`.
const LEGACY_MARKER_PREFIXES: &[&str] = &["[TYPE]", "[RARITY]", "[LOCATION]", "[TIER]"];

type MigrationFn = fn(&Transaction<'_>) -> rusqlite::Result<()>;

#[derive(Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    apply: MigrationFn,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "reference_tables",
        apply: migrate_reference_tables,
    },
    Migration {
        version: 2,
        name: "normalized_items",
        apply: migrate_normalized_items,
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Reads the schema version currently recorded in the database.
pub fn current_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Applies all pending migrations on the provided connection.
///
/// All pending steps share one transaction: if any step fails nothing is
/// committed and `user_version` keeps its previous value.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current = current_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }

        (migration.apply)(&tx)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(())
}

fn migrate_reference_tables(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(include_str!("0001_reference_tables.sql"))?;
    normalize_reference_rows(tx)
}

/// Fills attributes that older reference tables left nullable and converts
/// text timestamps. Runs in place: items still point at these rows.
fn normalize_reference_rows(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let mut converted = 0usize;
    for table in REFERENCE_TABLES {
        converted += tx.execute(
            &format!(
                "UPDATE {table}
                 SET created_at = {}
                 WHERE typeof(created_at) != 'integer';",
                epoch_millis_sql("created_at")
            ),
            [],
        )?;
    }
    for table in ["item_types", "rarities", "tiers"] {
        tx.execute(
            &format!("UPDATE {table} SET display_order = 0 WHERE display_order IS NULL;"),
            [],
        )?;
    }
    tx.execute(
        "UPDATE rarities SET color = ?1 WHERE color IS NULL;",
        [DEFAULT_RARITY_COLOR],
    )?;
    tx.execute(
        "UPDATE rarities SET icon = ?1 WHERE icon IS NULL;",
        [DEFAULT_RARITY_ICON],
    )?;

    if converted > 0 {
        info!("event=db_migrate module=db status=ok action=reference_timestamps converted={converted}");
    }
    Ok(())
}

fn migrate_normalized_items(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let renamed_legacy = table_exists(tx, "items")? && !table_has_column(tx, "items", "type_id")?;
    if renamed_legacy {
        tx.execute_batch(&format!("ALTER TABLE items RENAME TO {LEGACY_BACKUP_TABLE};"))?;
        info!("event=db_migrate module=db status=ok action=legacy_rename table={LEGACY_BACKUP_TABLE}");
    }

    let rebuild = !renamed_legacy && table_exists(tx, "items")? && !has_epoch_timestamps(tx)?;
    if rebuild {
        tx.execute_batch(&format!("ALTER TABLE items RENAME TO {REBUILD_SOURCE_TABLE};"))?;
        // Indexes follow a renamed table; drop them so the new table gets its own.
        drop_indexes(tx, REBUILD_SOURCE_TABLE)?;
    }

    tx.execute_batch(include_str!("0002_items.sql"))?;

    if rebuild {
        rebuild_items(tx)?;
    }
    if renamed_legacy {
        backfill_legacy_items(tx)?;
    }
    Ok(())
}

fn has_epoch_timestamps(tx: &Transaction<'_>) -> rusqlite::Result<bool> {
    let declared = column_declared_type(tx, "items", "created_at")?;
    Ok(declared.is_some_and(|ty| ty.eq_ignore_ascii_case("INTEGER")))
}

fn drop_indexes(tx: &Transaction<'_>, table: &str) -> rusqlite::Result<()> {
    let names = {
        let mut stmt = tx.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL;",
        )?;
        let rows = stmt.query_map([table], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for name in names {
        tx.execute_batch(&format!("DROP INDEX IF EXISTS \"{name}\";"))?;
    }
    Ok(())
}

/// Copies a normalized `items` table with text timestamps into the current
/// layout, keeping ids. Rows with dangling references or a name that already
/// exists (ignoring case) are dropped.
fn rebuild_items(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let total: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM {REBUILD_SOURCE_TABLE};"),
        [],
        |row| row.get(0),
    )?;
    let copied = tx.execute(
        &format!(
            "INSERT OR IGNORE INTO items (
                id,
                name,
                type_id,
                rarity_id,
                location_id,
                tier_id,
                description,
                image_path,
                created_at,
                updated_at
            )
            SELECT
                id,
                TRIM(name),
                type_id,
                rarity_id,
                location_id,
                tier_id,
                COALESCE(description, ''),
                COALESCE(NULLIF(image_path, ''), ?1),
                {},
                {}
            FROM {REBUILD_SOURCE_TABLE}
            WHERE type_id IN (SELECT id FROM item_types)
              AND rarity_id IN (SELECT id FROM rarities)
              AND location_id IN (SELECT id FROM drop_locations)
              AND tier_id IN (SELECT id FROM tiers)
            ORDER BY id ASC;",
            epoch_millis_sql("created_at"),
            epoch_millis_sql("updated_at"),
        ),
        [PLACEHOLDER_IMAGE_PATH],
    )?;
    tx.execute_batch(&format!("DROP TABLE {REBUILD_SOURCE_TABLE};"))?;

    let skipped = usize::try_from(total).unwrap_or(0).saturating_sub(copied);
    info!(
        "event=db_migrate module=db status=ok action=items_rebuild copied={} skipped={}",
        copied, skipped
    );
    Ok(())
}

/// SQL expression converting `column` to epoch milliseconds. Integers are
/// kept; text is parsed as a SQLite datetime; anything else becomes now.
fn epoch_millis_sql(column: &str) -> String {
    format!(
        "CASE typeof({column})
            WHEN 'integer' THEN {column}
            ELSE COALESCE(
                CAST(strftime('%s', {column}) AS INTEGER) * 1000,
                CAST(strftime('%s', 'now') AS INTEGER) * 1000
            )
        END"
    )
}

struct LegacyItem {
    id: i64,
    name: Option<String>,
    type_name: Option<String>,
    rarity_name: Option<String>,
    location_name: Option<String>,
    tier_name: Option<String>,
    description: Option<String>,
    image_path: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

/// Copies rows from the just-renamed legacy table into normalized `items`.
///
/// Reference names that do not exist yet are created. Marker rows and rows
/// whose name already exists (ignoring case) are skipped.
fn backfill_legacy_items(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let legacy_rows = {
        let mut stmt = tx.prepare(&format!(
            "SELECT
                id,
                name,
                type,
                rarity,
                drop_location,
                tier,
                description,
                image_path,
                CAST(created_at AS TEXT),
                CAST(updated_at AS TEXT)
             FROM {LEGACY_BACKUP_TABLE}
             ORDER BY id ASC;"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(LegacyItem {
                id: row.get(0)?,
                name: row.get(1)?,
                type_name: row.get(2)?,
                rarity_name: row.get(3)?,
                location_name: row.get(4)?,
                tier_name: row.get(5)?,
                description: row.get(6)?,
                image_path: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut migrated = 0usize;
    let mut skipped = 0usize;
    for legacy in &legacy_rows {
        let Some(name) = legacy.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            skipped += 1;
            continue;
        };
        if LEGACY_MARKER_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            continue;
        }

        let (Some(type_name), Some(rarity_name), Some(location_name), Some(tier_name)) = (
            legacy.type_name.as_deref(),
            legacy.rarity_name.as_deref(),
            legacy.location_name.as_deref(),
            legacy.tier_name.as_deref(),
        ) else {
            warn!(
                "event=db_migrate module=db status=skip action=legacy_backfill legacy_id={} reason=missing_reference",
                legacy.id
            );
            skipped += 1;
            continue;
        };

        let type_id = ensure_reference(tx, "item_types", type_name)?;
        let rarity_id = ensure_reference(tx, "rarities", rarity_name)?;
        let location_id = ensure_reference(tx, "drop_locations", location_name)?;
        let tier_id = ensure_reference(tx, "tiers", tier_name)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO items (
                id,
                name,
                type_id,
                rarity_id,
                location_id,
                tier_id,
                description,
                image_path,
                created_at,
                updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                COALESCE(?7, ''),
                COALESCE(NULLIF(?8, ''), ?9),
                COALESCE(CAST(strftime('%s', ?10) AS INTEGER) * 1000, strftime('%s', 'now') * 1000),
                COALESCE(CAST(strftime('%s', ?11) AS INTEGER) * 1000, strftime('%s', 'now') * 1000)
            );",
            params![
                legacy.id,
                name,
                type_id,
                rarity_id,
                location_id,
                tier_id,
                legacy.description.as_deref(),
                legacy.image_path.as_deref(),
                PLACEHOLDER_IMAGE_PATH,
                legacy.created_at.as_deref(),
                legacy.updated_at.as_deref(),
            ],
        )?;
        if inserted == 1 {
            migrated += 1;
        } else {
            skipped += 1;
        }
    }

    info!(
        "event=db_migrate module=db status=ok action=legacy_backfill migrated={} skipped={}",
        migrated, skipped
    );
    Ok(())
}

fn ensure_reference(tx: &Transaction<'_>, table: &str, name: &str) -> rusqlite::Result<i64> {
    let name = name.trim();
    let existing: Option<i64> = tx
        .query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1;"),
            [name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    tx.execute(&format!("INSERT INTO {table} (name) VALUES (?1);"), [name])?;
    Ok(tx.last_insert_rowid())
}
