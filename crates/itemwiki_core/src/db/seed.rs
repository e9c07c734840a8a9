//! Default reference data for fresh installations.

use super::DbResult;
use log::info;
use rusqlite::{params, Connection};

const DEFAULT_ITEM_TYPES: &[&str] = &["Weapon", "Armor", "Accessory"];

const DEFAULT_RARITIES: &[(&str, &str, &str)] = &[
    ("Common", "#808080", "⚪"),
    ("Uncommon", "#27ae60", "🟢"),
    ("Rare", "#2980b9", "🔵"),
    ("Epic", "#8e44ad", "🟣"),
    ("Legendary", "#f39c12", "🟡"),
];

const DEFAULT_LOCATIONS: &[&str] = &[
    "Fire Dungeon",
    "Mystic Forest",
    "Mountain Peak",
    "Thunder Tower",
    "Dragon's Lair",
];

const DEFAULT_TIERS: &[&str] = &["T1", "T2", "T3", "T4"];

/// Inserts the default reference rows. Existing names are left untouched, so
/// calling this repeatedly is safe.
pub fn seed_defaults(conn: &mut Connection) -> DbResult<()> {
    let tx = conn.transaction()?;

    for (order, name) in DEFAULT_ITEM_TYPES.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO item_types (name, display_order) VALUES (?1, ?2);",
            params![name, order as i64],
        )?;
    }

    for (order, (name, color, icon)) in DEFAULT_RARITIES.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO rarities (name, color, icon, display_order)
             VALUES (?1, ?2, ?3, ?4);",
            params![name, color, icon, order as i64],
        )?;
    }

    for name in DEFAULT_LOCATIONS {
        tx.execute(
            "INSERT OR IGNORE INTO drop_locations (name) VALUES (?1);",
            [name],
        )?;
    }

    for (order, name) in DEFAULT_TIERS.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO tiers (name, display_order) VALUES (?1, ?2);",
            params![name, order as i64],
        )?;
    }

    tx.commit()?;
    info!("event=db_seed module=db status=ok");
    Ok(())
}
