use itemwiki_core::db::migrations::{latest_version, LEGACY_BACKUP_TABLE};
use itemwiki_core::db::{open_db, open_db_in_memory, seed_defaults, DbError};
use itemwiki_core::media::PLACEHOLDER_IMAGE_PATH;
use itemwiki_core::{
    ItemRepository, ItemSearchFilter, ReferenceKind, ReferenceRepository, SqliteCatalogRepository,
};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in ["item_types", "rarities", "drop_locations", "tiers", "items"] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("item_wiki.db");

    let mut conn_first = open_db(&path).unwrap();
    seed_defaults(&mut conn_first).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let mut conn_second = open_db(&path).unwrap();
    seed_defaults(&mut conn_second).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_eq!(count_rows(&conn_second, "rarities"), 5);
    assert_eq!(count_rows(&conn_second, "tiers"), 4);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn foreign_keys_are_enforced_on_opened_connections() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);
}

#[test]
fn legacy_items_table_is_renamed_and_backfilled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            type TEXT,
            rarity TEXT,
            drop_location TEXT,
            tier TEXT,
            description TEXT,
            image_path TEXT,
            created_at TIMESTAMP,
            updated_at TIMESTAMP
        );
        INSERT INTO items (name, type, rarity, drop_location, tier, description, image_path, created_at, updated_at)
        VALUES
            ('Iron Sword', 'Weapon', 'Common', 'Fire Dungeon', 'T1', 'Plain blade', '', '2024-01-02 03:04:05', '2024-01-02 03:04:05'),
            ('[TYPE] Weapon', 'Weapon', NULL, NULL, NULL, NULL, NULL, NULL, NULL),
            ('iron sword', 'Weapon', 'Common', 'Fire Dungeon', 'T1', NULL, NULL, NULL, NULL),
            ('Broken Shield', 'Armor', 'Common', 'Fire Dungeon', NULL, NULL, NULL, NULL, NULL),
            ('Sky Ring', 'accessory', 'Rare', 'Mountain Peak', 'T3', NULL, 'assets/images/sky.png', NULL, NULL);",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, LEGACY_BACKUP_TABLE);
    assert_eq!(count_rows(&conn, LEGACY_BACKUP_TABLE), 5);
    assert_eq!(count_rows(&conn, "items"), 2);

    let repo = SqliteCatalogRepository::new(conn);
    let items = repo.search_items(&ItemSearchFilter::default()).unwrap();
    let names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["Iron Sword", "Sky Ring"]);

    let sword = &items[0];
    assert_eq!(sword.type_name, "Weapon");
    assert_eq!(sword.description, "Plain blade");
    assert_eq!(sword.image_path, PLACEHOLDER_IMAGE_PATH);
    assert_eq!(sword.created_at, 1_704_164_645_000);
    assert_eq!(items[1].image_path, "assets/images/sky.png");

    // Reference names are created on demand during backfill.
    let accessory = repo
        .find_reference_by_name(ReferenceKind::ItemType, "ACCESSORY")
        .unwrap()
        .unwrap();
    assert_eq!(accessory.name, "accessory");
}

#[test]
fn reopening_migrated_legacy_database_does_not_duplicate_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY,
            name TEXT,
            type TEXT,
            rarity TEXT,
            drop_location TEXT,
            tier TEXT,
            description TEXT,
            image_path TEXT,
            created_at TEXT,
            updated_at TEXT
        );
        INSERT INTO items (name, type, rarity, drop_location, tier)
        VALUES ('Iron Sword', 'Weapon', 'Common', 'Fire Dungeon', 'T1');",
    )
    .unwrap();
    drop(conn);

    drop(open_db(&path).unwrap());
    let conn = open_db(&path).unwrap();
    assert_eq!(count_rows(&conn, "items"), 1);
    assert_eq!(count_rows(&conn, "item_types"), 1);
}

#[test]
fn failed_migration_rolls_back_every_pending_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blocked.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, type TEXT);
        CREATE TABLE items_old_backup (id INTEGER PRIMARY KEY, name TEXT);
        INSERT INTO items (name, type) VALUES ('Iron Sword', 'Weapon');",
    )
    .unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    assert!(matches!(err, DbError::Sqlite(_)), "unexpected error: {err}");

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), 0);
    assert!(!table_exists(&conn, "item_types"));
    assert!(!table_has_column(&conn, "items", "type_id"));
    assert_eq!(count_rows(&conn, "items"), 1);
}

/// Layout written by the earlier catalog tool: its own `schema_version`
/// table, text timestamps, nullable attributes and a leftover backup table.
const PREVIOUS_TOOL_SCHEMA: &str = "
    CREATE TABLE schema_version (
        version INTEGER PRIMARY KEY,
        applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    INSERT INTO schema_version (version) VALUES (2);

    CREATE TABLE item_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        display_order INTEGER DEFAULT 0,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE rarities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        color TEXT DEFAULT '#808080',
        icon TEXT DEFAULT '⚪',
        display_order INTEGER DEFAULT 0,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE drop_locations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        description TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE tiers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        display_order INTEGER DEFAULT 0,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    INSERT INTO item_types (name, display_order) VALUES ('Weapon', 0);
    INSERT INTO rarities (name, color, icon, display_order) VALUES ('Common', NULL, NULL, NULL);
    INSERT INTO drop_locations (name) VALUES ('Fire Dungeon');
    INSERT INTO tiers (name, display_order, created_at) VALUES ('T1', 0, '2024-01-02 03:04:05');

    CREATE TABLE items_old_backup (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        type TEXT,
        rarity TEXT,
        drop_location TEXT,
        tier TEXT,
        description TEXT,
        image_path TEXT,
        created_at TIMESTAMP,
        updated_at TIMESTAMP
    );
    INSERT INTO items_old_backup (name, type, rarity, drop_location, tier)
    VALUES ('Old Blade', 'Weapon', 'Common', 'Fire Dungeon', 'T1');

    CREATE TABLE items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        type_id INTEGER NOT NULL,
        rarity_id INTEGER NOT NULL,
        location_id INTEGER NOT NULL,
        tier_id INTEGER NOT NULL,
        description TEXT,
        image_path TEXT DEFAULT 'assets/images/placeholder.png',
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (type_id) REFERENCES item_types(id) ON DELETE RESTRICT,
        FOREIGN KEY (rarity_id) REFERENCES rarities(id) ON DELETE RESTRICT,
        FOREIGN KEY (location_id) REFERENCES drop_locations(id) ON DELETE RESTRICT,
        FOREIGN KEY (tier_id) REFERENCES tiers(id) ON DELETE RESTRICT
    );
    CREATE INDEX idx_items_name ON items(name);
    CREATE INDEX idx_items_type ON items(type_id);
    CREATE INDEX idx_items_rarity ON items(rarity_id);
    INSERT INTO items (id, name, type_id, rarity_id, location_id, tier_id, description, image_path, created_at, updated_at)
    VALUES (7, 'Iron Sword', 1, 1, 1, 1, NULL, NULL, '2024-01-02 03:04:05', '2024-01-02 03:04:05');
";

#[test]
fn database_from_previous_tool_is_converted_without_replaying_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("item_wiki.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(PREVIOUS_TOOL_SCHEMA).unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    // The leftover backup is kept but not copied back in.
    assert_eq!(count_rows(&conn, LEGACY_BACKUP_TABLE), 1);
    assert_eq!(count_rows(&conn, "items"), 1);
    assert!(!table_exists(&conn, "items_rebuild_source"));
    for index in ["idx_items_name", "idx_items_name_nocase", "idx_items_tier"] {
        let table: String = conn
            .query_row(
                "SELECT tbl_name FROM sqlite_master WHERE type = 'index' AND name = ?1;",
                [index],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table, "items", "index `{index}`");
    }

    let repo = SqliteCatalogRepository::new(conn);
    let items = repo.search_items(&ItemSearchFilter::default()).unwrap();
    assert_eq!(items.len(), 1);
    let sword = &items[0];
    assert_eq!(sword.id, 7);
    assert_eq!(sword.name, "Iron Sword");
    assert_eq!(sword.description, "");
    assert_eq!(sword.image_path, PLACEHOLDER_IMAGE_PATH);
    assert_eq!(sword.created_at, 1_704_164_645_000);
    assert_eq!(sword.updated_at, 1_704_164_645_000);
    assert_eq!(sword.rarity_color, "#808080");
    assert_eq!(sword.rarity_icon, "⚪");

    let tiers = repo.list_references(ReferenceKind::Tier).unwrap();
    assert_eq!(tiers[0].created_at, 1_704_164_645_000);
    let rarities = repo.list_references(ReferenceKind::Rarity).unwrap();
    assert_eq!(rarities[0].display_order, Some(0));

    // Deleted items stay deleted across reopen.
    repo.delete_item(sword.id).unwrap();
    drop(repo);
    let conn = open_db(&path).unwrap();
    assert_eq!(count_rows(&conn, "items"), 0);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn table_exists(conn: &Connection, table_name: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table_name],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        == 1
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> bool {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2;",
            [table, column],
            |row| row.get(0),
        )
        .unwrap();
    count == 1
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "expected table `{table_name}`");
}
