#![allow(dead_code)]

use itemwiki_core::db::{open_db_in_memory, seed_defaults};
use itemwiki_core::{
    ItemDraft, ItemId, ItemRepository, ReferenceId, ReferenceKind, ReferenceRepository,
    SqliteCatalogRepository,
};

/// In-memory repository with the default reference rows.
pub fn seeded_repo() -> SqliteCatalogRepository {
    let mut conn = open_db_in_memory().unwrap();
    seed_defaults(&mut conn).unwrap();
    SqliteCatalogRepository::new(conn)
}

pub fn empty_repo() -> SqliteCatalogRepository {
    SqliteCatalogRepository::new(open_db_in_memory().unwrap())
}

pub fn reference_id(
    repo: &SqliteCatalogRepository,
    kind: ReferenceKind,
    name: &str,
) -> ReferenceId {
    repo.find_reference_by_name(kind, name)
        .unwrap()
        .unwrap_or_else(|| panic!("missing {} `{name}`", kind.label()))
        .id
}

/// Draft pointing at seeded references by name.
pub fn draft(
    repo: &SqliteCatalogRepository,
    name: &str,
    item_type: &str,
    rarity: &str,
    location: &str,
    tier: &str,
) -> ItemDraft {
    ItemDraft::new(
        name,
        reference_id(repo, ReferenceKind::ItemType, item_type),
        reference_id(repo, ReferenceKind::Rarity, rarity),
        reference_id(repo, ReferenceKind::DropLocation, location),
        reference_id(repo, ReferenceKind::Tier, tier),
    )
}

pub fn create(repo: &SqliteCatalogRepository, name: &str) -> ItemId {
    let draft = draft(repo, name, "Weapon", "Common", "Fire Dungeon", "T1");
    repo.create_item(&draft).unwrap()
}

/// Smallest byte sequence the image validator accepts as a PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes
}
