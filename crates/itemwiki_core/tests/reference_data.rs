mod common;

use common::{create, reference_id, seeded_repo};
use itemwiki_core::db::{open_db_in_memory, seed_defaults};
use itemwiki_core::model::reference::{DEFAULT_RARITY_COLOR, DEFAULT_RARITY_ICON};
use itemwiki_core::{
    ItemRepository, ReferenceDraft, ReferenceKind, ReferenceRepository, RepoError,
    SqliteCatalogRepository, ValidationError,
};
use std::time::Duration;

fn names(repo: &SqliteCatalogRepository, kind: ReferenceKind) -> Vec<String> {
    repo.list_references(kind)
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}

#[test]
fn seeded_listings_follow_display_order() {
    let repo = seeded_repo();

    assert_eq!(
        names(&repo, ReferenceKind::Rarity),
        vec!["Common", "Uncommon", "Rare", "Epic", "Legendary"]
    );
    assert_eq!(names(&repo, ReferenceKind::Tier), vec!["T1", "T2", "T3", "T4"]);
    // Drop locations have no display order and sort by name.
    assert_eq!(
        names(&repo, ReferenceKind::DropLocation),
        vec![
            "Dragon's Lair",
            "Fire Dungeon",
            "Mountain Peak",
            "Mystic Forest",
            "Thunder Tower"
        ]
    );
}

#[test]
fn rarity_defaults_apply_when_attributes_are_omitted() {
    let repo = seeded_repo();
    let id = repo
        .create_reference(&ReferenceDraft::new(ReferenceKind::Rarity, "Mythic"))
        .unwrap();

    let mythic = repo
        .get_reference(ReferenceKind::Rarity, id)
        .unwrap()
        .unwrap();
    assert_eq!(mythic.color.as_deref(), Some(DEFAULT_RARITY_COLOR));
    assert_eq!(mythic.icon.as_deref(), Some(DEFAULT_RARITY_ICON));
    assert_eq!(mythic.display_order, Some(0));
}

#[test]
fn duplicate_reference_names_are_rejected_ignoring_case() {
    let repo = seeded_repo();

    let err = repo
        .create_reference(&ReferenceDraft::new(ReferenceKind::ItemType, "weapon"))
        .unwrap_err();
    assert!(matches!(err, RepoError::DuplicateName { .. }));

    let armor = reference_id(&repo, ReferenceKind::ItemType, "Armor");
    let err = repo
        .update_reference(armor, &ReferenceDraft::new(ReferenceKind::ItemType, "WEAPON"))
        .unwrap_err();
    assert!(matches!(err, RepoError::DuplicateName { .. }));

    // Same name is free in another kind.
    repo.create_reference(&ReferenceDraft::new(ReferenceKind::DropLocation, "Weapon"))
        .unwrap();
}

#[test]
fn invalid_attributes_are_rejected_before_writing() {
    let repo = seeded_repo();

    let err = repo
        .create_reference(&ReferenceDraft::new(ReferenceKind::Rarity, "Mythic").with_color("red"))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::InvalidColor(_))
    ));
    assert!(repo
        .find_reference_by_name(ReferenceKind::Rarity, "Mythic")
        .unwrap()
        .is_none());
}

#[test]
fn update_renames_and_keeps_omitted_attributes() {
    let repo = seeded_repo();
    let epic = reference_id(&repo, ReferenceKind::Rarity, "Epic");

    repo.update_reference(
        epic,
        &ReferenceDraft::new(ReferenceKind::Rarity, " Heroic ").with_display_order(3),
    )
    .unwrap();

    let heroic = repo
        .get_reference(ReferenceKind::Rarity, epic)
        .unwrap()
        .unwrap();
    assert_eq!(heroic.name, "Heroic");
    assert_eq!(heroic.color.as_deref(), Some("#8e44ad"));

    let err = repo
        .update_reference(404, &ReferenceDraft::new(ReferenceKind::Rarity, "Nope"))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { id: 404, .. }));
}

#[test]
fn delete_reports_dependent_items_until_they_are_gone() {
    let repo = seeded_repo();
    let sword = create(&repo, "Iron Sword");
    create(&repo, "Bronze Sword");
    let common = reference_id(&repo, ReferenceKind::Rarity, "Common");

    assert_eq!(
        repo.count_dependent_items(ReferenceKind::Rarity, common)
            .unwrap(),
        2
    );
    let err = repo
        .delete_reference(ReferenceKind::Rarity, common)
        .unwrap_err();
    match err {
        RepoError::ReferentialIntegrity {
            kind,
            id,
            dependents,
        } => {
            assert_eq!(kind, ReferenceKind::Rarity);
            assert_eq!(id, common);
            assert_eq!(dependents, 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    repo.delete_item(sword).unwrap();
    assert_eq!(
        repo.count_dependent_items(ReferenceKind::Rarity, common)
            .unwrap(),
        1
    );

    let unused = reference_id(&repo, ReferenceKind::Rarity, "Legendary");
    repo.delete_reference(ReferenceKind::Rarity, unused).unwrap();
    assert!(matches!(
        repo.delete_reference(ReferenceKind::Rarity, unused)
            .unwrap_err(),
        RepoError::NotFound { .. }
    ));
}

#[test]
fn writes_through_the_repository_invalidate_the_cache() {
    let repo = seeded_repo();
    assert_eq!(names(&repo, ReferenceKind::Tier).len(), 4);

    repo.create_reference(&ReferenceDraft::new(ReferenceKind::Tier, "T5").with_display_order(4))
        .unwrap();
    assert_eq!(names(&repo, ReferenceKind::Tier).last().unwrap(), "T5");

    let t5 = reference_id(&repo, ReferenceKind::Tier, "t5");
    repo.delete_reference(ReferenceKind::Tier, t5).unwrap();
    assert_eq!(names(&repo, ReferenceKind::Tier).len(), 4);
}

#[test]
fn out_of_band_writes_stay_hidden_until_the_ttl_expires() {
    let mut conn = open_db_in_memory().unwrap();
    seed_defaults(&mut conn).unwrap();
    let cached = SqliteCatalogRepository::with_cache_ttl(conn, Duration::from_secs(3600));
    assert_eq!(names(&cached, ReferenceKind::ItemType).len(), 3);

    cached
        .with_connection(|conn| {
            conn.execute("INSERT INTO item_types (name) VALUES ('Rune');", [])?;
            Ok(())
        })
        .unwrap();
    assert_eq!(names(&cached, ReferenceKind::ItemType).len(), 3);

    cached.cache().invalidate_all();
    assert_eq!(names(&cached, ReferenceKind::ItemType).len(), 4);

    let mut conn = open_db_in_memory().unwrap();
    seed_defaults(&mut conn).unwrap();
    let uncached = SqliteCatalogRepository::with_cache_ttl(conn, Duration::ZERO);
    assert_eq!(names(&uncached, ReferenceKind::ItemType).len(), 3);
    uncached
        .with_connection(|conn| {
            conn.execute("INSERT INTO item_types (name) VALUES ('Rune');", [])?;
            Ok(())
        })
        .unwrap();
    assert_eq!(names(&uncached, ReferenceKind::ItemType).len(), 4);
}
