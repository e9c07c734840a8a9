mod common;

use common::{create, draft, png_bytes, seeded_repo};
use itemwiki_core::access::rate_limit::{CREATE_ITEM, PUBLIC_SEARCH_ITEMS};
use itemwiki_core::access::RateLimit;
use itemwiki_core::{
    AccessError, CatalogService, ImageStore, ImageUpload, ItemRepository, ItemSearchFilter,
    MediaError, RateLimiter, ReferenceDraft, ReferenceKind, Role, ServiceError, Session,
    SqliteCatalogRepository,
};
use std::sync::Arc;

fn admin() -> Session {
    Session::authenticated("admin", "Administrator", Role::Admin)
}

fn viewer() -> Session {
    Session::authenticated("guest", "Guest", Role::Viewer)
}

fn service_with(limiter: RateLimiter) -> CatalogService<SqliteCatalogRepository> {
    CatalogService::with_rate_limiter(seeded_repo(), Arc::new(limiter))
}

#[test]
fn unauthenticated_delete_is_rejected_without_side_effects() {
    let service = CatalogService::new(seeded_repo());
    let id = create(service.repository(), "Iron Sword");

    let err = service.delete_item(&Session::anonymous(), id).unwrap_err();
    assert!(matches!(err, ServiceError::Access(AccessError::Unauthorized)));
    assert!(service.repository().get_item(id).unwrap().is_some());
}

#[test]
fn viewer_cannot_mutate_catalog() {
    let service = CatalogService::new(seeded_repo());
    let id = create(service.repository(), "Iron Sword");
    let session = viewer();

    let err = service.delete_item(&session, id).unwrap_err();
    match err {
        ServiceError::Access(AccessError::Forbidden { role, required }) => {
            assert_eq!(role, Role::Viewer);
            assert_eq!(required, vec![Role::Admin]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let draft = draft(
        service.repository(),
        "Bronze Sword",
        "Weapon",
        "Common",
        "Fire Dungeon",
        "T1",
    );
    assert!(service.create_item(&session, &draft).is_err());
    assert!(service
        .create_reference(&session, &ReferenceDraft::new(ReferenceKind::Tier, "T9"))
        .is_err());
    assert!(service
        .import_items(&session, "name,type,rarity,drop_location,tier\n".as_bytes())
        .is_err());

    assert_eq!(service.repository().count_items().unwrap(), 1);
}

#[test]
fn admin_can_run_the_full_item_lifecycle() {
    let service = CatalogService::new(seeded_repo());
    let session = admin();
    let draft = draft(
        service.repository(),
        "Iron Sword",
        "Weapon",
        "Common",
        "Fire Dungeon",
        "T1",
    );

    let id = service.create_item(&session, &draft).unwrap();
    service
        .update_item(&session, id, &draft.clone().with_description("sharp"))
        .unwrap();
    let item = service.get_item(&session, id).unwrap().unwrap();
    assert_eq!(item.description, "sharp");

    service.delete_item(&session, id).unwrap();
    assert!(service.get_item(&session, id).unwrap().is_none());
}

#[test]
fn public_reads_need_no_login_but_are_rate_limited_per_session() {
    let service = service_with(
        RateLimiter::unlimited().with_limit(PUBLIC_SEARCH_ITEMS, RateLimit::per_minute(2)),
    );
    create(service.repository(), "Iron Sword");
    let first = Session::anonymous();
    let second = Session::anonymous();
    let filter = ItemSearchFilter::default();

    assert_eq!(service.search_items(&first, &filter).unwrap().len(), 1);
    service.search_items(&first, &filter).unwrap();
    let err = service.search_items(&first, &filter).unwrap_err();
    match err {
        ServiceError::Access(AccessError::RateLimited {
            action,
            retry_after_secs,
        }) => {
            assert_eq!(action, PUBLIC_SEARCH_ITEMS);
            assert!(retry_after_secs >= 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Another session has its own window.
    service.search_items(&second, &filter).unwrap();
}

#[test]
fn rate_limited_creates_do_not_write() {
    let service =
        service_with(RateLimiter::unlimited().with_limit(CREATE_ITEM, RateLimit::per_minute(1)));
    let session = admin();
    let repo = service.repository();

    service
        .create_item(
            &session,
            &draft(repo, "Iron Sword", "Weapon", "Common", "Fire Dungeon", "T1"),
        )
        .unwrap();
    let err = service
        .create_item(
            &session,
            &draft(repo, "Bronze Sword", "Weapon", "Common", "Fire Dungeon", "T1"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Access(AccessError::RateLimited { .. })
    ));
    assert_eq!(repo.count_items().unwrap(), 1);
}

#[test]
fn forbidden_calls_do_not_spend_rate_budget() {
    let service =
        service_with(RateLimiter::unlimited().with_limit(CREATE_ITEM, RateLimit::per_minute(1)));
    let session = viewer();
    let repo = service.repository();
    let draft = draft(repo, "Iron Sword", "Weapon", "Common", "Fire Dungeon", "T1");

    for _ in 0..3 {
        let err = service.create_item(&session, &draft).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Access(AccessError::Forbidden { .. })
        ));
    }

    let promoted = session.logout().login_as(admin().user().unwrap().clone());
    service.create_item(&promoted, &draft).unwrap();
}

#[test]
fn uploads_are_validated_stored_and_cleaned_up_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    let service =
        CatalogService::new(seeded_repo()).with_image_store(ImageStore::new(images.clone()));
    let session = admin();
    let repo = service.repository();
    let sword = draft(repo, "Iron Sword", "Weapon", "Common", "Fire Dungeon", "T1");

    let upload = ImageUpload {
        filename: "sword.PNG".to_string(),
        bytes: png_bytes(64, 64),
    };
    let id = service
        .create_item_with_image(&session, &sword, Some(&upload))
        .unwrap();
    let stored = repo.get_item(id).unwrap().unwrap().image_path;
    assert!(stored.ends_with(".png"));
    assert!(std::path::Path::new(&stored).starts_with(&images));
    assert_eq!(std::fs::read_dir(&images).unwrap().count(), 1);

    // Same name again: the insert fails and the second file is removed.
    let err = service
        .create_item_with_image(&session, &sword, Some(&upload))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Repo(_)));
    assert_eq!(std::fs::read_dir(&images).unwrap().count(), 1);

    let oversized = ImageUpload {
        filename: "huge.png".to_string(),
        bytes: png_bytes(4000, 10),
    };
    let shield = draft(repo, "Big Shield", "Armor", "Rare", "Mountain Peak", "T2");
    let err = service
        .create_item_with_image(&session, &shield, Some(&oversized))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Media(MediaError::DimensionsTooLarge { .. })
    ));
    assert_eq!(repo.count_items().unwrap(), 1);

    // Replacing the image removes the superseded file after the update.
    let replacement = ImageUpload {
        filename: "sword-v2.png".to_string(),
        bytes: png_bytes(32, 32),
    };
    service
        .update_item_with_image(&session, id, &sword, Some(&replacement))
        .unwrap();
    let replaced = repo.get_item(id).unwrap().unwrap().image_path;
    assert_ne!(replaced, stored);
    assert!(!std::path::Path::new(&stored).exists());
    assert!(std::path::Path::new(&replaced).exists());
}

#[test]
fn uploads_without_an_image_directory_are_rejected() {
    let service = CatalogService::new(seeded_repo());
    let session = admin();
    let repo = service.repository();
    let sword = draft(repo, "Iron Sword", "Weapon", "Common", "Fire Dungeon", "T1");
    let upload = ImageUpload {
        filename: "sword.png".to_string(),
        bytes: png_bytes(16, 16),
    };

    let err = service
        .create_item_with_image(&session, &sword, Some(&upload))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Media(MediaError::StoreNotConfigured)
    ));
    assert_eq!(repo.count_items().unwrap(), 0);

    // Writes without an upload still work.
    service
        .create_item_with_image(&session, &sword, None)
        .unwrap();
    assert_eq!(repo.count_items().unwrap(), 1);
}

#[test]
fn configured_placeholder_file_survives_item_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let placeholder = dir.path().join("none.png");
    std::fs::write(&placeholder, png_bytes(1, 1)).unwrap();
    let placeholder = placeholder.to_string_lossy().into_owned();

    let repo = seeded_repo().with_placeholder_image(placeholder.clone());
    assert_eq!(repo.placeholder_image(), placeholder);
    let service = CatalogService::new(repo)
        .with_image_store(ImageStore::new(dir.path().join("images")));
    let session = admin();
    let repo = service.repository();

    let sword = draft(repo, "Iron Sword", "Weapon", "Common", "Fire Dungeon", "T1")
        .with_image_path(placeholder.clone());
    let id = service.create_item(&session, &sword).unwrap();
    service.delete_item(&session, id).unwrap();

    assert!(std::path::Path::new(&placeholder).exists());
}

#[test]
fn dashboard_counts_items_and_reference_rows() {
    let service = CatalogService::new(seeded_repo());
    let repo = service.repository();
    repo.create_item(&draft(repo, "Sun Blade", "Weapon", "Legendary", "Fire Dungeon", "T4"))
        .unwrap();
    create(repo, "Iron Sword");

    let counts = service.dashboard(&Session::anonymous()).unwrap();
    assert_eq!(counts.total_items, 2);
    assert_eq!(counts.legendary_items, 1);
    assert_eq!(counts.item_types, 3);
    assert_eq!(counts.rarities, 5);
    assert_eq!(counts.drop_locations, 5);
    assert_eq!(counts.tiers, 4);
}
