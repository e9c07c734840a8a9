//! Catalog use-case service.
//!
//! # Responsibility
//! - Public, rate-limited browsing (search, list, view).
//! - Admin-only item, reference and import mutations.
//! - Image upload persistence around item writes.
//!
//! # Invariants
//! - Mutations require the `admin` role.
//! - An uploaded image stored for a write that then fails is removed again.

use crate::access::rate_limit::{
    CREATE_ITEM, DELETE_ITEM, PUBLIC_GET_ITEM_BY_ID, PUBLIC_SEARCH_ITEMS, PUBLIC_VIEW_ITEMS,
    UPDATE_ITEM,
};
use crate::access::{require_role, RateLimiter, Session};
use crate::import::{self, ImportReport};
use crate::media::{remove_image_best_effort, ImageStore, MediaError};
use crate::model::item::{ItemDetails, ItemDraft, ItemId};
use crate::model::reference::{ReferenceDraft, ReferenceEntry, ReferenceId, ReferenceKind};
use crate::model::role::Role;
use crate::repo::item_repo::{ItemRepository, ItemSearchFilter};
use crate::repo::reference_repo::ReferenceRepository;
use crate::repo::RepoError;
use crate::service::{ServiceError, ServiceResult};
use std::io::Read;
use std::sync::Arc;

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const LEGENDARY_RARITY: &str = "Legendary";

/// Raw upload as received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Sidebar counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardCounts {
    pub total_items: u64,
    pub legendary_items: u64,
    pub item_types: usize,
    pub rarities: usize,
    pub drop_locations: usize,
    pub tiers: usize,
}

pub struct CatalogService<R> {
    repo: R,
    limiter: Arc<RateLimiter>,
    images: Option<ImageStore>,
}

impl<R> CatalogService<R>
where
    R: ItemRepository + ReferenceRepository,
{
    /// Service with the default rate limits and no image directory. Uploads
    /// are rejected until [`CatalogService::with_image_store`] is called.
    pub fn new(repo: R) -> Self {
        Self::with_rate_limiter(repo, Arc::new(RateLimiter::default()))
    }

    pub fn with_rate_limiter(repo: R, limiter: Arc<RateLimiter>) -> Self {
        Self {
            repo,
            limiter,
            images: None,
        }
    }

    pub fn with_image_store(mut self, images: ImageStore) -> Self {
        self.images = Some(images);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn search_items(
        &self,
        session: &Session,
        filter: &ItemSearchFilter,
    ) -> ServiceResult<Vec<ItemDetails>> {
        self.limiter.check(session.id(), PUBLIC_SEARCH_ITEMS)?;
        Ok(self.repo.search_items(filter)?)
    }

    /// Every item, ordered by name.
    pub fn list_items(&self, session: &Session) -> ServiceResult<Vec<ItemDetails>> {
        self.limiter.check(session.id(), PUBLIC_VIEW_ITEMS)?;
        Ok(self.repo.search_items(&ItemSearchFilter::default())?)
    }

    pub fn get_item(&self, session: &Session, id: ItemId) -> ServiceResult<Option<ItemDetails>> {
        self.limiter.check(session.id(), PUBLIC_GET_ITEM_BY_ID)?;
        Ok(self.repo.get_item(id)?)
    }

    pub fn create_item(&self, session: &Session, draft: &ItemDraft) -> ServiceResult<ItemId> {
        self.create_item_with_image(session, draft, None)
    }

    /// # Contract
    /// - The upload is validated and stored before the insert.
    /// - On insert failure the stored upload is removed.
    pub fn create_item_with_image(
        &self,
        session: &Session,
        draft: &ItemDraft,
        upload: Option<&ImageUpload>,
    ) -> ServiceResult<ItemId> {
        require_role(session, ADMIN_ONLY, |_| {
            self.limiter.check(session.id(), CREATE_ITEM)?;
            let (draft, stored) = self.attach_upload(draft, upload)?;
            self.repo
                .create_item(&draft)
                .map_err(|err| self.discard_upload(stored.as_deref(), err.into()))
        })
    }

    pub fn update_item(
        &self,
        session: &Session,
        id: ItemId,
        draft: &ItemDraft,
    ) -> ServiceResult<()> {
        self.update_item_with_image(session, id, draft, None)
    }

    /// # Contract
    /// - A new upload replaces the previous image; the repository removes the
    ///   superseded file after the update commits.
    pub fn update_item_with_image(
        &self,
        session: &Session,
        id: ItemId,
        draft: &ItemDraft,
        upload: Option<&ImageUpload>,
    ) -> ServiceResult<()> {
        require_role(session, ADMIN_ONLY, |_| {
            self.limiter.check(session.id(), UPDATE_ITEM)?;
            let (draft, stored) = self.attach_upload(draft, upload)?;
            self.repo
                .update_item(id, &draft)
                .map_err(|err| self.discard_upload(stored.as_deref(), err.into()))
        })
    }

    pub fn delete_item(&self, session: &Session, id: ItemId) -> ServiceResult<()> {
        require_role(session, ADMIN_ONLY, |_| {
            self.limiter.check(session.id(), DELETE_ITEM)?;
            Ok(self.repo.delete_item(id)?)
        })
    }

    pub fn list_references(
        &self,
        _session: &Session,
        kind: ReferenceKind,
    ) -> ServiceResult<Vec<ReferenceEntry>> {
        Ok(self.repo.list_references(kind)?)
    }

    pub fn create_reference(
        &self,
        session: &Session,
        draft: &ReferenceDraft,
    ) -> ServiceResult<ReferenceId> {
        require_role(session, ADMIN_ONLY, |_| {
            Ok(self.repo.create_reference(draft)?)
        })
    }

    pub fn update_reference(
        &self,
        session: &Session,
        id: ReferenceId,
        draft: &ReferenceDraft,
    ) -> ServiceResult<()> {
        require_role(session, ADMIN_ONLY, |_| {
            Ok(self.repo.update_reference(id, draft)?)
        })
    }

    pub fn delete_reference(
        &self,
        session: &Session,
        kind: ReferenceKind,
        id: ReferenceId,
    ) -> ServiceResult<()> {
        require_role(session, ADMIN_ONLY, |_| {
            Ok(self.repo.delete_reference(kind, id)?)
        })
    }

    pub fn import_items(&self, session: &Session, input: impl Read) -> ServiceResult<ImportReport> {
        require_role(session, ADMIN_ONLY, |_| {
            Ok(import::import_items(&self.repo, input)?)
        })
    }

    pub fn dashboard(&self, _session: &Session) -> ServiceResult<DashboardCounts> {
        Ok(DashboardCounts {
            total_items: self.repo.count_items()?,
            legendary_items: self.repo.count_items_with_rarity(LEGENDARY_RARITY)?,
            item_types: self.repo.list_references(ReferenceKind::ItemType)?.len(),
            rarities: self.repo.list_references(ReferenceKind::Rarity)?.len(),
            drop_locations: self.repo.list_references(ReferenceKind::DropLocation)?.len(),
            tiers: self.repo.list_references(ReferenceKind::Tier)?.len(),
        })
    }

    /// Stores `upload` (if any) and points the draft at it. Returns the
    /// stored path so a failed write can remove it.
    fn attach_upload(
        &self,
        draft: &ItemDraft,
        upload: Option<&ImageUpload>,
    ) -> ServiceResult<(ItemDraft, Option<String>)> {
        let Some(upload) = upload else {
            return Ok((draft.clone(), None));
        };
        // Validation failures must not reach the filesystem.
        draft.validate().map_err(RepoError::from)?;

        let store = self.images.as_ref().ok_or(MediaError::StoreNotConfigured)?;
        let stored = store
            .save_upload(&upload.filename, &upload.bytes)?
            .to_string_lossy()
            .into_owned();
        Ok((draft.clone().with_image_path(stored.clone()), Some(stored)))
    }

    fn discard_upload(&self, stored: Option<&str>, err: ServiceError) -> ServiceError {
        if let Some(path) = stored {
            remove_image_best_effort(path, self.repo.placeholder_image());
        }
        err
    }
}
