//! Aperture Service - Image Operations
//!
//! The model layer tying the durable store and the workspace cache
//! together. Every mutation writes to the store first and notifies the
//! cache after; a cache problem therefore never fails a mutation, it
//! only costs a rebuild on the next read.

use aperture_core::{
    GroupId, Image, ImageId, MatchMode, NewImage, ServiceError, TagId, WorkspaceId,
    new_image_id, SEARCH_PAGE_SIZE,
};
use aperture_storage::{ImageCacheRegistry, ImageStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// SERVICE
// ============================================================================

/// Image operations over one store and its cache registry.
pub struct ImageService {
    store: Arc<dyn ImageStore>,
    cache: Arc<ImageCacheRegistry>,
}

impl ImageService {
    pub fn new(store: Arc<dyn ImageStore>, cache: Arc<ImageCacheRegistry>) -> Self {
        Self { store, cache }
    }

    /// Service with a default-configured cache over the given store.
    pub fn with_default_cache(store: Arc<dyn ImageStore>) -> Self {
        let cache = Arc::new(ImageCacheRegistry::with_defaults(Arc::clone(&store)));
        Self::new(store, cache)
    }

    /// The underlying cache registry, for read paths that want direct
    /// access to it.
    pub fn cache(&self) -> &Arc<ImageCacheRegistry> {
        &self.cache
    }

    /// Current state of an image, read through the cache.
    async fn current(
        &self,
        workspace_id: WorkspaceId,
        image_id: ImageId,
    ) -> Result<Image, ServiceError> {
        self.cache
            .query_image(workspace_id, image_id)
            .await?
            .ok_or(ServiceError::ImageNotFound { image_id })
    }

    /// Persist an updated image and fold the change into the cache.
    async fn commit_update(&self, previous: &Image, next: &Image) -> Result<(), ServiceError> {
        self.store.save_image(next).await?;
        self.cache.notify_updated(previous, next).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Creation and metadata
    // ------------------------------------------------------------------

    /// Create a new image record. The service assigns the id and the
    /// creation timestamp; the image starts ungrouped.
    pub async fn create_image(&self, new: NewImage) -> Result<Image, ServiceError> {
        let image = Image {
            image_id: new_image_id(),
            workspace_id: new.workspace_id,
            file_name: new.file_name,
            ext: new.ext,
            width: new.width,
            height: new.height,
            created_at: Utc::now(),
            tags: new.tags,
            group_id: None,
            is_group_thumbnail: false,
            group_sort: 0,
            author: new.author,
            memo: new.memo,
        };
        self.store.save_image(&image).await?;
        self.cache.notify_created(&image).await;
        debug!(workspace_id = %image.workspace_id, image_id = %image.image_id, "image created");
        Ok(image)
    }

    /// Patch the image's author and/or memo. `None` leaves a field
    /// untouched.
    pub async fn update_metadata(
        &self,
        workspace_id: WorkspaceId,
        image_id: ImageId,
        author: Option<String>,
        memo: Option<String>,
    ) -> Result<Image, ServiceError> {
        let previous = self.current(workspace_id, image_id).await?;
        let mut next = previous.clone();
        if let Some(author) = author {
            next.author = author;
        }
        if let Some(memo) = memo {
            next.memo = memo;
        }
        if next == previous {
            return Ok(previous);
        }
        self.commit_update(&previous, &next).await?;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Attach a tag to an image. Adding a tag the image already carries
    /// is a no-op.
    pub async fn add_tag(
        &self,
        workspace_id: WorkspaceId,
        image_id: ImageId,
        tag_id: TagId,
    ) -> Result<Image, ServiceError> {
        let previous = self.current(workspace_id, image_id).await?;
        let mut next = previous.clone();
        if !next.tags.insert(tag_id) {
            return Ok(previous);
        }
        self.commit_update(&previous, &next).await?;
        Ok(next)
    }

    /// Detach a tag from an image. Removing a tag the image does not
    /// carry is a no-op.
    pub async fn remove_tag(
        &self,
        workspace_id: WorkspaceId,
        image_id: ImageId,
        tag_id: TagId,
    ) -> Result<Image, ServiceError> {
        let previous = self.current(workspace_id, image_id).await?;
        let mut next = previous.clone();
        if !next.tags.remove(&tag_id) {
            return Ok(previous);
        }
        self.commit_update(&previous, &next).await?;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Grouping
    // ------------------------------------------------------------------

    /// Gather the given images into a fresh group. The first id becomes
    /// the group's thumbnail; sort positions follow the given order.
    ///
    /// Saves are sequential and not transactional: a store failure
    /// partway leaves earlier members grouped, and the error surfaces.
    pub async fn group_images(
        &self,
        workspace_id: WorkspaceId,
        image_ids: &[ImageId],
    ) -> Result<GroupId, ServiceError> {
        if image_ids.is_empty() {
            return Err(ServiceError::InvalidRequest {
                reason: "grouping requires at least one image".to_string(),
            });
        }
        let group_id = Uuid::now_v7();
        for (position, &image_id) in image_ids.iter().enumerate() {
            let previous = self.current(workspace_id, image_id).await?;
            let mut next = previous.clone();
            next.group_id = Some(group_id);
            next.is_group_thumbnail = position == 0;
            next.group_sort = position as u32 + 1;
            self.commit_update(&previous, &next).await?;
        }
        debug!(%workspace_id, %group_id, members = image_ids.len(), "group created");
        Ok(group_id)
    }

    /// Dissolve a group, returning its members to ungrouped.
    pub async fn ungroup(
        &self,
        workspace_id: WorkspaceId,
        group_id: GroupId,
    ) -> Result<(), ServiceError> {
        let members = self.cache.query_by_group(workspace_id, group_id).await?;
        if members.is_empty() {
            return Err(ServiceError::GroupNotFound { group_id });
        }
        for previous in members {
            let mut next = previous.clone();
            next.group_id = None;
            next.is_group_thumbnail = false;
            next.group_sort = 0;
            self.commit_update(&previous, &next).await?;
        }
        debug!(%workspace_id, %group_id, "group dissolved");
        Ok(())
    }

    /// Rewrite the sort positions of a group to match the given order.
    /// Every listed image must exist and all must belong to the same
    /// group; the list must cover the whole group.
    pub async fn reorder_group(
        &self,
        workspace_id: WorkspaceId,
        ordered_ids: &[ImageId],
    ) -> Result<(), ServiceError> {
        if ordered_ids.is_empty() {
            return Err(ServiceError::InvalidRequest {
                reason: "reorder requires at least one image".to_string(),
            });
        }

        let mut members = Vec::with_capacity(ordered_ids.len());
        for &image_id in ordered_ids {
            members.push(self.current(workspace_id, image_id).await?);
        }

        let group_id = match members[0].group_id {
            Some(group_id) => group_id,
            None => {
                return Err(ServiceError::InvalidRequest {
                    reason: format!("image {} is not grouped", members[0].image_id),
                })
            }
        };
        if members.iter().any(|m| m.group_id != Some(group_id)) {
            return Err(ServiceError::InvalidRequest {
                reason: "images belong to different groups".to_string(),
            });
        }
        let group_size = self
            .cache
            .query_by_group(workspace_id, group_id)
            .await?
            .len();
        if group_size != ordered_ids.len() {
            return Err(ServiceError::InvalidRequest {
                reason: format!(
                    "reorder lists {} of {} group members",
                    ordered_ids.len(),
                    group_size
                ),
            });
        }

        for (position, previous) in members.into_iter().enumerate() {
            let mut next = previous.clone();
            next.group_sort = position as u32 + 1;
            if next != previous {
                self.commit_update(&previous, &next).await?;
            }
        }
        Ok(())
    }

    /// Members of a group, ordered by their sort position. An unknown
    /// or empty group is an error, matching the read surface where a
    /// group only exists through its members.
    pub async fn group_members(
        &self,
        workspace_id: WorkspaceId,
        group_id: GroupId,
    ) -> Result<Vec<Image>, ServiceError> {
        let mut members = self.cache.query_by_group(workspace_id, group_id).await?;
        if members.is_empty() {
            return Err(ServiceError::GroupNotFound { group_id });
        }
        members.sort_by_key(|image| image.group_sort);
        Ok(members)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Search the workspace's images, newest first, paginated with
    /// 1-based pages of [`SEARCH_PAGE_SIZE`].
    ///
    /// With no tags this is the grouped listing (one representative per
    /// group). With tags, every image matching the tag predicate is
    /// returned, grouped or not.
    pub async fn search_images(
        &self,
        workspace_id: WorkspaceId,
        tags: &[TagId],
        match_mode: MatchMode,
        page: usize,
    ) -> Result<Vec<Image>, ServiceError> {
        if page == 0 {
            return Err(ServiceError::InvalidRequest {
                reason: "pages are numbered from 1".to_string(),
            });
        }

        let entry = match self.cache.get_or_build(workspace_id).await? {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };
        let guard = entry.read().await;

        let hits: Vec<Image> = if tags.is_empty() {
            guard.grouped_images()
        } else {
            guard
                .all_images()
                .into_iter()
                .filter(|image| match match_mode {
                    MatchMode::All => tags.iter().all(|tag| image.tags.contains(tag)),
                    MatchMode::Any => tags.iter().any(|tag| image.tags.contains(tag)),
                })
                .collect()
        };

        Ok(hits
            .into_iter()
            .skip((page - 1) * SEARCH_PAGE_SIZE)
            .take(SEARCH_PAGE_SIZE)
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aperture_test_utils::assertions;
    use aperture_test_utils::fixtures::{new_image, tagged_new_image};
    use aperture_test_utils::MockImageStore;

    fn service() -> (Arc<MockImageStore>, ImageService) {
        let store = Arc::new(MockImageStore::new());
        let service = ImageService::with_default_cache(Arc::clone(&store) as Arc<dyn ImageStore>);
        (store, service)
    }

    #[tokio::test]
    async fn test_create_persists_and_appears_in_listing() {
        let (store, service) = service();
        let workspace_id = Uuid::now_v7();

        let image = service.create_image(new_image(workspace_id)).await.unwrap();
        assert_eq!(store.image_count(workspace_id), 1);
        assert!(!image.is_grouped());

        let listing = service
            .search_images(workspace_id, &[], MatchMode::All, 1)
            .await
            .unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].image_id, image.image_id);
    }

    #[tokio::test]
    async fn test_update_metadata_patches_only_given_fields() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        let image = service.create_image(new_image(workspace_id)).await.unwrap();

        let updated = service
            .update_metadata(
                workspace_id,
                image.image_id,
                Some("ansel".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated.author, "ansel");
        assert_eq!(updated.memo, image.memo);

        let updated = service
            .update_metadata(workspace_id, image.image_id, None, Some("dusk".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.author, "ansel");
        assert_eq!(updated.memo, "dusk");
    }

    #[tokio::test]
    async fn test_update_unknown_image_is_not_found() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        service.create_image(new_image(workspace_id)).await.unwrap();

        let err = service
            .update_metadata(workspace_id, Uuid::now_v7(), Some("x".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ImageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_add_and_remove_tag_round_trip() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        let tag = Uuid::now_v7();
        let image = service.create_image(new_image(workspace_id)).await.unwrap();

        service
            .add_tag(workspace_id, image.image_id, tag)
            .await
            .unwrap();
        let hits = service
            .search_images(workspace_id, &[tag], MatchMode::All, 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        service
            .remove_tag(workspace_id, image.image_id, tag)
            .await
            .unwrap();
        let hits = service
            .search_images(workspace_id, &[tag], MatchMode::All, 1)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_add_existing_tag_is_noop() {
        let (store, service) = service();
        let workspace_id = Uuid::now_v7();
        let tag = Uuid::now_v7();
        let image = service
            .create_image(tagged_new_image(workspace_id, &[tag]))
            .await
            .unwrap();

        let unchanged = service
            .add_tag(workspace_id, image.image_id, tag)
            .await
            .unwrap();
        assert_eq!(unchanged, image);
        assert_eq!(store.image_count(workspace_id), 1);
    }

    #[tokio::test]
    async fn test_search_all_vs_any() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        let (red, blue) = (Uuid::now_v7(), Uuid::now_v7());

        service
            .create_image(tagged_new_image(workspace_id, &[red]))
            .await
            .unwrap();
        service
            .create_image(tagged_new_image(workspace_id, &[blue]))
            .await
            .unwrap();
        service
            .create_image(tagged_new_image(workspace_id, &[red, blue]))
            .await
            .unwrap();

        let both = service
            .search_images(workspace_id, &[red, blue], MatchMode::All, 1)
            .await
            .unwrap();
        assert_eq!(both.len(), 1);

        let either = service
            .search_images(workspace_id, &[red, blue], MatchMode::Any, 1)
            .await
            .unwrap();
        assert_eq!(either.len(), 3);
    }

    #[tokio::test]
    async fn test_search_pagination() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        for _ in 0..(SEARCH_PAGE_SIZE + 5) {
            service.create_image(new_image(workspace_id)).await.unwrap();
        }

        let first = service
            .search_images(workspace_id, &[], MatchMode::All, 1)
            .await
            .unwrap();
        assert_eq!(first.len(), SEARCH_PAGE_SIZE);

        let second = service
            .search_images(workspace_id, &[], MatchMode::All, 2)
            .await
            .unwrap();
        assert_eq!(second.len(), 5);

        let third = service
            .search_images(workspace_id, &[], MatchMode::All, 3)
            .await
            .unwrap();
        assert!(third.is_empty());

        let err = service
            .search_images(workspace_id, &[], MatchMode::All, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_group_images_collapses_listing() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        let a = service.create_image(new_image(workspace_id)).await.unwrap();
        let b = service.create_image(new_image(workspace_id)).await.unwrap();
        let c = service.create_image(new_image(workspace_id)).await.unwrap();

        let group_id = service
            .group_images(workspace_id, &[a.image_id, b.image_id])
            .await
            .unwrap();

        // Grouped listing shows the thumbnail plus the loose image.
        let listing = service
            .search_images(workspace_id, &[], MatchMode::All, 1)
            .await
            .unwrap();
        assert_eq!(listing.len(), 2);
        assert!(listing.iter().any(|i| i.image_id == a.image_id));
        assert!(listing.iter().any(|i| i.image_id == c.image_id));
        assertions::assert_all_representatives(&listing);
        assertions::assert_newest_first(&listing);

        let members = service.group_members(workspace_id, group_id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].image_id, a.image_id);
        assert!(members[0].is_group_thumbnail);
        assert_eq!(members[0].group_sort, 1);
        assert_eq!(members[1].image_id, b.image_id);
        assert!(!members[1].is_group_thumbnail);
        assert_eq!(members[1].group_sort, 2);
    }

    #[tokio::test]
    async fn test_ungroup_restores_flat_listing() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        let a = service.create_image(new_image(workspace_id)).await.unwrap();
        let b = service.create_image(new_image(workspace_id)).await.unwrap();

        let group_id = service
            .group_images(workspace_id, &[a.image_id, b.image_id])
            .await
            .unwrap();
        service.ungroup(workspace_id, group_id).await.unwrap();

        let listing = service
            .search_images(workspace_id, &[], MatchMode::All, 1)
            .await
            .unwrap();
        assert_eq!(listing.len(), 2);
        assert!(listing.iter().all(|i| !i.is_grouped()));

        let err = service.group_members(workspace_id, group_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::GroupNotFound { .. }));
    }

    #[tokio::test]
    async fn test_reorder_group_rewrites_sort_positions() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        let a = service.create_image(new_image(workspace_id)).await.unwrap();
        let b = service.create_image(new_image(workspace_id)).await.unwrap();
        let c = service.create_image(new_image(workspace_id)).await.unwrap();

        let group_id = service
            .group_images(workspace_id, &[a.image_id, b.image_id, c.image_id])
            .await
            .unwrap();

        service
            .reorder_group(workspace_id, &[c.image_id, a.image_id, b.image_id])
            .await
            .unwrap();

        let members = service.group_members(workspace_id, group_id).await.unwrap();
        let ids: Vec<ImageId> = members.iter().map(|m| m.image_id).collect();
        assert_eq!(ids, vec![c.image_id, a.image_id, b.image_id]);
        assert_eq!(members[0].group_sort, 1);
        // Thumbnail assignment does not move with the order.
        assert!(members[1].is_group_thumbnail);
    }

    #[tokio::test]
    async fn test_reorder_rejects_partial_and_mixed_lists() {
        let (_, service) = service();
        let workspace_id = Uuid::now_v7();
        let a = service.create_image(new_image(workspace_id)).await.unwrap();
        let b = service.create_image(new_image(workspace_id)).await.unwrap();
        let loose = service.create_image(new_image(workspace_id)).await.unwrap();

        service
            .group_images(workspace_id, &[a.image_id, b.image_id])
            .await
            .unwrap();

        let err = service
            .reorder_group(workspace_id, &[a.image_id])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));

        let err = service
            .reorder_group(workspace_id, &[a.image_id, loose.image_id])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_mutation_survives_cache_outage() {
        let (store, service) = service();
        let workspace_id = Uuid::now_v7();
        let image = service.create_image(new_image(workspace_id)).await.unwrap();
        let tag = Uuid::now_v7();

        // Storage keeps working while listings fail, so the next
        // mutation persists even though the cache cannot refresh.
        service.cache().destroy(workspace_id);
        store.set_fail_listing(true);
        let updated = service
            .search_images(workspace_id, &[], MatchMode::All, 1)
            .await;
        assert!(updated.is_err());

        store.set_fail_listing(false);
        service
            .add_tag(workspace_id, image.image_id, tag)
            .await
            .unwrap();
        let hits = service
            .search_images(workspace_id, &[tag], MatchMode::All, 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
