//! Aperture Test Utilities
//!
//! Centralized test infrastructure for the Aperture workspace:
//! - Proptest generators for images and identifiers
//! - An image builder for hand-written fixtures
//! - Pre-populated workspace fixtures
//! - Assertions for listing order

// Re-export mock storage from its source crate
pub use aperture_storage::MockImageStore;

// Re-export core types for convenience
pub use aperture_core::{
    new_image_id, GroupId, Image, ImageId, ImageOrdering, MatchMode, NewImage, NewestFirst,
    TagId, Timestamp, WorkspaceId,
};

use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

// ============================================================================
// IMAGE BUILDER
// ============================================================================

/// Fluent builder for image fixtures. Defaults to an ungrouped,
/// untagged image created now.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    image: Image,
}

impl ImageBuilder {
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            image: Image {
                image_id: new_image_id(),
                workspace_id,
                file_name: "fixture".to_string(),
                ext: "png".to_string(),
                width: 800,
                height: 600,
                created_at: Utc::now(),
                tags: BTreeSet::new(),
                group_id: None,
                is_group_thumbnail: false,
                group_sort: 0,
                author: String::new(),
                memo: String::new(),
            },
        }
    }

    pub fn id(mut self, image_id: ImageId) -> Self {
        self.image.image_id = image_id;
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.image.file_name = file_name.into();
        self
    }

    /// Shift the creation time into the past by the given seconds, so a
    /// sequence of builders gets distinct, ordered timestamps.
    pub fn age_secs(mut self, secs: i64) -> Self {
        self.image.created_at = Utc::now() - Duration::seconds(secs);
        self
    }

    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.image.created_at = created_at;
        self
    }

    pub fn tag(mut self, tag_id: TagId) -> Self {
        self.image.tags.insert(tag_id);
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = TagId>) -> Self {
        self.image.tags.extend(tags);
        self
    }

    pub fn in_group(mut self, group_id: GroupId, sort: u32) -> Self {
        self.image.group_id = Some(group_id);
        self.image.group_sort = sort;
        self
    }

    pub fn as_thumbnail(mut self) -> Self {
        self.image.is_group_thumbnail = true;
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.image.author = author.into();
        self
    }

    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.image.memo = memo.into();
        self
    }

    pub fn build(self) -> Image {
        self.image
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Aperture types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a valid UUIDv7 (timestamp-sortable).
    pub fn arb_uuid_v7() -> impl Strategy<Value = Uuid> {
        Just(()).prop_map(|_| Uuid::now_v7())
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }

    /// Generate a tag-set drawn from a small shared pool, so generated
    /// images overlap on tags often enough to exercise the indices.
    pub fn arb_tags(pool: Vec<TagId>) -> impl Strategy<Value = BTreeSet<TagId>> {
        prop::collection::vec(0..pool.len(), 0..=pool.len())
            .prop_map(move |picks| picks.into_iter().map(|i| pool[i]).collect())
    }

    /// Generate an ungrouped image in the given workspace.
    pub fn arb_image(
        workspace_id: WorkspaceId,
        tag_pool: Vec<TagId>,
    ) -> impl Strategy<Value = Image> {
        (arb_timestamp(), arb_tags(tag_pool), "[a-z]{1,12}").prop_map(
            move |(created_at, tags, file_name)| {
                ImageBuilder::new(workspace_id)
                    .created_at(created_at)
                    .tags(tags)
                    .file_name(file_name)
                    .build()
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built workspace populations.

    use super::*;

    /// A small pool of tag ids to share across fixture images.
    pub fn tag_pool(n: usize) -> Vec<TagId> {
        (0..n).map(|_| Uuid::now_v7()).collect()
    }

    /// A minimal creation payload for service tests.
    pub fn new_image(workspace_id: WorkspaceId) -> NewImage {
        NewImage {
            workspace_id,
            file_name: "shot".to_string(),
            ext: "png".to_string(),
            width: 1024,
            height: 768,
            tags: BTreeSet::new(),
            author: String::new(),
            memo: String::new(),
        }
    }

    /// Creation payload carrying the given tags.
    pub fn tagged_new_image(workspace_id: WorkspaceId, tags: &[TagId]) -> NewImage {
        let mut payload = new_image(workspace_id);
        payload.tags = tags.iter().copied().collect();
        payload
    }

    /// `count` ungrouped images with strictly decreasing ages, so index
    /// 0 is the newest.
    pub fn flat_workspace(workspace_id: WorkspaceId, count: usize) -> Vec<Image> {
        (0..count)
            .map(|i| {
                ImageBuilder::new(workspace_id)
                    .age_secs((i as i64 + 1) * 10)
                    .file_name(format!("img-{i}"))
                    .build()
            })
            .collect()
    }

    /// One group of `members` images (first is the thumbnail) plus one
    /// loose image newer than the whole group.
    pub fn grouped_workspace(workspace_id: WorkspaceId, members: usize) -> (GroupId, Vec<Image>) {
        let group_id = Uuid::now_v7();
        let mut images = vec![ImageBuilder::new(workspace_id).age_secs(5).build()];
        for i in 0..members {
            let mut builder = ImageBuilder::new(workspace_id)
                .age_secs((i as i64 + 2) * 10)
                .in_group(group_id, i as u32 + 1);
            if i == 0 {
                builder = builder.as_thumbnail();
            }
            images.push(builder.build());
        }
        (group_id, images)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions shared by cache and service tests.

    use super::*;

    /// Panic unless the listing is ordered newest first (ties broken by
    /// descending id).
    pub fn assert_newest_first(images: &[Image]) {
        let ordering = NewestFirst;
        for pair in images.windows(2) {
            assert!(
                ordering.cmp(&pair[0], &pair[1]) != std::cmp::Ordering::Greater,
                "listing out of order: {} before {}",
                pair[0].image_id,
                pair[1].image_id
            );
        }
    }

    /// Panic unless every image in the listing is a representative:
    /// ungrouped, or its group's thumbnail.
    pub fn assert_all_representatives(images: &[Image]) {
        for image in images {
            assert!(
                image.is_group_representative(),
                "non-representative {} in grouped listing",
                image.image_id
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
