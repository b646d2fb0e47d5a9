//! Aperture Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types, errors, and the ordering seam -
//! no storage or cache logic.

pub mod error;
pub mod ordering;

pub use error::{ApertureError, ApertureResult, CacheError, ServiceError, StorageError};
pub use ordering::{ImageOrdering, NewestFirst};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Workspace identifier. A workspace is the tenant boundary: all cache
/// state and durable storage are partitioned strictly per workspace.
pub type WorkspaceId = Uuid;

/// Image identifier, unique within a workspace.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type ImageId = Uuid;

/// Tag identifier. Tag-id validation lives outside this core.
pub type TagId = Uuid;

/// Group identifier. A group is a cluster of related images; one member
/// may be flagged as the group's thumbnail.
pub type GroupId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 image id (timestamp-sortable).
pub fn new_image_id() -> ImageId {
    Uuid::now_v7()
}

// ============================================================================
// IMAGE RECORD
// ============================================================================

/// Image - one durable record, owned canonically by the image store.
///
/// The cache holds one copy per id; every derived index references the
/// image by its id, so replacing the canonical copy is sufficient to
/// keep all id-based views correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub image_id: ImageId,
    pub workspace_id: WorkspaceId,
    /// Original upload file name, without extension.
    pub file_name: String,
    /// File extension, e.g. "jpg".
    pub ext: String,
    pub width: u32,
    pub height: u32,
    pub created_at: Timestamp,
    /// Unordered tag-set. BTreeSet keeps serialized records stable.
    pub tags: BTreeSet<TagId>,
    /// None = ungrouped.
    pub group_id: Option<GroupId>,
    /// Meaningful only when `group_id` is Some.
    pub is_group_thumbnail: bool,
    /// 1-based sort position within the group; 0 when ungrouped.
    pub group_sort: u32,
    pub author: String,
    pub memo: String,
}

impl Image {
    /// Whether this image belongs to a group.
    pub fn is_grouped(&self) -> bool {
        self.group_id.is_some()
    }

    /// Whether this image appears in the grouped (collapsed) listing:
    /// ungrouped images always do, grouped ones only as their group's
    /// thumbnail.
    pub fn is_group_representative(&self) -> bool {
        self.group_id.is_none() || self.is_group_thumbnail
    }
}

/// Payload for creating a new image record. The service layer fills in
/// the id and creation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImage {
    pub workspace_id: WorkspaceId,
    pub file_name: String,
    pub ext: String,
    pub width: u32,
    pub height: u32,
    pub tags: BTreeSet<TagId>,
    pub author: String,
    pub memo: String,
}

// ============================================================================
// SEARCH
// ============================================================================

/// How a multi-tag search combines its tag predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMode {
    /// Image must carry every requested tag.
    All,
    /// Image must carry at least one requested tag.
    Any,
}

/// Page size for paginated image listings.
pub const SEARCH_PAGE_SIZE: usize = 100;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_image(group_id: Option<GroupId>, is_thumbnail: bool) -> Image {
        Image {
            image_id: new_image_id(),
            workspace_id: Uuid::now_v7(),
            file_name: "photo".to_string(),
            ext: "jpg".to_string(),
            width: 1920,
            height: 1080,
            created_at: Utc::now(),
            tags: BTreeSet::new(),
            group_id,
            is_group_thumbnail: is_thumbnail,
            group_sort: 0,
            author: String::new(),
            memo: String::new(),
        }
    }

    #[test]
    fn test_new_image_id_is_v7() {
        let id = new_image_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_image_ids_are_sortable() {
        let id1 = new_image_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = new_image_id();
        // UUIDv7 should be lexicographically sortable by time
        assert!(id1.to_string() < id2.to_string());
    }

    #[test]
    fn test_ungrouped_image_is_representative() {
        let image = make_image(None, false);
        assert!(!image.is_grouped());
        assert!(image.is_group_representative());
    }

    #[test]
    fn test_grouped_thumbnail_is_representative() {
        let image = make_image(Some(Uuid::now_v7()), true);
        assert!(image.is_grouped());
        assert!(image.is_group_representative());
    }

    #[test]
    fn test_grouped_non_thumbnail_is_not_representative() {
        let image = make_image(Some(Uuid::now_v7()), false);
        assert!(!image.is_group_representative());
    }

    #[test]
    fn test_image_round_trips_through_json() {
        let mut image = make_image(Some(Uuid::now_v7()), true);
        image.tags.insert(Uuid::now_v7());
        image.tags.insert(Uuid::now_v7());

        let json = serde_json::to_string(&image).unwrap();
        let back: Image = serde_json::from_str(&json).unwrap();
        assert_eq!(image, back);
    }
}
