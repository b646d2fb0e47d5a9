//! Aperture Storage - Durable Store Trait and Index Cache
//!
//! Defines the storage abstraction for image records plus the
//! per-workspace index cache built on top of it. The cache is a derived
//! view: the store is always authoritative, and any cache entry that
//! cannot be trusted is destroyed and rebuilt on next access.

pub mod cache;
pub mod fs_store;
pub mod mock;

pub use fs_store::FsImageStore;
pub use mock::MockImageStore;

// Re-export cache types for service integration
pub use cache::{CacheConfig, CacheEntry, ImageCacheRegistry};

use ::async_trait::async_trait;
use aperture_core::{Image, ImageId, StorageError, WorkspaceId};

/// Async durable store for image records.
///
/// One record per image, partitioned per workspace. Implementations
/// must treat a workspace without a storage location as `NotFound` on
/// listing, which the cache interprets as "zero images" rather than a
/// failure.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// List all image record ids in a workspace.
    ///
    /// Fails with `StorageError::NotFound` if the workspace has no
    /// storage location yet, and with other variants on real I/O
    /// failure.
    async fn list_image_ids(&self, workspace_id: WorkspaceId)
        -> Result<Vec<ImageId>, StorageError>;

    /// Load one image record by id.
    async fn load_image(
        &self,
        workspace_id: WorkspaceId,
        image_id: ImageId,
    ) -> Result<Image, StorageError>;

    /// Persist an image record, replacing any prior version.
    async fn save_image(&self, image: &Image) -> Result<(), StorageError>;

    /// Whether the workspace has a storage location. Never fails;
    /// errors are reported as `false`.
    async fn workspace_exists(&self, workspace_id: WorkspaceId) -> bool;
}
