//! In-memory mock image store for testing.

use crate::ImageStore;
use aperture_core::{Image, ImageId, StorageError, WorkspaceId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// In-memory mock store.
///
/// Workspaces come into existence on first save (mirroring the
/// filesystem store, where the directory is created by the first
/// write); listing an unknown workspace fails with `NotFound`.
/// Failure-injection flags let tests simulate store outages during
/// listing or loading.
#[derive(Debug, Default)]
pub struct MockImageStore {
    workspaces: Arc<RwLock<HashMap<WorkspaceId, HashMap<ImageId, Image>>>>,
    fail_listing: AtomicBool,
    fail_next_load: AtomicBool,
    listing_calls: AtomicUsize,
    listing_delay_ms: AtomicU64,
}

impl MockImageStore {
    /// Create a new empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the storage location for a workspace without writing any
    /// image, so that listing it yields zero ids instead of `NotFound`.
    pub fn create_workspace(&self, workspace_id: WorkspaceId) {
        self.workspaces
            .write()
            .unwrap()
            .entry(workspace_id)
            .or_default();
    }

    /// Make every subsequent listing fail with an I/O error until
    /// cleared again.
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Make the next `load_image` call fail with an I/O error.
    pub fn set_fail_next_load(&self, fail: bool) {
        self.fail_next_load.store(fail, Ordering::SeqCst);
    }

    /// Artificial latency added to every listing, for tests that need
    /// a rebuild to stay in flight long enough to observe.
    pub fn set_listing_delay(&self, delay: Duration) {
        self.listing_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `list_image_ids` calls served so far.
    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    /// Remove all stored data.
    pub fn clear(&self) {
        self.workspaces.write().unwrap().clear();
    }

    /// Number of images stored for a workspace.
    pub fn image_count(&self, workspace_id: WorkspaceId) -> usize {
        self.workspaces
            .read()
            .unwrap()
            .get(&workspace_id)
            .map(|images| images.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ImageStore for MockImageStore {
    async fn list_image_ids(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<ImageId>, StorageError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let delay_ms = self.listing_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: format!("mock://{}", workspace_id),
                reason: "injected listing failure".to_string(),
            });
        }

        let workspaces = self.workspaces.read().unwrap();
        match workspaces.get(&workspace_id) {
            Some(images) => Ok(images.keys().copied().collect()),
            None => Err(StorageError::NotFound { workspace_id }),
        }
    }

    async fn load_image(
        &self,
        workspace_id: WorkspaceId,
        image_id: ImageId,
    ) -> Result<Image, StorageError> {
        if self.fail_next_load.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: format!("mock://{}/{}", workspace_id, image_id),
                reason: "injected load failure".to_string(),
            });
        }

        let workspaces = self.workspaces.read().unwrap();
        workspaces
            .get(&workspace_id)
            .and_then(|images| images.get(&image_id))
            .cloned()
            .ok_or(StorageError::Corrupt {
                path: format!("mock://{}/{}", workspace_id, image_id),
                reason: "record missing".to_string(),
            })
    }

    async fn save_image(&self, image: &Image) -> Result<(), StorageError> {
        self.workspaces
            .write()
            .unwrap()
            .entry(image.workspace_id)
            .or_default()
            .insert(image.image_id, image.clone());
        Ok(())
    }

    async fn workspace_exists(&self, workspace_id: WorkspaceId) -> bool {
        self.workspaces.read().unwrap().contains_key(&workspace_id)
    }
}
