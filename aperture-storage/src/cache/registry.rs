//! Workspace cache registry: lookup, lazy rebuild, and lifecycle.

use crate::cache::entry::CacheEntry;
use crate::cache::{maintain, rebuild};
use crate::ImageStore;
use aperture_core::{
    CacheError, GroupId, Image, ImageOrdering, NewestFirst, TagId, WorkspaceId,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Tuning knobs for the cache registry.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on how long a full rebuild may spend talking to the
    /// store before it is abandoned with a timeout error.
    pub rebuild_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            rebuild_timeout: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    pub fn with_rebuild_timeout(mut self, timeout: Duration) -> Self {
        self.rebuild_timeout = timeout;
        self
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Shared handle to one workspace's warm cache entry.
pub type SharedEntry = Arc<RwLock<CacheEntry>>;

/// Registry of per-workspace cache entries.
///
/// A workspace with no entry is *cold*; the first read builds its entry
/// from the store. Concurrent cold reads of the same workspace are
/// coalesced so only one rebuild hits the store. The rebuild itself runs
/// on a detached task, so a caller that gives up waiting does not abort
/// a rebuild other callers are sharing.
pub struct ImageCacheRegistry {
    entries: Arc<DashMap<WorkspaceId, SharedEntry>>,
    builds: DashMap<WorkspaceId, Arc<Mutex<()>>>,
    store: Arc<dyn ImageStore>,
    ordering: Arc<dyn ImageOrdering>,
    config: CacheConfig,
}

impl ImageCacheRegistry {
    pub fn new(
        store: Arc<dyn ImageStore>,
        ordering: Arc<dyn ImageOrdering>,
        config: CacheConfig,
    ) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            builds: DashMap::new(),
            store,
            ordering,
            config,
        }
    }

    /// Registry with the default ordering (newest first) and config.
    pub fn with_defaults(store: Arc<dyn ImageStore>) -> Self {
        Self::new(store, Arc::new(NewestFirst), CacheConfig::default())
    }

    /// Whether a warm entry currently exists for the workspace. Never
    /// touches the store.
    pub fn exists(&self, workspace_id: WorkspaceId) -> bool {
        self.entries.contains_key(&workspace_id)
    }

    /// Drop the workspace's entry, returning it to cold. Idempotent.
    ///
    /// Also releases the workspace's build lock; any rebuild already in
    /// flight keeps its own handle to it.
    pub fn destroy(&self, workspace_id: WorkspaceId) {
        self.builds.remove(&workspace_id);
        if self.entries.remove(&workspace_id).is_some() {
            info!(%workspace_id, "destroyed cache entry");
        }
    }

    /// Alias for [`destroy`](Self::destroy); reads as intent at call
    /// sites that drop an entry because its contents can no longer be
    /// trusted rather than because the workspace went away.
    pub fn invalidate(&self, workspace_id: WorkspaceId) {
        self.destroy(workspace_id);
    }

    fn build_lock(&self, workspace_id: WorkspaceId) -> Arc<Mutex<()>> {
        self.builds
            .entry(workspace_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn build_lock_count(&self) -> usize {
        self.builds.len()
    }

    /// Return the workspace's entry, building it from the store if the
    /// workspace is cold.
    ///
    /// `Ok(None)` means the store has no such workspace. On any rebuild
    /// failure the workspace stays cold and the error is returned; a
    /// later call starts over from the store.
    pub async fn get_or_build(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<SharedEntry>, CacheError> {
        if let Some(entry) = self.entries.get(&workspace_id) {
            return Ok(Some(Arc::clone(&entry)));
        }

        let build_lock = self.build_lock(workspace_id);
        let guard = build_lock.lock_owned().await;

        // Another caller may have finished the rebuild while we waited.
        if let Some(entry) = self.entries.get(&workspace_id) {
            return Ok(Some(Arc::clone(&entry)));
        }

        let store = Arc::clone(&self.store);
        let ordering = Arc::clone(&self.ordering);
        let entries = Arc::clone(&self.entries);
        let timeout = self.config.rebuild_timeout;

        // The publish must not depend on this caller staying around, so
        // the rebuild runs on its own task holding the single-flight
        // guard until it either publishes or fails.
        let handle = tokio::spawn(async move {
            let _guard = guard;
            match rebuild::rebuild_entry(store.as_ref(), ordering.as_ref(), workspace_id, timeout)
                .await
            {
                Ok(Some(entry)) => {
                    let images = entry.len();
                    let shared = Arc::new(RwLock::new(entry));
                    entries.insert(workspace_id, Arc::clone(&shared));
                    info!(%workspace_id, images, "cache entry built");
                    Ok(Some(shared))
                }
                Ok(None) => {
                    entries.remove(&workspace_id);
                    debug!(%workspace_id, "workspace absent from store, staying cold");
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        });

        let result = handle.await.unwrap_or_else(|_| {
            Err(CacheError::Inconsistent {
                workspace_id,
                reason: "rebuild task panicked".to_string(),
            })
        });

        // A workspace with no backing storage keeps no state here at
        // all, build lock included.
        if matches!(result, Ok(None)) {
            self.builds.remove(&workspace_id);
        }
        result
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Grouped listing of the workspace: every ungrouped image plus one
    /// representative per group, in display order. Absent workspaces
    /// read as empty.
    pub async fn query_all(&self, workspace_id: WorkspaceId) -> Result<Vec<Image>, CacheError> {
        match self.get_or_build(workspace_id).await? {
            Some(entry) => Ok(entry.read().await.grouped_images()),
            None => Ok(Vec::new()),
        }
    }

    /// Every image carrying the tag, in display order.
    pub async fn query_by_tag(
        &self,
        workspace_id: WorkspaceId,
        tag_id: TagId,
    ) -> Result<Vec<Image>, CacheError> {
        match self.get_or_build(workspace_id).await? {
            Some(entry) => Ok(entry.read().await.images_for_tag(tag_id)),
            None => Ok(Vec::new()),
        }
    }

    /// Every member of the group, in display order.
    pub async fn query_by_group(
        &self,
        workspace_id: WorkspaceId,
        group_id: GroupId,
    ) -> Result<Vec<Image>, CacheError> {
        match self.get_or_build(workspace_id).await? {
            Some(entry) => Ok(entry.read().await.images_for_group(group_id)),
            None => Ok(Vec::new()),
        }
    }

    /// Single image lookup by id.
    pub async fn query_image(
        &self,
        workspace_id: WorkspaceId,
        image_id: aperture_core::ImageId,
    ) -> Result<Option<Image>, CacheError> {
        match self.get_or_build(workspace_id).await? {
            Some(entry) => Ok(entry.read().await.get(image_id).cloned()),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Fold a newly persisted image into the workspace's entry.
    ///
    /// Never fails: the durable write already succeeded, so any trouble
    /// here invalidates the entry and lets the next read rebuild.
    pub async fn notify_created(&self, image: &Image) {
        let workspace_id = image.workspace_id;

        if !self.exists(workspace_id) {
            // Cold workspace: the store already holds the new image, so
            // a plain rebuild picks it up.
            if let Err(err) = self.get_or_build(workspace_id).await {
                warn!(%workspace_id, error = %err, "rebuild after create failed, staying cold");
                self.destroy(workspace_id);
            }
            return;
        }

        let Some(entry) = self.entries.get(&workspace_id).map(|e| Arc::clone(&e)) else {
            return;
        };
        let mut guard = entry.write().await;
        if let Err(err) = maintain::apply_created(&mut guard, image, self.ordering.as_ref()) {
            drop(guard);
            warn!(%workspace_id, error = %err, "create maintenance failed, invalidating entry");
            self.invalidate(workspace_id);
        }
    }

    /// Fold a persisted update into the workspace's entry, given the
    /// image's previous and next states.
    ///
    /// Never fails; see [`notify_created`](Self::notify_created).
    pub async fn notify_updated(&self, previous: &Image, next: &Image) {
        let workspace_id = next.workspace_id;

        if previous.workspace_id != workspace_id {
            warn!(
                %workspace_id,
                other = %previous.workspace_id,
                "update notification spans workspaces, invalidating both"
            );
            self.invalidate(previous.workspace_id);
            self.invalidate(workspace_id);
            return;
        }

        if !self.exists(workspace_id) {
            if let Err(err) = self.get_or_build(workspace_id).await {
                warn!(%workspace_id, error = %err, "rebuild after update failed, staying cold");
                self.destroy(workspace_id);
            }
            return;
        }

        let Some(entry) = self.entries.get(&workspace_id).map(|e| Arc::clone(&e)) else {
            return;
        };
        let mut guard = entry.write().await;
        if let Err(err) = maintain::apply_updated(&mut guard, previous, next, self.ordering.as_ref())
        {
            drop(guard);
            warn!(%workspace_id, error = %err, "update maintenance failed, invalidating entry");
            self.invalidate(workspace_id);
        }
    }
}
