//! Full rebuild of a workspace's cache entry from the durable store.

use super::entry::CacheEntry;
use super::views;
use crate::ImageStore;
use aperture_core::{CacheError, ImageOrdering, StorageError, WorkspaceId};
use std::time::Duration;
use tracing::debug;

/// Scan the store and build a fresh entry for a workspace.
///
/// Returns `Ok(None)` when the workspace has no backing storage
/// location at all - an empty workspace is a valid, cacheable absence
/// of data, modeled as "no entry", not an error. Any single record
/// load failure fails the whole rebuild: there is no partial-success
/// state.
///
/// The entire store interaction is bounded by `timeout`; exceeding it
/// fails the rebuild with `StorageError::Timeout` and leaves the
/// workspace cold.
pub(crate) async fn rebuild_entry(
    store: &dyn ImageStore,
    ordering: &dyn ImageOrdering,
    workspace_id: WorkspaceId,
    timeout: Duration,
) -> Result<Option<CacheEntry>, CacheError> {
    let scan = scan_workspace(store, ordering, workspace_id);
    match tokio::time::timeout(timeout, scan).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Rebuild(StorageError::Timeout {
            workspace_id,
            elapsed_ms: timeout.as_millis() as u64,
        })),
    }
}

async fn scan_workspace(
    store: &dyn ImageStore,
    ordering: &dyn ImageOrdering,
    workspace_id: WorkspaceId,
) -> Result<Option<CacheEntry>, CacheError> {
    let image_ids = match store.list_image_ids(workspace_id).await {
        Ok(ids) => ids,
        Err(StorageError::NotFound { .. }) => {
            debug!(%workspace_id, "workspace has no storage location, treating as empty");
            return Ok(None);
        }
        Err(err) => return Err(CacheError::Rebuild(err)),
    };

    let mut entry = CacheEntry::new(workspace_id);
    for image_id in image_ids {
        let image = store
            .load_image(workspace_id, image_id)
            .await
            .map_err(CacheError::Rebuild)?;
        entry.index_image(image);
    }

    views::recompute(&mut entry, ordering)?;
    debug!(%workspace_id, images = entry.len(), "rebuilt cache entry");
    Ok(Some(entry))
}
