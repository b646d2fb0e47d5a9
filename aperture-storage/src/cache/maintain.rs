//! Index maintainer: applies create/update diffs to a warm entry.
//!
//! All mutation goes through these two functions. Each either brings
//! the entry to a fully consistent state or reports `Inconsistent`, in
//! which case the registry destroys the entry; there is no partial
//! repair.

use super::entry::CacheEntry;
use super::views;
use aperture_core::{CacheError, Image, ImageOrdering};

/// Insert a newly created image into a warm entry. New images always
/// change the materialized orderings, so the views are recomputed.
pub(crate) fn apply_created(
    entry: &mut CacheEntry,
    image: &Image,
    ordering: &dyn ImageOrdering,
) -> Result<(), CacheError> {
    entry.index_image(image.clone());
    views::recompute(entry, ordering)
}

/// Apply an update diff to a warm entry.
///
/// `previous` is the record as it was before the durable write, `next`
/// as it is now. The canonical copy is replaced outright; the tag and
/// group buckets are adjusted by set difference, with emptied buckets
/// pruned. The view engine runs only when the group id or the
/// thumbnail flag changed - tag-only edits never affect ordering or
/// grouping.
pub(crate) fn apply_updated(
    entry: &mut CacheEntry,
    previous: &Image,
    next: &Image,
    ordering: &dyn ImageOrdering,
) -> Result<(), CacheError> {
    let image_id = next.image_id;
    if previous.image_id != image_id {
        return Err(CacheError::Inconsistent {
            workspace_id: entry.workspace_id(),
            reason: format!(
                "update diff pairs image {} with image {}",
                previous.image_id, image_id
            ),
        });
    }

    if !entry.by_id.contains_key(&image_id) {
        return Err(CacheError::Inconsistent {
            workspace_id: entry.workspace_id(),
            reason: format!("canonical copy of image {} is missing", image_id),
        });
    }
    entry.by_id.insert(image_id, next.clone());

    // Tag diff: true set difference in both directions, removal by id.
    for tag_id in next.tags.difference(&previous.tags) {
        entry.by_tag.entry(*tag_id).or_default().insert(image_id);
    }
    for tag_id in previous.tags.difference(&next.tags) {
        let Some(bucket) = entry.by_tag.get_mut(tag_id) else {
            return Err(CacheError::Inconsistent {
                workspace_id: entry.workspace_id(),
                reason: format!("tag bucket {} missing during removal", tag_id),
            });
        };
        if !bucket.remove(&image_id) {
            return Err(CacheError::Inconsistent {
                workspace_id: entry.workspace_id(),
                reason: format!("image {} absent from tag bucket {}", image_id, tag_id),
            });
        }
        if bucket.is_empty() {
            entry.by_tag.remove(tag_id);
        }
    }

    let mut views_stale = false;

    // Group diff.
    if previous.group_id != next.group_id {
        if let Some(old_group) = previous.group_id {
            if let Some(bucket) = entry.by_group.get_mut(&old_group) {
                bucket.remove(&image_id);
                if bucket.is_empty() {
                    entry.by_group.remove(&old_group);
                }
            }
        }
        if let Some(new_group) = next.group_id {
            entry.by_group.entry(new_group).or_default().insert(image_id);
        }
        views_stale = true;
    }

    // Thumbnail diff: the flag alone moves the image in or out of the
    // grouped view even when the group is unchanged.
    if previous.is_group_thumbnail != next.is_group_thumbnail {
        views_stale = true;
    }

    if views_stale {
        views::recompute(entry, ordering)?;
    }
    Ok(())
}
