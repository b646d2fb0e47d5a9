//! Sort/view engine: recomputes the two materialized orderings from
//! the canonical image table.

use super::entry::CacheEntry;
use aperture_core::{CacheError, GroupId, ImageOrdering};
use std::collections::HashSet;

/// Rebuild `sorted_all` from the current `by_id` contents using the
/// injected total order, then derive `grouped_view` in a single pass:
/// an image is included iff it is ungrouped or flagged as its group's
/// thumbnail.
///
/// Must run after a full rebuild and after any change to an image's
/// group id or thumbnail flag; tag-only changes never affect either
/// ordering, so the maintainer deliberately skips it for those.
///
/// Two thumbnail-flagged images in one group violate the
/// one-representative contract and are reported as `Inconsistent` so
/// the registry can destroy the entry.
pub(crate) fn recompute(
    entry: &mut CacheEntry,
    ordering: &dyn ImageOrdering,
) -> Result<(), CacheError> {
    let mut images: Vec<_> = entry.by_id.values().collect();
    images.sort_by(|a, b| ordering.cmp(a, b));

    let mut sorted_all = Vec::with_capacity(images.len());
    let mut grouped_view = Vec::new();
    let mut represented: HashSet<GroupId> = HashSet::new();

    for image in images {
        sorted_all.push(image.image_id);
        if !image.is_group_representative() {
            continue;
        }
        if let Some(group_id) = image.group_id {
            if !represented.insert(group_id) {
                return Err(CacheError::Inconsistent {
                    workspace_id: entry.workspace_id(),
                    reason: format!("group {} has multiple thumbnail images", group_id),
                });
            }
        }
        grouped_view.push(image.image_id);
    }

    entry.sorted_all = sorted_all;
    entry.grouped_view = grouped_view;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aperture_core::{Image, NewestFirst, WorkspaceId};
    use aperture_test_utils::ImageBuilder;
    use uuid::Uuid;

    fn make_image(
        workspace_id: WorkspaceId,
        age_secs: i64,
        group_id: Option<GroupId>,
        is_thumbnail: bool,
    ) -> Image {
        let mut builder = ImageBuilder::new(workspace_id).age_secs(age_secs);
        if let Some(group_id) = group_id {
            builder = builder.in_group(group_id, 0);
        }
        if is_thumbnail {
            builder = builder.as_thumbnail();
        }
        builder.build()
    }

    #[test]
    fn test_sorted_all_is_newest_first() {
        let workspace_id = Uuid::now_v7();
        let mut entry = CacheEntry::new(workspace_id);
        let old = make_image(workspace_id, 100, None, false);
        let new = make_image(workspace_id, 0, None, false);
        let (old_id, new_id) = (old.image_id, new.image_id);
        entry.index_image(old);
        entry.index_image(new);

        recompute(&mut entry, &NewestFirst).unwrap();
        assert_eq!(entry.sorted_all, vec![new_id, old_id]);
        assert!(entry.check_invariants().is_ok());
    }

    #[test]
    fn test_grouped_view_collapses_groups_to_thumbnail() {
        let workspace_id = Uuid::now_v7();
        let group = Uuid::now_v7();
        let mut entry = CacheEntry::new(workspace_id);
        let ungrouped = make_image(workspace_id, 0, None, false);
        let thumb = make_image(workspace_id, 10, Some(group), true);
        let member = make_image(workspace_id, 20, Some(group), false);
        let (ungrouped_id, thumb_id) = (ungrouped.image_id, thumb.image_id);
        entry.index_image(ungrouped);
        entry.index_image(thumb);
        entry.index_image(member);

        recompute(&mut entry, &NewestFirst).unwrap();
        assert_eq!(entry.grouped_view, vec![ungrouped_id, thumb_id]);
        assert_eq!(entry.sorted_all.len(), 3);
    }

    #[test]
    fn test_group_without_thumbnail_contributes_nothing() {
        let workspace_id = Uuid::now_v7();
        let group = Uuid::now_v7();
        let mut entry = CacheEntry::new(workspace_id);
        entry.index_image(make_image(workspace_id, 0, Some(group), false));
        entry.index_image(make_image(workspace_id, 10, Some(group), false));

        recompute(&mut entry, &NewestFirst).unwrap();
        assert!(entry.grouped_view.is_empty());
        assert_eq!(entry.sorted_all.len(), 2);
    }

    #[test]
    fn test_multiple_thumbnails_is_inconsistent() {
        let workspace_id = Uuid::now_v7();
        let group = Uuid::now_v7();
        let mut entry = CacheEntry::new(workspace_id);
        entry.index_image(make_image(workspace_id, 0, Some(group), true));
        entry.index_image(make_image(workspace_id, 10, Some(group), true));

        let result = recompute(&mut entry, &NewestFirst);
        assert!(matches!(result, Err(CacheError::Inconsistent { .. })));
    }
}
