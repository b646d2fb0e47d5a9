//! The per-workspace cache entry: one canonical image table plus the
//! derived indices and materialized orderings.

use aperture_core::{GroupId, Image, ImageId, TagId, WorkspaceId};
use std::collections::{HashMap, HashSet};

/// Multi-index view over one workspace's images.
///
/// `by_id` holds the canonical in-cache copy of every record; the
/// secondary indices and materialized orderings reference images by id
/// only, so replacing the canonical copy keeps every view coherent.
/// Tag and group buckets are sets keyed by image id: removal is always
/// by identity, never by filtering a list against an unrelated loop
/// variable.
#[derive(Debug)]
pub struct CacheEntry {
    workspace_id: WorkspaceId,
    pub(crate) by_id: HashMap<ImageId, Image>,
    pub(crate) by_tag: HashMap<TagId, HashSet<ImageId>>,
    pub(crate) by_group: HashMap<GroupId, HashSet<ImageId>>,
    pub(crate) sorted_all: Vec<ImageId>,
    pub(crate) grouped_view: Vec<ImageId>,
}

impl CacheEntry {
    /// Create an empty entry for a workspace. Only the rebuilder and
    /// the maintainer populate it.
    pub(crate) fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            by_id: HashMap::new(),
            by_tag: HashMap::new(),
            by_group: HashMap::new(),
            sorted_all: Vec::new(),
            grouped_view: Vec::new(),
        }
    }

    /// The workspace this entry belongs to.
    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    /// Number of images in the entry.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the entry holds no images.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Insert an image into `by_id` and the tag/group buckets. Does NOT
    /// touch the materialized orderings; callers recompute views after
    /// a batch of inserts.
    pub(crate) fn index_image(&mut self, image: Image) {
        for tag_id in &image.tags {
            self.by_tag.entry(*tag_id).or_default().insert(image.image_id);
        }
        if let Some(group_id) = image.group_id {
            self.by_group.entry(group_id).or_default().insert(image.image_id);
        }
        self.by_id.insert(image.image_id, image);
    }

    /// The canonical copy of an image, if present.
    pub fn get(&self, image_id: ImageId) -> Option<&Image> {
        self.by_id.get(&image_id)
    }

    /// The grouped-collapsed listing: every ungrouped image plus one
    /// thumbnail representative per group, in total order.
    pub fn grouped_images(&self) -> Vec<Image> {
        self.materialize(&self.grouped_view)
    }

    /// Every image in the workspace, in total order.
    pub fn all_images(&self) -> Vec<Image> {
        self.materialize(&self.sorted_all)
    }

    /// Images currently carrying a tag. Order is unspecified.
    pub fn images_for_tag(&self, tag_id: TagId) -> Vec<Image> {
        self.by_tag
            .get(&tag_id)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Members of a group. Order is unspecified; callers that need the
    /// in-group ordering sort by `group_sort`.
    pub fn images_for_group(&self, group_id: GroupId) -> Vec<Image> {
        self.by_group
            .get(&group_id)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    fn materialize(&self, ids: &[ImageId]) -> Vec<Image> {
        ids.iter().filter_map(|id| self.by_id.get(id)).cloned().collect()
    }

    /// Verify every index invariant, returning the first violation as a
    /// human-readable description. Used by tests; the maintainer relies
    /// on targeted checks instead of a full sweep.
    pub fn check_invariants(&self) -> Result<(), String> {
        // Tag buckets match each image's tag-set exactly.
        for image in self.by_id.values() {
            for tag_id in &image.tags {
                let in_bucket = self
                    .by_tag
                    .get(tag_id)
                    .is_some_and(|ids| ids.contains(&image.image_id));
                if !in_bucket {
                    return Err(format!(
                        "image {} carries tag {} but is missing from its bucket",
                        image.image_id, tag_id
                    ));
                }
            }
        }
        for (tag_id, ids) in &self.by_tag {
            for image_id in ids {
                let carries = self
                    .by_id
                    .get(image_id)
                    .is_some_and(|image| image.tags.contains(tag_id));
                if !carries {
                    return Err(format!(
                        "tag bucket {} lists image {} which does not carry it",
                        tag_id, image_id
                    ));
                }
            }
        }

        // Group buckets match each image's group id exactly.
        for image in self.by_id.values() {
            if let Some(group_id) = image.group_id {
                let in_bucket = self
                    .by_group
                    .get(&group_id)
                    .is_some_and(|ids| ids.contains(&image.image_id));
                if !in_bucket {
                    return Err(format!(
                        "image {} belongs to group {} but is missing from its bucket",
                        image.image_id, group_id
                    ));
                }
            }
        }
        for (group_id, ids) in &self.by_group {
            for image_id in ids {
                let belongs = self
                    .by_id
                    .get(image_id)
                    .is_some_and(|image| image.group_id == Some(*group_id));
                if !belongs {
                    return Err(format!(
                        "group bucket {} lists image {} which is not in the group",
                        group_id, image_id
                    ));
                }
            }
        }

        // No empty buckets.
        if self.by_tag.values().any(|ids| ids.is_empty()) {
            return Err("empty tag bucket".to_string());
        }
        if self.by_group.values().any(|ids| ids.is_empty()) {
            return Err("empty group bucket".to_string());
        }

        // sorted_all is exactly the by_id contents, no dupes.
        if self.sorted_all.len() != self.by_id.len() {
            return Err(format!(
                "sorted listing has {} entries for {} images",
                self.sorted_all.len(),
                self.by_id.len()
            ));
        }
        let sorted_set: HashSet<ImageId> = self.sorted_all.iter().copied().collect();
        if sorted_set.len() != self.sorted_all.len() {
            return Err("duplicate id in sorted listing".to_string());
        }
        if !self.by_id.keys().all(|id| sorted_set.contains(id)) {
            return Err("sorted listing omits an image".to_string());
        }

        // Grouped view holds every ungrouped image once and exactly
        // the thumbnail per represented group.
        let grouped_set: HashSet<ImageId> = self.grouped_view.iter().copied().collect();
        if grouped_set.len() != self.grouped_view.len() {
            return Err("duplicate id in grouped view".to_string());
        }
        for image in self.by_id.values() {
            let expected = image.is_group_representative();
            let present = grouped_set.contains(&image.image_id);
            if expected != present {
                return Err(format!(
                    "image {} grouped-view membership is {} but should be {}",
                    image.image_id, present, expected
                ));
            }
        }

        Ok(())
    }
}
