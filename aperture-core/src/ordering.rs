//! The total order over images, injected into the cache.
//!
//! The cache never assumes a particular sort key; it only requires a
//! deterministic total order that is stable across rebuilds. The
//! default implementation lists newest images first.

use crate::Image;
use std::cmp::Ordering;

/// A deterministic total order over images.
///
/// Implementations must be consistent: for any two images the result
/// only depends on their contents, never on iteration order or time of
/// call. Ties must be broken so that no two distinct images compare
/// equal, otherwise the materialized orderings would not be stable.
pub trait ImageOrdering: Send + Sync {
    fn cmp(&self, a: &Image, b: &Image) -> Ordering;
}

/// Default ordering: reverse chronological by creation time, image id
/// as tiebreak. UUIDv7 ids are themselves creation-time sortable, so
/// the tiebreak preserves the chronological reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestFirst;

impl ImageOrdering for NewestFirst {
    fn cmp(&self, a: &Image, b: &Image) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.image_id.cmp(&a.image_id))
    }
}
