//! Error types for Aperture operations

use crate::{GroupId, ImageId, WorkspaceId};
use thiserror::Error;

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The workspace has no backing storage location yet. This is not a
    /// failure: a workspace that never held an image has no directory,
    /// and listing it means "zero images".
    #[error("Workspace {workspace_id} has no storage location")]
    NotFound { workspace_id: WorkspaceId },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Corrupt record at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Write failed for image {image_id}: {reason}")]
    WriteFailed { image_id: ImageId, reason: String },

    #[error("Store access for workspace {workspace_id} timed out after {elapsed_ms}ms")]
    Timeout {
        workspace_id: WorkspaceId,
        elapsed_ms: u64,
    },
}

/// Cache maintenance errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// An invariant violation was detected mid-mutation. The entry is
    /// destroyed rather than repaired; the next access rebuilds it.
    #[error("Cache entry for workspace {workspace_id} is inconsistent: {reason}")]
    Inconsistent {
        workspace_id: WorkspaceId,
        reason: String,
    },

    #[error("Rebuild failed: {0}")]
    Rebuild(#[from] StorageError),
}

/// Service layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Image not found: {image_id}")]
    ImageNotFound { image_id: ImageId },

    #[error("Group not found: {group_id}")]
    GroupNotFound { group_id: GroupId },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Master error type for all Aperture errors.
#[derive(Debug, Clone, Error)]
pub enum ApertureError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Result type alias for Aperture operations.
pub type ApertureResult<T> = Result<T, ApertureError>;

// =============================================================================
// TESTS
// =============================================================================
