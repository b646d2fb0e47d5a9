//! Filesystem-backed image store.
//!
//! One JSON document per image record at
//! `<root>/<workspace_id>/images/<image_id>.json`. The workspace
//! directory is created by the first save; a workspace that never held
//! an image has no directory, which listing reports as `NotFound`.

use crate::ImageStore;
use aperture_core::{Image, ImageId, StorageError, WorkspaceId};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

const IMAGE_RECORD_EXT: &str = "json";

/// Image store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    /// Create a store rooted at `root`. The root itself is created
    /// lazily; workspace directories are created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding a workspace's image records.
    fn images_dir(&self, workspace_id: WorkspaceId) -> PathBuf {
        self.root.join(workspace_id.to_string()).join("images")
    }

    fn record_path(&self, workspace_id: WorkspaceId, image_id: ImageId) -> PathBuf {
        self.images_dir(workspace_id)
            .join(format!("{}.{}", image_id, IMAGE_RECORD_EXT))
    }

    fn io_error(path: &Path, err: std::io::Error) -> StorageError {
        StorageError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn list_image_ids(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<ImageId>, StorageError> {
        let dir = self.images_dir(workspace_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound { workspace_id });
            }
            Err(err) => return Err(Self::io_error(&dir, err)),
        };

        let mut ids = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => return Err(Self::io_error(&dir, err)),
            };

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(IMAGE_RECORD_EXT) {
                continue;
            }

            // File stem is the image id; anything else in the directory
            // is not a record and is skipped.
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(id) = Uuid::from_str(stem) {
                ids.push(id);
            }
        }

        Ok(ids)
    }

    async fn load_image(
        &self,
        workspace_id: WorkspaceId,
        image_id: ImageId,
    ) -> Result<Image, StorageError> {
        let path = self.record_path(workspace_id, image_id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|err| Self::io_error(&path, err))?;

        serde_json::from_slice(&bytes).map_err(|err| StorageError::Corrupt {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }

    async fn save_image(&self, image: &Image) -> Result<(), StorageError> {
        let dir = self.images_dir(image.workspace_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| StorageError::WriteFailed {
                image_id: image.image_id,
                reason: err.to_string(),
            })?;

        let json = serde_json::to_vec_pretty(image).map_err(|err| StorageError::WriteFailed {
            image_id: image.image_id,
            reason: err.to_string(),
        })?;

        let path = self.record_path(image.workspace_id, image.image_id);
        tokio::fs::write(&path, json)
            .await
            .map_err(|err| StorageError::WriteFailed {
                image_id: image.image_id,
                reason: err.to_string(),
            })
    }

    async fn workspace_exists(&self, workspace_id: WorkspaceId) -> bool {
        tokio::fs::try_exists(self.images_dir(workspace_id))
            .await
            .unwrap_or(false)
    }
}
