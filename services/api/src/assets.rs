//! services/api/src/assets.rs
//!
//! Filesystem implementation of the `AssetStore` port. Uploaded and
//! generated media live under a single flat upload root, addressed by
//! randomly generated names so concurrent writes never collide.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use chatbot_core::ports::{AssetStore, PortError, PortResult};

#[derive(Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    /// Creates the store, making sure the upload root exists.
    pub async fn new(root: impl Into<PathBuf>) -> PortResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to create upload dir: {e}")))?;
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Names must stay flat: reject anything that could traverse out of the root.
fn validate_name(name: &str) -> PortResult<()> {
    let is_flat = Path::new(name)
        .components()
        .all(|c| matches!(c, std::path::Component::Normal(_)))
        && !name.contains('/')
        && !name.contains('\\');
    if name.is_empty() || !is_flat {
        return Err(PortError::Validation(format!("Invalid asset name: {name}")));
    }
    Ok(())
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn save(&self, extension: &str, data: &[u8]) -> PortResult<String> {
        let extension = extension.trim_start_matches('.');
        let name = if extension.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{}", Uuid::new_v4(), extension)
        };
        validate_name(&name)?;
        tokio::fs::write(self.path_for(&name), data)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to store asset {name}: {e}")))?;
        Ok(name)
    }

    async fn delete(&self, name: &str) -> PortResult<()> {
        validate_name(name)?;
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(format!(
                "Failed to delete asset {name}: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> FsAssetStore {
        let dir = std::env::temp_dir().join(format!("chatbot-assets-{}", Uuid::new_v4()));
        FsAssetStore::new(dir).await.unwrap()
    }

    #[tokio::test]
    async fn save_then_delete_roundtrip() {
        let store = temp_store().await;
        let name = store.save("png", b"not really a png").await.unwrap();
        assert!(name.ends_with(".png"));

        let on_disk = tokio::fs::read(store.path_for(&name)).await.unwrap();
        assert_eq!(on_disk, b"not really a png");

        store.delete(&name).await.unwrap();
        assert!(!store.path_for(&name).exists());
    }

    #[tokio::test]
    async fn deleting_missing_asset_is_ok() {
        let store = temp_store().await;
        store.delete("never-stored.mp3").await.unwrap();
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let store = temp_store().await;
        assert!(store.delete("../outside.txt").await.is_err());
    }
}
