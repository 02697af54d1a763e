//! services/api/src/adapters/blob.rs
//!
//! A `BlobStore` backed by a directory on the local filesystem. Generated PDFs and
//! uploaded images live under one root, addressed by relative keys.

use async_trait::async_trait;
use bytes::Bytes;
use flyer_core::ports::{Blob, BlobStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a key below the root. Keys may not escape it.
    fn path_for(&self, key: &str) -> PortResult<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(PortError::Unexpected(format!("invalid blob key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

/// Guesses the MIME type from the key's extension.
pub fn mime_for_key(key: &str) -> &'static str {
    let extension = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes, mime_type: &str) -> PortResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        debug!(key, mime_type, size = data.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> PortResult<Blob> {
        let path = self.path_for(key)?;
        let data = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound(format!("blob '{}'", key)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(Blob {
            data: Bytes::from(data),
            mime_type: mime_for_key(key).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn store() -> (FsBlobStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("flyer-blobs-{}", Uuid::new_v4()));
        (FsBlobStore::new(&root), root)
    }

    #[tokio::test]
    async fn put_then_get() {
        let (store, root) = store();
        store
            .put("flyers/abc.pdf", Bytes::from_static(b"%PDF-1.7"), "application/pdf")
            .await
            .unwrap();
        let blob = store.get("flyers/abc.pdf").await.unwrap();
        assert_eq!(&blob.data[..], b"%PDF-1.7");
        assert_eq!(blob.mime_type, "application/pdf");
        // Overwrite keeps a single file.
        store
            .put("flyers/abc.pdf", Bytes::from_static(b"%PDF-2"), "application/pdf")
            .await
            .unwrap();
        assert_eq!(&store.get("flyers/abc.pdf").await.unwrap().data[..], b"%PDF-2");
        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let (store, _) = store();
        assert!(matches!(
            store.get("promo/none.png").await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let (store, _) = store();
        for key in ["../etc/passwd", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(store.get(key).await, Err(PortError::Unexpected(_))),
                "{key}"
            );
        }
    }

    #[test]
    fn mime_types_follow_the_extension() {
        assert_eq!(mime_for_key("a/b.PNG"), "image/png");
        assert_eq!(mime_for_key("a.jpeg"), "image/jpeg");
        assert_eq!(mime_for_key("a.webp"), "image/webp");
        assert_eq!(mime_for_key("noext"), "application/octet-stream");
    }
}
