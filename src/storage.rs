use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use crate::error::AppError;

/// Blob storage for supporting documents.
///
/// Paths are relative, `/`-separated keys such as `12/1718000000000.pdf`.
#[rocket::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `path` and returns the public URL of the object.
    /// An existing object is never replaced; that is a `Conflict`.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, AppError>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, AppError>;

    fn public_url(&self, path: &str) -> String;
}

pub struct LocalObjectStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(path);

        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !is_plain {
            return Err(AppError::validation(
                "path",
                format!("Invalid object path: {}", path),
            ));
        }

        Ok(self.root.join(relative))
    }
}

#[rocket::async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, AppError> {
        let target = self.resolve(path)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let open = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await;

        let mut file = match open {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(AppError::Conflict(format!("Object already exists: {}", path)));
            }
            Err(err) => return Err(err.into()),
        };
        file.write_all(bytes).await?;
        file.flush().await?;

        info!(path = %path, "Stored document");
        Ok(self.public_url(path))
    }

    #[instrument(skip(self))]
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, AppError> {
        let target = self.resolve(path)?;

        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix, path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Jpeg,
    Png,
}

impl DocumentKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "jpg" | "jpeg" => Some(DocumentKind::Jpeg),
            "png" => Some(DocumentKind::Png),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Jpeg => "jpg",
            DocumentKind::Png => "png",
        }
    }

    pub fn content_type(&self) -> rocket::http::ContentType {
        match self {
            DocumentKind::Pdf => rocket::http::ContentType::PDF,
            DocumentKind::Jpeg => rocket::http::ContentType::JPEG,
            DocumentKind::Png => rocket::http::ContentType::PNG,
        }
    }
}

pub fn document_path(owner_id: i64, unix_millis: i64, kind: DocumentKind) -> String {
    format!("{}/{}.{}", owner_id, unix_millis, kind.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("achievement-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn put_then_get_returns_bytes_and_url() {
        let root = temp_root();
        let store = LocalObjectStore::new(&root, "/documents/");

        let url = store.put("7/1700000000000.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(url, "/documents/7/1700000000000.pdf");

        let bytes = store.get("7/1700000000000.pdf").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"%PDF-1.4"[..]));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn put_keeps_existing_object() {
        let root = temp_root();
        let store = LocalObjectStore::new(&root, "/documents");

        store.put("7/1700000000000.pdf", b"first").await.unwrap();
        let second = store.put("7/1700000000000.pdf", b"second").await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        let bytes = store.get("7/1700000000000.pdf").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"first"[..]));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_object_is_none() {
        let store = LocalObjectStore::new(temp_root(), "/documents");
        assert!(store.get("1/missing.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let store = LocalObjectStore::new(temp_root(), "/documents");

        for path in ["../secret", "/etc/passwd", "1/../../x", ""] {
            let result = store.get(path).await;
            assert!(
                matches!(result, Err(AppError::Validation { .. })),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn document_kind_accepts_only_allow_listed_types() {
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("jpeg"), Some(DocumentKind::Jpeg));
        assert_eq!(DocumentKind::from_extension("Jpg"), Some(DocumentKind::Jpeg));
        assert_eq!(DocumentKind::from_extension("png"), Some(DocumentKind::Png));
        assert_eq!(DocumentKind::from_extension("gif"), None);
        assert_eq!(DocumentKind::from_extension("exe"), None);
    }

    #[test]
    fn document_path_follows_owner_and_timestamp() {
        assert_eq!(
            document_path(42, 1718000000123, DocumentKind::Png),
            "42/1718000000123.png"
        );
    }
}
