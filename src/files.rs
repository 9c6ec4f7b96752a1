use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use ulid::Ulid;

use crate::model::{StoredRef, UserId};

/// A packing list read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub file_name: String,
}

/// Where uploaded packing lists live. References are opaque to callers but
/// always rooted under [`StoredRef::NAMESPACE`].
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn store(&self, owner: UserId, file_name: &str, bytes: Bytes) -> io::Result<StoredRef>;

    /// Fails with `InvalidInput` for a reference outside the namespace.
    async fn fetch(&self, reference: &StoredRef) -> io::Result<StoredFile>;

    async fn remove(&self, reference: &StoredRef) -> io::Result<()>;
}

/// MIME type by extension, case-insensitive.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Files on local disk under `root/uploads/packing-lists/`.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, reference: &StoredRef) -> io::Result<PathBuf> {
        if !reference.is_in_namespace() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "reference outside upload namespace",
            ));
        }
        Ok(self.root.join(reference.as_str()))
    }
}

/// `.ext` from the client's file name if it is plain alphanumeric, else nothing.
fn safe_extension(file_name: &str) -> String {
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, owner: UserId, file_name: &str, bytes: Bytes) -> io::Result<StoredRef> {
        let name = format!("packing_{owner}_{}{}", Ulid::new(), safe_extension(file_name));
        let dir = self.root.join(StoredRef::NAMESPACE);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), &bytes).await?;
        tracing::debug!("stored {} bytes as {name}", bytes.len());
        Ok(StoredRef(format!("{}{name}", StoredRef::NAMESPACE)))
    }

    async fn fetch(&self, reference: &StoredRef) -> io::Result<StoredFile> {
        let path = self.path_of(reference)?;
        let bytes = tokio::fs::read(&path).await?;
        Ok(StoredFile {
            bytes: Bytes::from(bytes),
            content_type: content_type_for(reference.file_name()),
            file_name: reference.file_name().to_string(),
        })
    }

    async fn remove(&self, reference: &StoredRef) -> io::Result<()> {
        let path = self.path_of(reference)?;
        tokio::fs::remove_file(path).await
    }
}
