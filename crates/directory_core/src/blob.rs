//! Blob store seam used by photo upload.
//!
//! # Responsibility
//! - Persist uploaded bytes and return a public URL for them.
//!
//! # Invariants
//! - `FsBlobStore` is content-addressed: identical bytes map to the same
//!   file name (BLAKE3 digest), so repeated puts are idempotent.

use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub type BlobResult<T> = Result<T, BlobError>;

/// Blob storage failure.
#[derive(Debug)]
pub enum BlobError {
    Io { path: PathBuf, source: io::Error },
}

impl Display for BlobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "blob write failed at `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for BlobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// Stores bytes and returns the URL under which they are served.
pub trait BlobStore {
    /// `content_type_hint` is either a MIME type (`image/png`) or a bare
    /// extension (`png`); unknown hints fall back to `bin`.
    fn put(&self, bytes: &[u8], content_type_hint: Option<&str>) -> BlobResult<String>;
}

/// Filesystem blob store serving files under `<public_base_url>/uploads/`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn public_url(&self, file_name: &str) -> String {
        format!("{}/uploads/{file_name}", self.public_base_url)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, bytes: &[u8], content_type_hint: Option<&str>) -> BlobResult<String> {
        let digest = blake3::hash(bytes).to_hex();
        let file_name = format!("{digest}.{}", extension_for_hint(content_type_hint));
        let path = self.root.join(&file_name);

        if !path.exists() {
            fs::create_dir_all(&self.root).map_err(|source| BlobError::Io {
                path: self.root.clone(),
                source,
            })?;
            fs::write(&path, bytes).map_err(|source| BlobError::Io {
                path: path.clone(),
                source,
            })?;
            info!(
                "event=blob_put module=blob status=ok bytes={} file={file_name}",
                bytes.len()
            );
        }

        Ok(self.public_url(&file_name))
    }
}

/// Maps a MIME type or extension hint to a file extension.
pub fn extension_for_hint(hint: Option<&str>) -> &'static str {
    let normalized = hint
        .map(|value| value.trim().trim_start_matches('.').to_ascii_lowercase())
        .unwrap_or_default();
    match normalized.as_str() {
        "image/jpeg" | "image/jpg" | "jpeg" | "jpg" => "jpg",
        "image/png" | "png" => "png",
        "image/webp" | "webp" => "webp",
        "image/gif" | "gif" => "gif",
        _ => "bin",
    }
}
