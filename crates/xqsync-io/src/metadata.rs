//! Sidecar metadata files
//!
//! A document stored at `path` keeps its metadata as JSON in
//! `path.metadata` next to it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use xqsync_types::{DocumentMetadata, Error, Result};

/// Suffix appended to a content path to name its sidecar
pub const METADATA_SUFFIX: &str = ".metadata";

/// Sidecar location for a content file
pub fn sidecar_path(content: &Path) -> PathBuf {
    let mut name = OsString::from(content.as_os_str());
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}

/// Whether `path` names a sidecar file
pub fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(METADATA_SUFFIX) && name.len() > METADATA_SUFFIX.len())
}

/// Read the sidecar of `content`; `None` when there is none
pub async fn read_sidecar(content: &Path) -> Result<Option<DocumentMetadata>> {
    let path = sidecar_path(content);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::metadata(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::metadata(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write the sidecar of `content`, replacing any previous one atomically
pub async fn write_sidecar(content: &Path, metadata: &DocumentMetadata) -> Result<()> {
    let path = sidecar_path(content);
    let temp = stage_sidecar(content, metadata).await?;
    if let Err(e) = tokio::fs::rename(&temp, &path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::metadata(format!(
            "Failed to write {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

/// Write the sidecar of `content` to a temporary sibling and return its path;
/// the caller renames it over [`sidecar_path`] or removes it.
pub(crate) async fn stage_sidecar(
    content: &Path,
    metadata: &DocumentMetadata,
) -> Result<PathBuf> {
    let path = sidecar_path(content);
    let json = serde_json::to_vec_pretty(metadata)
        .map_err(|e| Error::metadata(format!("Failed to encode metadata: {}", e)))?;

    let temp = crate::writer::temp_path(&path);
    let result = async {
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::metadata(format!(
            "Failed to write {}: {}",
            path.display(),
            e
        )));
    }
    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use xqsync_types::{Capability, DocumentFormat, Permission};

    #[test]
    fn test_sidecar_naming() {
        let path = sidecar_path(Path::new("/out/dir/a b.xml"));
        assert_eq!(path, PathBuf::from("/out/dir/a b.xml.metadata"));
        assert!(is_sidecar(&path));
        assert!(!is_sidecar(Path::new("/out/dir/a b.xml")));
        assert!(!is_sidecar(Path::new("/out/.metadata")));
    }

    #[tokio::test]
    async fn test_absent_sidecar_is_none() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("doc.xml");
        assert_eq!(read_sidecar(&content).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("doc.json");

        let mut metadata = DocumentMetadata::new().with_format(DocumentFormat::Json);
        metadata.add_collection("c1");
        metadata.add_permission(Permission::new("admin", Capability::Update));
        metadata.quality = -2;

        write_sidecar(&content, &metadata).await.unwrap();
        assert_eq!(read_sidecar(&content).await.unwrap(), Some(metadata));
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_is_error() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("doc.xml");
        std::fs::write(sidecar_path(&content), "{not json").unwrap();

        let error = read_sidecar(&content).await.unwrap_err();
        assert!(matches!(error, Error::Metadata { .. }));
    }
}
