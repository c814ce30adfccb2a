//! Filesystem document writer

use crate::metadata::{sidecar_path, stage_sidecar};
use crate::path::resolve_uri;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::BufWriter;
use tracing::debug;
use xqsync_types::{DocumentContent, DocumentMetadata, DocumentWriter, Error, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique sibling path used while `target` is being written
pub(crate) fn temp_path(target: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = OsString::from(".");
    if let Some(file_name) = target.file_name() {
        name.push(file_name);
    }
    name.push(format!(".{}.{}.tmp", std::process::id(), n));
    target.with_file_name(name)
}

/// Writes documents under an output root, with a JSON sidecar beside each
#[derive(Debug, Clone)]
pub struct FilePathWriter {
    root: PathBuf,
}

impl FilePathWriter {
    /// Writer rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Output root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `uri` is stored
    pub fn path_for(&self, uri: &str) -> Result<PathBuf> {
        resolve_uri(&self.root, uri)
    }

    /// Write `content` to `file` through a temporary sibling and a rename,
    /// so `file` only ever holds a complete payload.
    pub async fn write_content(&self, content: &DocumentContent, file: &Path) -> Result<u64> {
        let (temp, written) = self.stage_content(content, file).await?;
        if let Err(e) = tokio::fs::rename(&temp, file).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(move_error(file, &e));
        }
        Ok(written)
    }

    /// Write `content` into a temporary sibling of `file`, synced to disk
    async fn stage_content(
        &self,
        content: &DocumentContent,
        file: &Path,
    ) -> Result<(PathBuf, u64)> {
        let temp = temp_path(file);
        let result = async {
            let handle = File::create(&temp).await.map_err(|e| {
                Error::io(format!("Failed to create file '{}': {}", temp.display(), e))
            })?;
            let mut writer = BufWriter::new(handle);
            let written = content.write_to(&mut writer).await?;
            writer.into_inner().sync_all().await.map_err(|e| {
                Error::io(format!("Failed to sync file '{}': {}", temp.display(), e))
            })?;
            Ok::<u64, Error>(written)
        }
        .await;

        match result {
            Ok(written) => Ok((temp, written)),
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(e)
            }
        }
    }
}

fn move_error(target: &Path, e: &std::io::Error) -> Error {
    Error::io(format!(
        "Failed to move '{}' into place: {}",
        target.display(),
        e
    ))
}

/// Move staged content and sidecar over `file` and its sidecar.
///
/// The previous content is parked beside `file` until the sidecar is in
/// place, and restored if it cannot be, so a failure leaves the destination
/// as it was.
async fn commit(content_temp: &Path, sidecar_temp: &Path, file: &Path) -> Result<()> {
    let backup = temp_path(file);
    let had_previous = match tokio::fs::rename(file, &backup).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            discard(&[content_temp, sidecar_temp]).await;
            return Err(move_error(file, &e));
        }
    };

    if let Err(e) = tokio::fs::rename(content_temp, file).await {
        restore(&backup, file, had_previous).await;
        discard(&[content_temp, sidecar_temp]).await;
        return Err(move_error(file, &e));
    }

    let sidecar = sidecar_path(file);
    if let Err(e) = tokio::fs::rename(sidecar_temp, &sidecar).await {
        restore(&backup, file, had_previous).await;
        discard(&[content_temp, sidecar_temp]).await;
        return Err(Error::metadata(format!(
            "Failed to write {}: {}",
            sidecar.display(),
            e
        )));
    }

    if had_previous {
        let _ = tokio::fs::remove_file(&backup).await;
    }
    Ok(())
}

async fn discard(paths: &[&Path]) {
    for path in paths {
        let _ = tokio::fs::remove_file(path).await;
    }
}

async fn restore(backup: &Path, file: &Path, had_previous: bool) {
    if had_previous {
        let _ = tokio::fs::rename(backup, file).await;
    } else {
        let _ = tokio::fs::remove_file(file).await;
    }
}

#[async_trait]
impl DocumentWriter for FilePathWriter {
    async fn write(
        &self,
        uri: &str,
        content: &DocumentContent,
        metadata: &DocumentMetadata,
    ) -> Result<u64> {
        let path = self.path_for(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::output_root(parent, e.to_string()))?;
        }

        let (content_temp, written) = self.stage_content(content, &path).await?;
        let sidecar_temp = match stage_sidecar(&path, metadata).await {
            Ok(temp) => temp,
            Err(e) => {
                let _ = tokio::fs::remove_file(&content_temp).await;
                return Err(e);
            }
        };
        commit(&content_temp, &sidecar_temp, &path).await?;
        debug!("Wrote {} ({} bytes)", path.display(), written);
        Ok(written)
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = self.path_for(uri)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::io(format!("Failed to check '{}': {}", path.display(), e)))
    }
}
