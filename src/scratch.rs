//! Local scratch copies of downloaded objects.
//!
//! A [`ScratchBlob`] owns exactly one file for the lifetime of a pipeline run.
//! The file is removed when the blob is dropped, so early returns and cancelled
//! runs still clean up after themselves.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncReadExt;

/// Disambiguates blobs created within the same nanosecond
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct ScratchBlob {
    path: PathBuf,
    removed: bool,
}

impl ScratchBlob {
    /// Write `data` verbatim to a freshly named file in `dir`
    pub async fn persist(dir: &Path, extension: &str, data: &[u8]) -> io::Result<Self> {
        let path = dir.join(format!("{}.{}", unique_token(), extension));
        tokio::fs::write(&path, data).await?;
        Ok(ScratchBlob {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `len` leading bytes of the blob
    pub async fn read_header(&self, len: usize) -> io::Result<Vec<u8>> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut header = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut header).await?;
        Ok(header)
    }

    /// Delete the file now, reporting any failure
    pub async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for ScratchBlob {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch blob");
                }
            }
        }
    }
}

/// Hex md5 of the current high resolution time, process id and a sequence number
fn unique_token() -> String {
    let now = chrono::Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros());
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let digest = md5::compute(format!("{}-{}-{}", nanos, std::process::id(), seq));
    format!("{:x}", digest)
}
