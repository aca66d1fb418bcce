//! Upload staging with quota enforcement.
//!
//! Writes go to a sibling temp file (`<final>.uploading`) and only become
//! visible through an atomic rename at close. The byte quota is enforced
//! against a high-water mark on every write; once exceeded, the transfer
//! is dead and the temp file is gone.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use pelican_core::{Error, Result, Usage};
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use crate::audit::audit;
use crate::metrics;

/// Suffix for in-flight upload temp files, sibling of the final path.
pub const UPLOAD_SUFFIX: &str = ".uploading";

/// Walk the tenant root, summing regular-file bytes and counts.
pub async fn dir_usage(root: &Path) -> std::io::Result<Usage> {
    let mut usage = Usage::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                usage.bytes += entry.metadata().await?.len();
                usage.files += 1;
            }
        }
    }
    Ok(usage)
}

/// Stages one upload. Terminated by [`close`](Self::close) (commit or
/// quota failure) or by dropping the session (temp file left for the next
/// put to truncate).
pub struct AtomicQuotaWriter {
    user: String,
    remote: String,
    display: String,

    tmp_path: PathBuf,
    final_path: PathBuf,

    file: Option<fs::File>,
    /// Tenant usage snapshot taken at open.
    base_bytes: u64,
    /// Byte quota; zero means unlimited.
    quota: u64,

    /// Highest byte index written so far.
    max_end: u64,
    exceeded: bool,
}

impl AtomicQuotaWriter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user: &str,
        remote: &str,
        display: &str,
        tmp_path: PathBuf,
        final_path: PathBuf,
        file: fs::File,
        base_bytes: u64,
        quota: u64,
    ) -> Self {
        Self {
            user: user.to_string(),
            remote: remote.to_string(),
            display: display.to_string(),
            tmp_path,
            final_path,
            file: Some(file),
            base_bytes,
            quota,
            max_end: 0,
            exceeded: false,
        }
    }

    /// Write `data` at `offset`, enforcing the byte quota first.
    ///
    /// `base_bytes + max_end` is an upper bound on post-commit usage; it
    /// does not see concurrent uploads by the same tenant, which can
    /// overshoot the quota by the sum of their in-flight sizes.
    pub async fn write_at(&mut self, data: &[u8], offset: u64) -> Result<()> {
        if self.exceeded {
            return Err(Error::QuotaExceeded);
        }

        let end = offset + data.len() as u64;
        if end > self.max_end {
            self.max_end = end;
        }

        if self.quota > 0 && self.base_bytes + self.max_end > self.quota {
            self.exceeded = true;
            self.file.take();
            if let Err(e) = fs::remove_file(&self.tmp_path).await {
                warn!(path = %self.tmp_path.display(), error = %e, "failed to unlink quota-exceeded temp");
            }

            audit(
                &self.user,
                &self.remote,
                "put_fail",
                &self.display,
                "",
                self.max_end,
                Some(&Error::QuotaExceeded),
            );
            metrics::inc_quota_exceeded(&self.user, "bytes");
            return Err(Error::QuotaExceeded);
        }

        let file = self.file.as_mut().ok_or(Error::QuotaExceeded)?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        Ok(())
    }

    /// Commit the upload: rename temp onto the final path.
    ///
    /// Returns the committed byte count. A writer that already exceeded
    /// its quota fails here too (the temp is long gone). A rename failure
    /// unlinks the temp and propagates.
    pub async fn close(&mut self) -> Result<u64> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
        }

        if self.exceeded {
            return Err(Error::QuotaExceeded);
        }

        if let Err(e) = fs::rename(&self.tmp_path, &self.final_path).await {
            let _ = fs::remove_file(&self.tmp_path).await;
            return Err(e.into());
        }

        audit(
            &self.user,
            &self.remote,
            "put_commit",
            &self.display,
            "",
            self.max_end,
            None,
        );
        Ok(self.max_end)
    }

    pub fn display_path(&self) -> &str {
        &self.display
    }
}
