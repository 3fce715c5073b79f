//! Publishing a session's additions.
//!
//! A commit writes a complete replacement file next to the base file:
//! header, combined index, the base record region copied verbatim, then the
//! pending records copied verbatim. The replacement is renamed over the base
//! path only if the base path still has the identity it had when the session
//! opened it. Otherwise another writer got there first and the replacement is
//! deleted. No locks are taken; readers always see a whole file.

use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::base::{BaseFile, BaseSnapshot};
use crate::header::FileHeader;
use crate::index::{encode_index, Index};
use crate::pending::PendingBuffer;
use crate::session::SessionConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was added, or the session was read-only.
    NoChanges,
    /// Additions were dropped on request (`close` forced to read mode).
    Discarded { records: usize },
    /// The replacement file was renamed over the base path. The staleness
    /// check and the rename are separate steps, so two sessions closing at
    /// the same instant can both see this and only the later rename
    /// survives; it does not promise this session was the only winner.
    Committed { records: usize },
    /// Another writer replaced the base file after this session opened it;
    /// this session's additions were dropped.
    ConflictLoss { records: usize },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CommitOutcome::ConflictLoss { .. })
    }
}

pub(crate) struct Commit<'a> {
    pub path: &'a Path,
    pub snapshot: &'a BaseSnapshot,
    /// Base entries in their original order followed by the new entries.
    pub index: &'a Index,
    pub base: Option<&'a mut BaseFile>,
    pub pending: &'a mut PendingBuffer,
    pub config: &'a SessionConfig,
}

impl Commit<'_> {
    pub(crate) fn run(self) -> Result<CommitOutcome> {
        let records = self.pending.records();
        let dir = parent_dir(self.path);

        let mut out = tempfile::Builder::new()
            .prefix(&self.config.temp_prefix)
            .tempfile_in(dir)?;
        let file = out.as_file_mut();

        file.write_all(&FileHeader::placeholder().to_bytes())?;
        let packed = encode_index(self.index, self.config.compression_level)?;
        file.write_all(&packed.bytes)?;

        let header = FileHeader::new(packed.compressed_len, packed.uncompressed_len);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        file.seek(SeekFrom::End(0))?;

        if let Some(base) = self.base {
            base.copy_records_to(file)?;
        }
        self.pending.copy_to(file)?;
        file.flush()?;

        let expected = header.data_offset() + self.index.record_bytes();
        let written = file.metadata()?.len();
        if written != expected {
            return Err(Error::IndexCorrupt(format!(
                "commit wrote {written} bytes, index describes {expected}"
            )));
        }
        if self.config.sync_on_commit {
            file.sync_all()?;
        }
        copy_permissions(self.path, out.path(), self.config.file_mode)?;

        if !self.snapshot.unchanged(self.path)? {
            log::warn!(
                "{} changed since open; dropping {} pending records",
                self.path.display(),
                records
            );
            // Dropping `out` removes the replacement.
            return Ok(CommitOutcome::ConflictLoss { records });
        }

        out.persist(self.path).map_err(|err| Error::Io(err.error))?;
        if self.config.sync_on_commit {
            if let Err(err) = sync_dir(dir) {
                log::warn!("fsync of {} failed after commit: {err}", dir.display());
            }
        }
        log::info!(
            "committed {} new records to {} ({} total, {} bytes)",
            records,
            self.path.display(),
            self.index.len(),
            expected
        );
        Ok(CommitOutcome::Committed { records })
    }
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Give the replacement the permissions of the file it replaces, or
/// `new_mode` when there is nothing to replace.
#[cfg(unix)]
fn copy_permissions(base: &Path, out: &Path, new_mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = match std::fs::metadata(base) {
        Ok(meta) => meta.permissions(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::Permissions::from_mode(new_mode)
        }
        Err(err) => return Err(err.into()),
    };
    std::fs::set_permissions(out, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_permissions(base: &Path, out: &Path, _new_mode: u32) -> Result<()> {
    if let Ok(meta) = std::fs::metadata(base) {
        std::fs::set_permissions(out, meta.permissions())?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
