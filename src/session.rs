//! The open/find/fetch/add/close handle over one store path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::base::{BaseFile, BaseSnapshot, OpenedBase};
use crate::codec::ValueCodec;
use crate::commit::{parent_dir, Commit, CommitOutcome};
use crate::compress::DEFAULT_LEVEL;
use crate::header::FileHeader;
use crate::index::{Index, IndexEntry, IndexLookup, Slot};
use crate::pending::PendingBuffer;
use crate::{Error, Result};

const DEFAULT_TEMP_PREFIX: &str = ".cachedb_tmp_";
const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The store must exist; additions are refused.
    Read,
    /// Read plus additions. Falls back to `Create` when the store is missing.
    Write,
    /// Start from an empty index, ignoring any existing content.
    Create,
}

impl Mode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, Mode::Read)
    }
}

impl FromStr for Mode {
    type Err = Error;

    /// Accepts `r`, `w` or `c`, optionally followed by `b`.
    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let mode = match chars.next() {
            Some('r') => Mode::Read,
            Some('w') => Mode::Write,
            Some('c') => Mode::Create,
            _ => return Err(Error::InvalidMode(s.to_string())),
        };
        match (chars.next(), chars.next()) {
            (None, _) | (Some('b'), None) => Ok(mode),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Mode::Read => "r",
            Mode::Write => "w",
            Mode::Create => "c",
        };
        f.write_str(c)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// zstd level for records added in this session and for the index.
    pub compression_level: i32,
    /// fsync the replacement file (and its directory) before and after the
    /// rename.
    pub sync_on_commit: bool,
    /// Name prefix of the commit output while it is being written.
    pub temp_prefix: String,
    /// Unix permission bits given to a store committed where no file
    /// existed. A replaced store keeps its current permissions.
    pub file_mode: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_LEVEL,
            sync_on_commit: true,
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Base,
    Pending,
}

/// Result of the most recent successful `find`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastLookup {
    pub key: Vec<u8>,
    pub ordinal: usize,
    pub source: Source,
    /// Offset within the file named by `source`.
    pub offset: u64,
    pub compressed_len: u64,
    pub uncompressed_len: u64,
}

/// Copies of a session's index and lookup, both in creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub entries: Vec<IndexEntry>,
    pub lookup: Vec<(Vec<u8>, Slot)>,
}

pub struct Session {
    path: PathBuf,
    mode: Mode,
    config: SessionConfig,
    snapshot: BaseSnapshot,
    base: Option<BaseFile>,
    /// Length of the base file at open, 0 when there is none. Lookup offsets
    /// at or past this belong to the pending buffer.
    base_len: u64,
    pending: Option<PendingBuffer>,
    index: Index,
    lookup: IndexLookup,
    last: Option<LastLookup>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("records", &self.index.len())
            .field("pending", &self.pending_records())
            .finish()
    }
}

impl Session {
    pub fn open(path: impl AsRef<Path>, mode: Mode) -> Result<Self> {
        Self::open_with(path, mode, SessionConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, mode: Mode, config: SessionConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let opened = match mode {
            Mode::Read | Mode::Write => BaseFile::open(&path)?,
            Mode::Create => None,
        };

        let session = match (mode, opened) {
            (Mode::Read, None) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )))
            }
            (_, Some(OpenedBase { file, index, lookup })) => Self {
                snapshot: BaseSnapshot::Present(*file.identity()),
                base_len: file.len(),
                base: Some(file),
                index,
                lookup,
                path,
                mode,
                config,
                pending: None,
                last: None,
            },
            (_, None) => Self {
                snapshot: BaseSnapshot::take(&path)?,
                base: None,
                base_len: 0,
                index: Index::new(),
                lookup: IndexLookup::empty(0),
                path,
                mode: Mode::Create,
                config,
                pending: None,
                last: None,
            },
        };

        log::debug!(
            "opened {} mode={} records={}",
            session.path.display(),
            session.mode,
            session.index.len()
        );
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Effective mode: `Write` on a missing store reports `Create`.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Header of the base file, `None` when the session started empty.
    pub fn header(&self) -> Option<FileHeader> {
        self.base.as_ref().map(|base| *base.header())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_records() > 0
    }

    pub fn pending_records(&self) -> usize {
        self.pending.as_ref().map_or(0, PendingBuffer::records)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.lookup.contains(key)
    }

    /// Position at `key`. Returns false and forgets the previous lookup on
    /// a miss.
    pub fn find(&mut self, key: &[u8]) -> bool {
        let found = self.lookup.get(key).and_then(|slot| {
            self.index
                .get(slot.ordinal)
                .map(|entry| (slot, entry.compressed_len, entry.uncompressed_len))
        });
        match found {
            Some((slot, compressed_len, uncompressed_len)) => {
                let (source, offset) = if slot.offset < self.base_len {
                    (Source::Base, slot.offset)
                } else {
                    (Source::Pending, slot.offset - self.base_len)
                };
                self.last = Some(LastLookup {
                    key: key.to_vec(),
                    ordinal: slot.ordinal,
                    source,
                    offset,
                    compressed_len,
                    uncompressed_len,
                });
                true
            }
            None => {
                self.last = None;
                false
            }
        }
    }

    pub fn last_lookup(&self) -> Option<&LastLookup> {
        self.last.as_ref()
    }

    /// Metadata stored with the record found by the last `find`.
    pub fn metadata(&self) -> Option<&[u8]> {
        let last = self.last.as_ref()?;
        self.index.get(last.ordinal)?.metadata.as_deref()
    }

    /// Read the record found by the last successful `find`. May be called
    /// repeatedly.
    pub fn fetch(&mut self) -> Result<Vec<u8>> {
        let last = self.last.as_ref().ok_or(Error::NoPriorFind)?;
        let (source, offset, zlen, len) = (
            last.source,
            last.offset,
            last.compressed_len,
            last.uncompressed_len,
        );
        match source {
            Source::Base => self
                .base
                .as_mut()
                .ok_or(Error::Format("record outside base file"))?
                .read_record(offset, zlen, len),
            Source::Pending => self
                .pending
                .as_mut()
                .ok_or(Error::Format("record outside pending buffer"))?
                .read_record(offset, zlen, len),
        }
    }

    /// `find` then `fetch`.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.find(key) {
            return Ok(None);
        }
        self.fetch().map(Some)
    }

    /// Add a record. Returns false, changing nothing, when the session is
    /// read-only or `key` already exists.
    pub fn add(&mut self, key: &[u8], value: &[u8], metadata: Option<&[u8]>) -> Result<bool> {
        if !self.mode.is_writable() {
            log::debug!("refusing add to read-only {}", self.path.display());
            return Ok(false);
        }
        if self.lookup.contains(key) {
            log::debug!("refusing duplicate key in {}", self.path.display());
            return Ok(false);
        }

        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => PendingBuffer::create(parent_dir(&self.path))?,
        };
        let appended = self
            .pending
            .insert(pending)
            .append(value, self.config.compression_level)?;

        let ordinal = self.index.push(IndexEntry {
            key: key.to_vec(),
            compressed_len: appended.compressed_len,
            uncompressed_len: appended.uncompressed_len,
            metadata: metadata.map(<[u8]>::to_vec),
        });
        self.lookup.insert(
            key.to_vec(),
            Slot {
                ordinal,
                offset: self.base_len + appended.offset,
            },
            appended.compressed_len,
        );
        Ok(true)
    }

    pub fn add_value<C: ValueCodec>(
        &mut self,
        codec: &C,
        key: &[u8],
        value: &C::Value,
        metadata: Option<&[u8]>,
    ) -> Result<bool> {
        if !self.mode.is_writable() || self.lookup.contains(key) {
            return Ok(false);
        }
        let bytes = codec.serialize(value)?;
        self.add(key, &bytes, metadata)
    }

    pub fn fetch_value<C: ValueCodec>(&mut self, codec: &C) -> Result<C::Value> {
        let bytes = self.fetch()?;
        codec.deserialize(&bytes)
    }

    pub fn info(&self) -> Info {
        Info {
            entries: self.index.entries().to_vec(),
            lookup: self.lookup.snapshot(),
        }
    }

    /// Close and commit any additions.
    pub fn close(self) -> Result<CommitOutcome> {
        self.close_with(None)
    }

    /// Close, dropping any additions.
    pub fn discard(self) -> Result<CommitOutcome> {
        self.close_with(Some(Mode::Read))
    }

    /// Close the session. `force_mode = Some(Mode::Read)` drops pending
    /// additions instead of committing them; other values change nothing.
    /// Both file handles are released whatever the outcome.
    pub fn close_with(mut self, force_mode: Option<Mode>) -> Result<CommitOutcome> {
        let records = self.pending_records();
        if !self.mode.is_writable() || records == 0 {
            return Ok(CommitOutcome::NoChanges);
        }
        if force_mode == Some(Mode::Read) {
            log::warn!(
                "discarding {} uncommitted records for {}",
                records,
                self.path.display()
            );
            return Ok(CommitOutcome::Discarded { records });
        }
        let pending = match self.pending.as_mut() {
            Some(pending) => pending,
            None => return Ok(CommitOutcome::NoChanges),
        };
        Commit {
            path: &self.path,
            snapshot: &self.snapshot,
            index: &self.index,
            base: self.base.as_mut(),
            pending,
            config: &self.config,
        }
        .run()
    }
}
