//! Read-only access to the published base file.

use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::compress;
use crate::header::{FileHeader, HEADER_SIZE};
use crate::index::{decode_index, Index, IndexLookup};
use crate::{Error, Result};

/// Identity of a file as seen by `stat`. A commit replaces the base file
/// with a new inode, so any published commit changes this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
    pub mtime: Option<SystemTime>,
    pub size: u64,
}

impl FileIdentity {
    pub fn from_metadata(meta: &Metadata) -> Self {
        let (dev, ino) = dev_ino(meta);
        Self {
            dev,
            ino,
            mtime: meta.modified().ok(),
            size: meta.len(),
        }
    }

    /// `None` when nothing exists at `path`.
    pub fn stat(path: &Path) -> Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(Self::from_metadata(&meta))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(unix)]
fn dev_ino(meta: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn dev_ino(_meta: &Metadata) -> (u64, u64) {
    (0, 0)
}

/// What the base path looked like when a session opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSnapshot {
    Absent,
    Present(FileIdentity),
}

impl BaseSnapshot {
    pub fn take(path: &Path) -> Result<Self> {
        Ok(match FileIdentity::stat(path)? {
            Some(identity) => BaseSnapshot::Present(identity),
            None => BaseSnapshot::Absent,
        })
    }

    /// Re-stat `path` and report whether it is still what was snapshotted.
    /// Any absent <-> present transition counts as a change.
    pub fn unchanged(&self, path: &Path) -> Result<bool> {
        let current = FileIdentity::stat(path)?;
        Ok(match (self, current) {
            (BaseSnapshot::Absent, None) => true,
            (BaseSnapshot::Present(then), Some(now)) => {
                then.dev == now.dev
                    && then.ino == now.ino
                    && then.mtime == now.mtime
                    && then.size == now.size
            }
            _ => false,
        })
    }
}

/// A file handle that remembers where its cursor is, so records read in
/// creation order never pay for a seek.
#[derive(Debug)]
pub(crate) struct CursorFile {
    file: File,
    pos: u64,
    seeks: u64,
}

impl CursorFile {
    pub(crate) fn new(file: File, pos: u64) -> Self {
        Self { file, pos, seeks: 0 }
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        if self.pos != offset {
            self.file.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
            self.seeks += 1;
        }
        Ok(())
    }

    pub(crate) fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.seek_to(offset)?;
        let mut buf = vec![0u8; len as usize];
        if let Err(err) = self.file.read_exact(&mut buf) {
            // Cursor position is unknown after a short read.
            self.pos = u64::MAX;
            return Err(err.into());
        }
        self.pos = offset + len;
        Ok(buf)
    }

    /// Write `bytes` at `offset`, which the caller guarantees is end-of-file.
    pub(crate) fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.seek_to(offset)?;
        if let Err(err) = self.file.write_all(bytes) {
            self.pos = u64::MAX;
            return Err(err.into());
        }
        self.pos = offset + bytes.len() as u64;
        Ok(())
    }

    /// Stream `len` bytes starting at `offset` into `out` without decoding.
    pub(crate) fn copy_to(&mut self, offset: u64, len: u64, out: &mut impl Write) -> Result<()> {
        self.seek_to(offset)?;
        let copied = io::copy(&mut (&mut self.file).take(len), out);
        let copied = match copied {
            Ok(copied) => copied,
            Err(err) => {
                self.pos = u64::MAX;
                return Err(err.into());
            }
        };
        self.pos = offset + copied;
        if copied != len {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("copied {copied} of {len} record bytes"),
            )));
        }
        Ok(())
    }

    pub(crate) fn seeks(&self) -> u64 {
        self.seeks
    }
}

#[derive(Debug)]
pub struct OpenedBase {
    pub file: BaseFile,
    pub index: Index,
    pub lookup: IndexLookup,
}

#[derive(Debug)]
pub struct BaseFile {
    cursor: CursorFile,
    header: FileHeader,
    identity: FileIdentity,
}

impl BaseFile {
    /// Open and validate the base file. `Ok(None)` when it does not exist.
    pub fn open(path: &Path) -> Result<Option<OpenedBase>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let identity = FileIdentity::from_metadata(&file.metadata()?);

        let mut buf = [0u8; HEADER_SIZE];
        read_exact_or(&mut file, &mut buf, "truncated header")?;
        let header = FileHeader::from_bytes(&buf)?;

        if header.index_zlen > identity.size.saturating_sub(HEADER_SIZE as u64) {
            return Err(Error::Format("truncated index"));
        }
        let mut compressed = vec![0u8; header.index_zlen as usize];
        read_exact_or(&mut file, &mut compressed, "truncated index")?;
        let index = decode_index(&compressed, header.index_len)?;

        let lookup = IndexLookup::build(&index, header.data_offset())?;
        if lookup.end() != identity.size {
            return Err(Error::Format("index does not account for file size"));
        }

        log::debug!(
            "opened {} with {} records ({} bytes)",
            path.display(),
            index.len(),
            identity.size
        );

        Ok(Some(OpenedBase {
            file: BaseFile {
                cursor: CursorFile::new(file, header.data_offset()),
                header,
                identity,
            },
            index,
            lookup,
        }))
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    pub fn len(&self) -> u64 {
        self.identity.size
    }

    pub fn is_empty(&self) -> bool {
        self.identity.size == 0
    }

    /// Read and decompress the record stored at `offset`.
    pub fn read_record(&mut self, offset: u64, zlen: u64, len: u64) -> Result<Vec<u8>> {
        if offset < self.header.data_offset() || offset + zlen > self.identity.size {
            return Err(Error::Format("record outside base file"));
        }
        let compressed = self.cursor.read_at(offset, zlen)?;
        compress::decompress(&compressed, len)
    }

    /// Copy the whole record region verbatim.
    pub fn copy_records_to(&mut self, out: &mut impl Write) -> Result<()> {
        let start = self.header.data_offset();
        self.cursor.copy_to(start, self.identity.size - start, out)
    }

    pub fn seeks(&self) -> u64 {
        self.cursor.seeks()
    }
}

fn read_exact_or(file: &mut File, buf: &mut [u8], what: &'static str) -> Result<()> {
    match file.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(Error::Format(what)),
        Err(err) => Err(err.into()),
    }
}
