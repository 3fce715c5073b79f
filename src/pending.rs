//! Session-private buffer for records added since open.
//!
//! The buffer is an anonymous temp file in the base file's directory, so the
//! commit output built from it lives on the same filesystem as the base file.

use std::io::Write;
use std::path::Path;

use crate::base::CursorFile;
use crate::compress;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Offset of the record inside the pending buffer.
    pub offset: u64,
    pub compressed_len: u64,
    pub uncompressed_len: u64,
}

#[derive(Debug)]
pub struct PendingBuffer {
    cursor: CursorFile,
    len: u64,
    records: usize,
}

impl PendingBuffer {
    /// The file is unlinked as soon as it is created; it disappears with
    /// the handle however the process exits.
    pub fn create(dir: &Path) -> Result<Self> {
        let file = tempfile::tempfile_in(dir)?;
        log::debug!("created pending buffer in {}", dir.display());
        Ok(Self {
            cursor: CursorFile::new(file, 0),
            len: 0,
            records: 0,
        })
    }

    /// Compress `value` and append it at end-of-file.
    pub fn append(&mut self, value: &[u8], level: i32) -> Result<Appended> {
        let packed = compress::compress(value, level)?;
        let offset = self.len;
        self.cursor.write_at(offset, &packed.bytes)?;
        self.len += packed.compressed_len;
        self.records += 1;
        Ok(Appended {
            offset,
            compressed_len: packed.compressed_len,
            uncompressed_len: packed.uncompressed_len,
        })
    }

    pub fn read_record(&mut self, offset: u64, zlen: u64, len: u64) -> Result<Vec<u8>> {
        if offset + zlen > self.len {
            return Err(Error::Format("record outside pending buffer"));
        }
        let compressed = self.cursor.read_at(offset, zlen)?;
        compress::decompress(&compressed, len)
    }

    /// Copy every pending record, in add order, into `out`.
    pub fn copy_to(&mut self, out: &mut impl Write) -> Result<()> {
        self.cursor.copy_to(0, self.len, out)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn records(&self) -> usize {
        self.records
    }
}
