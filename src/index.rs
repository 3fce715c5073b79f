//! The record index: an ordered list of entries in creation order plus the
//! derived key -> (ordinal, offset) lookup.
//!
//! On disk the index is the bincode encoding of `Vec<IndexEntry>`, zstd
//! compressed, stored right after the file header. Record offsets are not
//! stored; they are recovered by prefix-summing `compressed_len` in ordinal
//! order starting at the end of the index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::{BincodeCodec, ValueCodec};
use crate::compress::{self, Compressed};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub compressed_len: u64,
    pub uncompressed_len: u64,
    pub metadata: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub ordinal: usize,
    pub offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&IndexEntry> {
        self.entries.get(ordinal)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append an entry and return its ordinal.
    pub fn push(&mut self, entry: IndexEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Sum of all record lengths, i.e. the size of the record region.
    pub fn record_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.compressed_len).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexLookup {
    slots: HashMap<Vec<u8>, Slot>,
    end: u64,
}

impl IndexLookup {
    /// Empty lookup whose next record lands at `data_offset`.
    pub fn empty(data_offset: u64) -> Self {
        Self {
            slots: HashMap::new(),
            end: data_offset,
        }
    }

    /// Prefix-sum the record lengths of `index` starting at `data_offset`.
    pub fn build(index: &Index, data_offset: u64) -> Result<Self> {
        let mut slots = HashMap::with_capacity(index.len());
        let mut offset = data_offset;
        for (ordinal, entry) in index.entries().iter().enumerate() {
            if slots.insert(entry.key.clone(), Slot { ordinal, offset }).is_some() {
                return Err(Error::IndexCorrupt(format!(
                    "duplicate key at ordinal {ordinal}"
                )));
            }
            offset = offset
                .checked_add(entry.compressed_len)
                .ok_or_else(|| Error::IndexCorrupt("record offsets overflow".to_string()))?;
        }
        Ok(Self { slots, end: offset })
    }

    pub fn get(&self, key: &[u8]) -> Option<Slot> {
        self.slots.get(key).copied()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.slots.contains_key(key)
    }

    /// Offset one past the last record.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record a newly appended entry at `offset`. The caller has already
    /// rejected duplicate keys.
    pub fn insert(&mut self, key: Vec<u8>, slot: Slot, compressed_len: u64) {
        self.end = slot.offset + compressed_len;
        self.slots.insert(key, slot);
    }

    /// Lookup contents ordered by ordinal.
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Slot)> {
        let mut out: Vec<_> = self
            .slots
            .iter()
            .map(|(key, slot)| (key.clone(), *slot))
            .collect();
        out.sort_by_key(|(_, slot)| slot.ordinal);
        out
    }
}

pub fn encode_index(index: &Index, level: i32) -> Result<Compressed> {
    let raw = BincodeCodec::<Vec<IndexEntry>>::new().serialize(&index.entries)?;
    compress::compress(&raw, level)
}

pub fn decode_index(compressed: &[u8], uncompressed_len: u64) -> Result<Index> {
    let raw = compress::decompress(compressed, uncompressed_len).map_err(|err| match err {
        Error::RecordCorrupt { expected, actual } => Error::IndexCorrupt(format!(
            "index decompressed to {actual} bytes, header says {expected}"
        )),
        other => Error::IndexCorrupt(other.to_string()),
    })?;
    let entries = BincodeCodec::<Vec<IndexEntry>>::new()
        .deserialize(&raw)
        .map_err(|err| Error::IndexCorrupt(err.to_string()))?;
    Ok(Index::from_entries(entries))
}
