use crate::{Error, Result};

pub const FINGERPRINT: [u8; 8] = *b"cachedb-";
pub const HEADER_SIZE: usize = 24;

pub const FINGERPRINT_OFFSET: usize = 0;
pub const INDEX_ZLEN_OFFSET: usize = 8;
pub const INDEX_LEN_OFFSET: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub fingerprint: [u8; 8],
    /// Bytes of compressed index immediately following the header.
    pub index_zlen: u64,
    /// Length of the serialized index once decompressed.
    pub index_len: u64,
}

impl FileHeader {
    pub fn new(index_zlen: u64, index_len: u64) -> Self {
        Self {
            fingerprint: FINGERPRINT,
            index_zlen,
            index_len,
        }
    }

    /// All-zero header written before the index lengths are known.
    pub fn placeholder() -> Self {
        Self {
            fingerprint: [0u8; 8],
            index_zlen: 0,
            index_len: 0,
        }
    }

    /// Offset of record 0.
    pub fn data_offset(&self) -> u64 {
        HEADER_SIZE as u64 + self.index_zlen
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[FINGERPRINT_OFFSET..FINGERPRINT_OFFSET + 8].copy_from_slice(&self.fingerprint);
        buf[INDEX_ZLEN_OFFSET..INDEX_ZLEN_OFFSET + 8].copy_from_slice(&self.index_zlen.to_le_bytes());
        buf[INDEX_LEN_OFFSET..INDEX_LEN_OFFSET + 8].copy_from_slice(&self.index_len.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Format("truncated header"));
        }
        let mut fingerprint = [0u8; 8];
        fingerprint.copy_from_slice(&bytes[FINGERPRINT_OFFSET..FINGERPRINT_OFFSET + 8]);
        if fingerprint != FINGERPRINT {
            return Err(Error::Format("fingerprint mismatch"));
        }
        let index_zlen = u64::from_le_bytes(
            bytes[INDEX_ZLEN_OFFSET..INDEX_ZLEN_OFFSET + 8]
                .try_into()
                .expect("slice length"),
        );
        let index_len = u64::from_le_bytes(
            bytes[INDEX_LEN_OFFSET..INDEX_LEN_OFFSET + 8]
                .try_into()
                .expect("slice length"),
        );
        Ok(Self {
            fingerprint,
            index_zlen,
            index_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip_preserves_lengths() {
        let header = FileHeader::new(0x1122_3344, 0x5566_7788_99AA);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..8], b"cachedb-");
        let decoded = FileHeader::from_bytes(&bytes).expect("decode header");
        assert_eq!(decoded, header);
        assert_eq!(decoded.data_offset(), HEADER_SIZE as u64 + 0x1122_3344);
    }

    #[test]
    fn placeholder_is_rejected() {
        let bytes = FileHeader::placeholder().to_bytes();
        assert!(matches!(
            FileHeader::from_bytes(&bytes),
            Err(Error::Format("fingerprint mismatch"))
        ));
    }

    #[test]
    fn single_flipped_fingerprint_byte_is_rejected() {
        let mut bytes = FileHeader::new(10, 20).to_bytes();
        bytes[3] ^= 0x01;
        assert!(FileHeader::from_bytes(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn short_input_is_truncation() {
        let bytes = FileHeader::new(10, 20).to_bytes();
        assert!(matches!(
            FileHeader::from_bytes(&bytes[..HEADER_SIZE - 1]),
            Err(Error::Format("truncated header"))
        ));
    }
}
