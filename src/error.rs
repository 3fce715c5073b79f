use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("format error: {0}")]
    Format(&'static str),
    #[error("corrupt index: {0}")]
    IndexCorrupt(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("corrupt record: expected {expected} bytes, got {actual}")]
    RecordCorrupt { expected: u64, actual: u64 },
    #[error("fetch without a prior successful find")]
    NoPriorFind,
    #[error("invalid open mode: {0:?}")]
    InvalidMode(String),
    #[error("handle registry full ({0} slots)")]
    RegistryFull(usize),
    #[error("unknown handle: {0}")]
    UnknownHandle(usize),
}

impl Error {
    /// True for errors that reject a file at open time: bad fingerprint,
    /// truncation, or an index that does not describe the file.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_) | Error::IndexCorrupt(_))
    }

    /// True for caller mistakes: wrong call order, a bad mode string, or a
    /// misused handle table.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::NoPriorFind
                | Error::InvalidMode(_)
                | Error::RegistryFull(_)
                | Error::UnknownHandle(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
