//! File-based, append-mostly constant store for caching derived artifacts.
//!
//! A store is a single file: a fixed header, a compressed index, then one
//! compressed record per key in creation order. Any number of processes may
//! read a store concurrently. A session opened for writing buffers new
//! records privately and publishes them on close by atomically replacing the
//! file, provided no other writer replaced it first.
//!
//! ```rust,no_run
//! use cachedb::{Mode, Session};
//!
//! # fn main() -> cachedb::Result<()> {
//! let mut db = Session::open("messages.cdb", Mode::Write)?;
//! if !db.find(b"en:mainpage") {
//!     db.add(b"en:mainpage", b"Main Page", None)?;
//! }
//! db.close()?;
//!
//! let mut db = Session::open("messages.cdb", Mode::Read)?;
//! assert!(db.find(b"en:mainpage"));
//! let value = db.fetch()?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

pub mod base;
pub mod codec;
pub mod commit;
pub mod compress;
pub mod error;
pub mod header;
pub mod index;
pub mod pending;
pub mod registry;
pub mod session;

pub use codec::{BincodeCodec, RawCodec, ValueCodec};
pub use commit::CommitOutcome;
pub use error::{Error, Result};
pub use header::{FileHeader, FINGERPRINT, HEADER_SIZE};
pub use index::{IndexEntry, Slot};
pub use registry::{HandleId, HandleRegistry, RegistryConfig};
pub use session::{Info, LastLookup, Mode, Session, SessionConfig, Source};
