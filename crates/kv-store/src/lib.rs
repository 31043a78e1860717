//! # kvscope-store
//!
//! A small on-disk sorted key-value store: a directory of immutable tables, read through
//! snapshot-consistent cursors. `kvscope` analyzes stores in this format.
//!
//! ## Directory
//!
//! ```text
//! store/
//! ├── LOCK                        advisory-locked by the writable handle
//! ├── 00000000000000000001.sst    oldest table
//! └── 00000000000000000002.sst    newest table, overrides older tables on equal keys
//! ```
//!
//! ## Table
//!
//! ┌─────────────────────────────────────────────────────────────────────────────────────┐
//! │ Table                                                                               │
//! │┌ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─┌ ─ ─ ─ ─ ┬ ─ ─ ─┌ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─┌ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ┐│
//! │  magic     version  │ block   │ ...  │ block   │ block meta │ meta offset │  magic   │
//! ││ "KVSC"  │   u8     │ bytes   │      │ bytes   │   bytes    │    u32      │ "KVSC" ││
//! │ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘│
//! └─────────────────────────────────────────────────────────────────────────────────────┘
//!
//! All integers are little-endian.
//!
//! ### Block
//!
//! A block is a run of entries followed by the entry count. Each entry stores the length of
//! the prefix it shares with the previous key, the key suffix and the value:
//!
//! ┌────────────────────────────────────────────────────────────────────┐
//! │ Entry                                                              │
//! │┌ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─ ─ ─┬ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─┬ ─ ─ ─ ─ ┐│
//! │ shared len    key suffix len   value len     key suffix    value   │
//! ││    u16      │      u16       │    u32      │   bytes    │  bytes ││
//! │ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘│
//! └────────────────────────────────────────────────────────────────────┘
//!
//! Encoding:
//! 1. Write the entries and the entry count (u32).
//! 2. **Compress** the result with LZ4 (size prepended) if that makes it smaller.
//! 3. Append the xxhash_32 checksum of the stored bytes.
//!
//! Decoding verifies the checksum (unless disabled), decompresses and rebuilds every key.
//! Blocks are decoded lazily by cursors, so a damaged block surfaces as a cursor error rather
//! than an open error.
//!
//! ### Block Meta
//!
//! `u32` block count, then for each block
//! `offset u32 | len u32 | compression u8 | first key len u16 | first key | last key len u16 | last key`,
//! then the xxhash_32 checksum of the section. The block meta is validated when a table is
//! opened.
pub mod compress;
pub mod error;
pub mod options;
pub mod store;
pub mod table;

mod block;
mod utils;

pub use compress::CompressionType;
pub use error::{StoreError, StoreResult};
pub use options::StoreOptions;
pub use store::{Cursor, Snapshot, Store, LOCK_FILE_NAME};
pub use table::TableBuilder;

pub(crate) const SIZE_OF_U8: usize = std::mem::size_of::<u8>();
pub(crate) const SIZE_OF_U16: usize = std::mem::size_of::<u16>();
pub(crate) const SIZE_OF_U32: usize = std::mem::size_of::<u32>();
