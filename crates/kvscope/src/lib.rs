//! # kvscope
//!
//! Key-prefix statistics for a [`kvscope_store`] directory, without modifying it.
//!
//! Two reports are produced:
//!
//! - **Top prefixes.** One full scan groups every key under its grouping prefix, the first
//!   `prefix_len` bytes cut after their last separator (`/` by default). Prefixes seen more
//!   than `min_count` times are printed as `<prefix> <count>`.
//! - **Prefix ranges.** Each literal prefix is sought directly and scanned until the first
//!   key outside it, printed as `Prefix '<p>': <count> keys, <size> bytes`, where the size
//!   sums key length and value size.
//!
//! Each scan reads its own snapshot, so writers running alongside never show up mid-scan.
//!
//! ```
//! use kvscope::{analyze_prefix, top_prefixes, MemSnapshot};
//!
//! let snapshot: MemSnapshot = [("users/1", "ab"), ("users/2", "c"), ("config", "")]
//!     .into_iter()
//!     .collect();
//! let table = top_prefixes(&snapshot, 30).unwrap();
//! assert_eq!(table.get(b"users/"), 2);
//!
//! let report = analyze_prefix(&snapshot, b"users/").unwrap();
//! assert_eq!((report.count, report.size), (2, 7 + 2 + 7 + 1));
//! ```
pub mod config;
pub mod error;
pub mod prefix;
pub mod range;
pub mod report;
pub mod top;
pub mod view;

pub use config::{Config, DEFAULT_MIN_COUNT};
pub use error::{AnalyzeError, AnalyzeResult, ScanError};
pub use prefix::{extract_prefix, extract_prefix_with, DEFAULT_SEPARATOR};
pub use range::{analyze_prefix, RangeReport};
pub use report::{report, run};
pub use top::{top_prefixes, top_prefixes_with, FrequencyTable, DEFAULT_PREFIX_LEN};
pub use view::{MemCursor, MemSnapshot, OrderedCursor, OrderedSnapshot, SnapshotSource};
