use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    error::ScanError,
    prefix::{extract_prefix_with, DEFAULT_SEPARATOR},
    view::{OrderedCursor, OrderedSnapshot},
};

/// Window used to group keys into top prefixes.
pub const DEFAULT_PREFIX_LEN: usize = 30;

/// How many keys were seen under each grouping prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: FxHashMap<Bytes, u64>,
    total: u64,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, prefix: &[u8]) {
        self.total += 1;
        if let Some(count) = self.counts.get_mut(prefix) {
            *count += 1;
        } else {
            self.counts.insert(Bytes::copy_from_slice(prefix), 1);
        }
    }

    /// Number of keys recorded, which is the sum of all counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct prefixes.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, prefix: &[u8]) -> u64 {
        self.counts.get(prefix).copied().unwrap_or(0)
    }

    /// Entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, u64)> + '_ {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    /// Entries whose count is strictly greater than `threshold`, in no particular order.
    pub fn above(&self, threshold: u64) -> impl Iterator<Item = (&Bytes, u64)> + '_ {
        self.iter().filter(move |(_, count)| *count > threshold)
    }

    /// Entries by descending count, ties broken by ascending prefix.
    pub fn sorted_desc(&self) -> Vec<(&Bytes, u64)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable_by(|(ka, ca), (kb, cb)| cb.cmp(ca).then_with(|| ka.cmp(kb)));
        entries
    }
}

/// Count every key of `snapshot` under its grouping prefix (see [`crate::extract_prefix`]).
///
/// Visits each key exactly once. A cursor failure aborts the scan and no table is returned.
pub fn top_prefixes<S: OrderedSnapshot>(
    snapshot: &S,
    prefix_len: usize,
) -> Result<FrequencyTable, ScanError> {
    top_prefixes_with(snapshot, prefix_len, DEFAULT_SEPARATOR)
}

/// [`top_prefixes`] with a custom separator.
pub fn top_prefixes_with<S: OrderedSnapshot>(
    snapshot: &S,
    prefix_len: usize,
    separator: u8,
) -> Result<FrequencyTable, ScanError> {
    let mut table = FrequencyTable::new();
    let mut cursor = snapshot.cursor();
    cursor.rewind().map_err(ScanError::new)?;
    while cursor.valid() {
        let prefix = extract_prefix_with(cursor.key(), prefix_len, separator);
        trace!(?prefix, "record");
        table.record(prefix);
        cursor.advance().map_err(ScanError::new)?;
    }

    debug!(
        keys = table.total(),
        prefixes = table.len(),
        "top-prefix scan finished"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::MemSnapshot;

    #[test]
    fn groups_by_prefix() {
        let snapshot: MemSnapshot = [
            ("users/1", ""),
            ("users/2", ""),
            ("users/3/avatar", ""),
            ("config", ""),
        ]
        .into_iter()
        .collect();
        let table = top_prefixes(&snapshot, 30).unwrap();
        assert_eq!(table.total(), 4);
        assert_eq!(table.get(b"users/"), 2);
        assert_eq!(table.get(b"users/3/"), 1);
        assert_eq!(table.get(b"config"), 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn empty_snapshot() {
        let table = top_prefixes(&MemSnapshot::default(), 30).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.total(), 0);
    }

    #[test]
    fn threshold_is_strict() {
        let mut table = FrequencyTable::new();
        for _ in 0..5 {
            table.record(b"five/");
        }
        for _ in 0..6 {
            table.record(b"six/");
        }
        let above: Vec<_> = table.above(5).map(|(k, c)| (k.clone(), c)).collect();
        assert_eq!(above, vec![(Bytes::from_static(b"six/"), 6)]);
    }

    #[test]
    fn sorted_desc_breaks_ties_by_prefix() {
        let mut table = FrequencyTable::new();
        for prefix in [&b"b"[..], b"a", b"c", b"c"] {
            table.record(prefix);
        }
        let sorted: Vec<_> = table
            .sorted_desc()
            .into_iter()
            .map(|(k, c)| (k.to_vec(), c))
            .collect();
        assert_eq!(
            sorted,
            vec![(b"c".to_vec(), 2), (b"a".to_vec(), 1), (b"b".to_vec(), 1)]
        );
    }
}
