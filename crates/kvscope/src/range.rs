use tracing::debug;

use crate::{
    error::ScanError,
    view::{OrderedCursor, OrderedSnapshot},
};

/// Keys found under a literal prefix and their combined size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeReport {
    pub count: u64,
    /// Sum of `key length + value size` over the counted keys.
    pub size: u64,
}

/// Count and size the keys of `snapshot` starting with `prefix`.
///
/// Seeks to `prefix` and stops at the first key outside it, so only the matching range
/// (plus one boundary key) is visited. An empty prefix matches every key.
pub fn analyze_prefix<S: OrderedSnapshot>(
    snapshot: &S,
    prefix: &[u8],
) -> Result<RangeReport, ScanError> {
    let mut report = RangeReport::default();
    let mut cursor = snapshot.cursor();
    cursor.seek(prefix).map_err(ScanError::new)?;
    while cursor.valid_for_prefix(prefix) {
        let key = cursor.key();
        // only exact byte-prefix matches count, whatever bound the cursor applies
        if key.starts_with(prefix) {
            report.count += 1;
            report.size += key.len() as u64 + cursor.value_size();
        }
        cursor.advance().map_err(ScanError::new)?;
    }

    debug!(
        prefix = %String::from_utf8_lossy(prefix),
        count = report.count,
        size = report.size,
        "prefix scan finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::MemSnapshot;

    fn snapshot() -> MemSnapshot {
        [
            ("a/1", "xx"),
            ("a/2", "yyy"),
            ("a0", "z"),
            ("b/1", "w"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn counts_keys_and_sizes() {
        let report = analyze_prefix(&snapshot(), b"a/").unwrap();
        assert_eq!(report, RangeReport { count: 2, size: 3 + 2 + 3 + 3 });
    }

    #[test]
    fn missing_prefix_is_empty() {
        assert_eq!(
            analyze_prefix(&snapshot(), b"zz").unwrap(),
            RangeReport::default()
        );
        assert_eq!(
            analyze_prefix(&MemSnapshot::default(), b"a").unwrap(),
            RangeReport::default()
        );
    }

    #[test]
    fn empty_prefix_matches_everything() {
        let report = analyze_prefix(&snapshot(), b"").unwrap();
        assert_eq!(report.count, 4);
        assert_eq!(report.size, 3 + 2 + 3 + 3 + 2 + 1 + 3 + 1);
    }
}
