/// The separator that ends a grouping prefix unless configured otherwise.
pub const DEFAULT_SEPARATOR: u8 = b'/';

/// Grouping prefix of `key`: the first `max_len` bytes, cut after the last `/` they contain.
///
/// ```
/// use kvscope::extract_prefix;
///
/// assert_eq!(extract_prefix(b"a/b/c", 4), b"a/b/");
/// assert_eq!(extract_prefix(b"abcdef", 4), b"abcd");
/// assert_eq!(extract_prefix(b"ab", 10), b"ab");
/// ```
pub fn extract_prefix(key: &[u8], max_len: usize) -> &[u8] {
    extract_prefix_with(key, max_len, DEFAULT_SEPARATOR)
}

/// [`extract_prefix`] with a custom separator.
///
/// The window is counted in bytes, so a multi-byte UTF-8 character may be cut.
pub fn extract_prefix_with(key: &[u8], max_len: usize, separator: u8) -> &[u8] {
    let window = &key[..key.len().min(max_len)];
    match window.iter().rposition(|&b| b == separator) {
        Some(i) => &window[..=i],
        None => window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cut_after_last_separator_in_window() {
        assert_eq!(extract_prefix(b"a/b/c", 4), b"a/b/");
        assert_eq!(extract_prefix(b"a/b/c", 3), b"a/");
        assert_eq!(extract_prefix(b"users/42/profile", 30), b"users/42/");
    }

    #[test]
    fn no_separator_truncates() {
        assert_eq!(extract_prefix(b"abcdef", 4), b"abcd");
        assert_eq!(extract_prefix(b"ab", 10), b"ab");
    }

    #[test]
    fn separator_only_beyond_window_is_ignored() {
        assert_eq!(extract_prefix(b"abcd/ef", 4), b"abcd");
        assert_eq!(extract_prefix(b"abcd/ef", 5), b"abcd/");
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(extract_prefix(b"", 30), b"");
        assert_eq!(extract_prefix(b"/abc", 3), b"/");
        assert_eq!(extract_prefix(b"abc", 0), b"");
    }

    #[test]
    fn custom_separator() {
        assert_eq!(extract_prefix_with(b"user:1:name", 30, b':'), b"user:1:");
        assert_eq!(extract_prefix_with(b"a/b", 30, b':'), b"a/b");
    }

    proptest! {
        #[test]
        fn deterministic_and_bounded(key in proptest::collection::vec(any::<u8>(), 0..64), max_len in 0usize..80) {
            let a = extract_prefix(&key, max_len);
            let b = extract_prefix(&key, max_len);
            prop_assert_eq!(a, b);
            prop_assert!(a.len() <= key.len().min(max_len));
            prop_assert!(key.starts_with(a));
        }

        #[test]
        fn ends_with_separator_when_window_has_one(key in "[a-c/]{0,40}", max_len in 0usize..50) {
            let window = &key.as_bytes()[..key.len().min(max_len)];
            let prefix = extract_prefix(key.as_bytes(), max_len);
            if window.contains(&b'/') {
                prop_assert_eq!(prefix.last(), Some(&b'/'));
                prop_assert!(!window[prefix.len()..].contains(&b'/'));
            } else {
                prop_assert_eq!(prefix, window);
            }
        }
    }
}
