use std::path::PathBuf;

use kvscope_store::StoreOptions;

use crate::{prefix::DEFAULT_SEPARATOR, top::DEFAULT_PREFIX_LEN};

/// Top prefixes are printed when seen more than this many times.
pub const DEFAULT_MIN_COUNT: u64 = 5;

/// What to analyze and how to print it.
///
/// ```
/// use kvscope::Config;
///
/// let config = Config::new("/var/lib/app/store")
///     .prefixes(["users/", "sessions/"])
///     .sort(true);
/// assert_eq!(config.prefix_len, 30);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub store_dir: PathBuf,
    /// Literal prefixes analyzed individually, in this order. Raw bytes, not necessarily UTF-8.
    pub prefixes: Vec<Vec<u8>>,
    pub prefix_len: usize,
    pub min_count: u64,
    pub separator: u8,
    /// Print top prefixes by descending count instead of table order.
    pub sort: bool,
    pub store_options: StoreOptions,
}

impl Config {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            prefixes: Vec::new(),
            prefix_len: DEFAULT_PREFIX_LEN,
            min_count: DEFAULT_MIN_COUNT,
            separator: DEFAULT_SEPARATOR,
            sort: false,
            store_options: StoreOptions::new(),
        }
    }

    pub fn prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn prefix_len(mut self, prefix_len: usize) -> Self {
        self.prefix_len = prefix_len;
        self
    }

    pub fn min_count(mut self, min_count: u64) -> Self {
        self.min_count = min_count;
        self
    }

    pub fn separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    pub fn store_options(mut self, store_options: StoreOptions) -> Self {
        self.store_options = store_options;
        self
    }
}
