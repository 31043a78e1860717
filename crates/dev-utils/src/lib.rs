use std::path::Path;

use kvscope_store::{Store, StoreOptions};
use rand::Rng;
use tempfile::TempDir;

/// Install a backtrace printer, and a tracing subscriber when the `DEBUG` env var was set
/// at build time. `RUST_LOG` filters the output, defaulting to everything.
pub fn setup_test_log() {
    color_backtrace::install();
    use tracing_subscriber::EnvFilter;
    if option_env!("DEBUG").is_some() {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));
        // another test binary hook may have installed it already
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_line_number(true)
            .with_file(true)
            .try_init();
    }
}

/// A store living in a temporary directory, removed on drop.
#[derive(Debug)]
pub struct TempStore {
    // dropped before the directory goes away
    store: Store,
    dir: TempDir,
}

impl TempStore {
    pub fn new() -> Self {
        Self::with_options(StoreOptions::new())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), options.create_if_missing(true)).unwrap();
        Self { store, dir }
    }

    /// A store holding `entries` in a single table.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let temp = Self::new();
        temp.store.ingest(entries).unwrap();
        temp
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Close the store, keeping the directory. Used to hand the directory to another opener.
    pub fn close(self) -> TempDir {
        let Self { store, dir } = self;
        drop(store);
        dir
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `n` keys shaped like `<namespace>/<id>` with a value of `0..max_value_len` bytes.
pub fn namespaced_entries(
    rng: &mut impl Rng,
    namespaces: &[&str],
    n: usize,
    max_value_len: usize,
) -> Vec<(String, Vec<u8>)> {
    (0..n)
        .map(|i| {
            let ns = namespaces[rng.gen_range(0..namespaces.len())];
            let value = vec![b'v'; rng.gen_range(0..=max_value_len)];
            (format!("{}/{:08}", ns, i), value)
        })
        .collect()
}
