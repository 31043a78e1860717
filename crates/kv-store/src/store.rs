use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fmt::Debug,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use fs4::fs_std::FileExt;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::{
    error::{StoreError, StoreResult},
    options::StoreOptions,
    table::{BlockCache, Table, TableBuilder, TableCursor},
};

pub const LOCK_FILE_NAME: &str = "LOCK";
const TABLE_EXT: &str = "sst";
const TMP_EXT: &str = "tmp";

fn table_file_name(id: u64) -> String {
    format!("{:020}.{}", id, TABLE_EXT)
}

/// Table offsets are stored as `u32`.
const MAX_TABLE_SIZE: usize = u32::MAX as usize;

fn check_table_size(len: usize) -> StoreResult<()> {
    if len > MAX_TABLE_SIZE {
        return Err(StoreError::InvalidArgument(
            format!("table of {} bytes exceeds the {} byte limit", len, MAX_TABLE_SIZE).into(),
        ));
    }
    Ok(())
}

fn table_id(path: &Path) -> Option<u64> {
    if path.extension()? != OsStr::new(TABLE_EXT) {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Exclusive ownership of a store directory.
///
/// Held as an OS advisory lock on the `LOCK` file, so it goes away with the file handle, even
/// when the process dies without running destructors. The file itself stays in the directory.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
    file: fs::File,
}

impl LockFile {
    fn acquire(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(StoreError::io(&path))?;
        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs4::lock_contended_error().raw_os_error() {
                return Err(StoreError::Locked(dir.to_path_buf()));
            }
            return Err(StoreError::io(&path)(e));
        }
        // the owner's pid, for humans
        file.set_len(0).map_err(StoreError::io(&path))?;
        writeln!(file, "{}", std::process::id()).map_err(StoreError::io(&path))?;
        Ok(LockFile { path, file })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release the store lock");
        }
    }
}

/// A directory of immutable sorted tables.
///
/// Readers work on [`Snapshot`]s: a snapshot pins the set of tables that existed when it was
/// taken, so tables ingested later are invisible to it. When a key is present in several
/// tables, the most recently ingested table wins.
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    options: StoreOptions,
    // From the oldest to the newest
    tables: RwLock<Arc<[Arc<Table>]>>,
    next_table_id: AtomicU64,
    live_snapshots: Arc<AtomicUsize>,
    cache: Option<Arc<BlockCache>>,
    _lock: Option<LockFile>,
}

impl Store {
    /// Open the store at `dir`.
    ///
    /// Every table's header, footer and block meta are validated here; block bodies are
    /// only decoded (and their checksums verified) when a cursor reaches them.
    ///
    /// # Errors
    /// - [StoreError::NotFound] / [StoreError::NotADirectory]
    /// - [StoreError::Locked] when another handle holds the directory lock
    /// - [StoreError::Corrupted] / [StoreError::UnsupportedVersion] for unreadable tables
    pub fn open(dir: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(StoreError::NotADirectory(dir)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if !options.is_create_if_missing() || options.is_read_only() {
                    return Err(StoreError::NotFound(dir));
                }
                fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;
            }
            Err(e) => return Err(StoreError::io(&dir)(e)),
        }

        let lock = if options.is_read_only() {
            None
        } else {
            Some(LockFile::acquire(&dir)?)
        };
        let cache = (options.get_cache_blocks() > 0)
            .then(|| Arc::new(BlockCache::new(options.get_cache_blocks())));

        let mut table_files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(StoreError::io(&dir))? {
            let path = entry.map_err(StoreError::io(&dir))?.path();
            match table_id(&path) {
                Some(id) => table_files.push((id, path)),
                None if path.extension() == Some(OsStr::new(TMP_EXT)) => {
                    warn!(path = %path.display(), "ignoring unfinished table file");
                }
                None => {}
            }
        }
        table_files.sort_unstable_by_key(|(id, _)| *id);

        let tables = table_files
            .into_iter()
            .map(|(id, path)| {
                Table::open(path, id, cache.clone(), options.is_verify_checksums()).map(Arc::new)
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let next_table_id = tables.last().map_or(1, |t| t.id() + 1);
        debug!(
            dir = %dir.display(),
            tables = tables.len(),
            bytes = tables.iter().map(|t| t.size()).sum::<usize>(),
            "store opened"
        );

        Ok(Self {
            dir,
            options,
            tables: RwLock::new(tables.into()),
            next_table_id: AtomicU64::new(next_table_id),
            live_snapshots: Arc::new(AtomicUsize::new(0)),
            cache,
            _lock: lock,
        })
    }

    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// The number of snapshots that have been taken and not yet dropped.
    pub fn live_snapshots(&self) -> usize {
        self.live_snapshots.load(Ordering::Acquire)
    }

    /// Take a snapshot of the current table set. Prefer [`Store::view`], which scopes it.
    pub fn snapshot(&self) -> Snapshot {
        let tables = Arc::clone(&self.tables.read());
        self.live_snapshots.fetch_add(1, Ordering::AcqRel);
        trace!(tables = tables.len(), "snapshot acquired");
        Snapshot {
            tables,
            live_snapshots: Arc::clone(&self.live_snapshots),
        }
    }

    /// Run `f` against a fresh snapshot. The snapshot, and every cursor `f` created from it,
    /// is released when `f` returns, whether it succeeded or not.
    pub fn view<T, E>(&self, f: impl FnOnce(&Snapshot) -> Result<T, E>) -> Result<T, E> {
        let snapshot = self.snapshot();
        f(&snapshot)
    }

    /// Write `entries` as a new table. Later entries with the same key override earlier ones,
    /// and the new table overrides every existing table.
    ///
    /// Snapshots taken before this call don't observe the new table.
    pub fn ingest<I, K, V>(&self, entries: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if self.options.is_read_only() {
            return Err(StoreError::ReadOnly);
        }

        let mut sorted = BTreeMap::new();
        for (key, value) in entries {
            let (key, value) = (key.as_ref(), value.as_ref());
            if key.is_empty() {
                return Err(StoreError::InvalidArgument("key cannot be empty".into()));
            }
            if key.len() > u16::MAX as usize {
                return Err(StoreError::InvalidArgument(
                    format!("key is longer than {} bytes", u16::MAX).into(),
                ));
            }
            if value.len() > u32::MAX as usize {
                return Err(StoreError::InvalidArgument(
                    format!("value is longer than {} bytes", u32::MAX).into(),
                ));
            }
            sorted.insert(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
        }
        if sorted.is_empty() {
            return Ok(());
        }

        let mut builder =
            TableBuilder::new(self.options.get_block_size(), self.options.get_compression());
        for (key, value) in &sorted {
            builder.add(key.clone(), value);
        }
        let bytes = builder.finish();
        check_table_size(bytes.len())?;

        // hold the write lock so tables are published in id order
        let mut tables = self.tables.write();
        let id = self.next_table_id.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(table_file_name(id));
        let tmp_path = path.with_extension(format!("{}.{}", TABLE_EXT, TMP_EXT));
        {
            let mut file = fs::File::create(&tmp_path).map_err(StoreError::io(&tmp_path))?;
            file.write_all(&bytes).map_err(StoreError::io(&tmp_path))?;
            file.sync_all().map_err(StoreError::io(&tmp_path))?;
        }
        fs::rename(&tmp_path, &path).map_err(StoreError::io(&path))?;

        let table = Table::from_bytes(
            path,
            id,
            bytes,
            self.cache.clone(),
            self.options.is_verify_checksums(),
        )?;
        debug!(
            table = %table.path().display(),
            entries = sorted.len(),
            blocks = table.block_count(),
            "table ingested"
        );
        let mut next: Vec<Arc<Table>> = tables.iter().cloned().collect();
        next.push(Arc::new(table));
        *tables = next.into();
        Ok(())
    }
}

/// A consistent, read-only view of a [`Store`].
pub struct Snapshot {
    tables: Arc<[Arc<Table>]>,
    live_snapshots: Arc<AtomicUsize>,
}

impl Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("tables", &self.tables.len())
            .finish()
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.live_snapshots.fetch_sub(1, Ordering::AcqRel);
        trace!("snapshot released");
    }
}

impl Snapshot {
    /// An unpositioned cursor; call [`Cursor::rewind`] or [`Cursor::seek`] first.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            children: self
                .tables
                .iter()
                .rev()
                .map(|table| TableCursor::new(Arc::clone(table)))
                .collect(),
            current: None,
            _snapshot: PhantomData,
        }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Bytes>> {
        let mut cursor = self.cursor();
        cursor.seek(key)?;
        if cursor.valid() && cursor.key() == key {
            Ok(Some(cursor.value()))
        } else {
            Ok(None)
        }
    }

    /// The number of distinct keys. It's expensive to call: it scans the whole snapshot.
    pub fn count_keys(&self) -> StoreResult<usize> {
        let mut cursor = self.cursor();
        cursor.rewind()?;
        let mut ans = 0;
        while cursor.valid() {
            ans += 1;
            cursor.advance()?;
        }
        Ok(ans)
    }
}

/// A cursor over the merged, deduplicated key space of a [`Snapshot`].
///
/// The cursor borrows its snapshot, so it cannot outlive it.
pub struct Cursor<'a> {
    // From the newest table to the oldest
    children: Vec<TableCursor>,
    current: Option<usize>,
    _snapshot: PhantomData<&'a Snapshot>,
}

impl Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("key", &Bytes::copy_from_slice(self.key()))
            .field("children", &self.children.len())
            .finish()
    }
}

impl Cursor<'_> {
    fn settle(&mut self, result: StoreResult<()>) -> StoreResult<()> {
        match result {
            // `min_by` keeps the first of equal keys, which is the newest table
            Ok(()) => {
                self.current = self
                    .children
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.valid())
                    .min_by(|(_, a), (_, b)| a.key().cmp(b.key()))
                    .map(|(i, _)| i);
            }
            Err(_) => self.current = None,
        }
        result
    }

    /// Position at the smallest key.
    pub fn rewind(&mut self) -> StoreResult<()> {
        let result = self.children.iter_mut().try_for_each(|c| c.rewind());
        self.settle(result)
    }

    /// Position at the first key `>= key`.
    pub fn seek(&mut self, key: &[u8]) -> StoreResult<()> {
        let result = self.children.iter_mut().try_for_each(|c| c.seek(key));
        self.settle(result)
    }

    /// Move to the next distinct key. No-op on an invalid cursor.
    pub fn advance(&mut self) -> StoreResult<()> {
        let Some(current) = self.current else {
            return Ok(());
        };
        let result = self.advance_children(current);
        self.settle(result)
    }

    // Older tables positioned on the same key are shadowed, skip them too.
    fn advance_children(&mut self, current: usize) -> StoreResult<()> {
        for i in 0..self.children.len() {
            if i != current
                && self.children[i].valid()
                && self.children[i].key() == self.children[current].key()
            {
                self.children[i].advance()?;
            }
        }
        self.children[current].advance()
    }

    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Whether the cursor is positioned on a key starting with `prefix`.
    pub fn valid_for_prefix(&self, prefix: &[u8]) -> bool {
        self.valid() && self.key().starts_with(prefix)
    }

    /// The current key, empty when the cursor is invalid.
    pub fn key(&self) -> &[u8] {
        match self.current {
            Some(i) => self.children[i].key(),
            None => &[],
        }
    }

    /// Size of the current value, without copying it.
    pub fn value_size(&self) -> usize {
        self.current.map_or(0, |i| self.children[i].value_size())
    }

    pub fn value(&self) -> Bytes {
        self.current
            .map_or_else(Bytes::new, |i| self.children[i].value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(snapshot: &Snapshot) -> Vec<(String, String)> {
        let mut cursor = snapshot.cursor();
        cursor.rewind().unwrap();
        let mut ans = Vec::new();
        while cursor.valid() {
            ans.push((
                String::from_utf8(cursor.key().to_vec()).unwrap(),
                String::from_utf8(cursor.value().to_vec()).unwrap(),
            ));
            cursor.advance().unwrap();
        }
        ans
    }

    fn open(dir: &Path) -> Store {
        Store::open(dir, StoreOptions::new().create_if_missing(true)).unwrap()
    }

    #[test]
    fn newest_table_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.ingest([("a", "1"), ("b", "1"), ("d", "1")]).unwrap();
        store.ingest([("b", "2"), ("c", "2")]).unwrap();
        assert_eq!(store.table_count(), 2);

        let snapshot = store.snapshot();
        let expected = [("a", "1"), ("b", "2"), ("c", "2"), ("d", "1")]
            .map(|(k, v)| (k.to_string(), v.to_string()));
        assert_eq!(keys(&snapshot), expected);
        assert_eq!(snapshot.get(b"b").unwrap().as_deref(), Some(&b"2"[..]));
        assert_eq!(snapshot.get(b"bb").unwrap(), None);
        assert_eq!(snapshot.count_keys().unwrap(), 4);
    }

    #[test]
    fn snapshot_does_not_observe_later_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.ingest([("a", "1")]).unwrap();
        let before = store.snapshot();
        store.ingest([("b", "1")]).unwrap();
        let after = store.snapshot();
        assert_eq!(before.count_keys().unwrap(), 1);
        assert_eq!(after.count_keys().unwrap(), 2);
        assert_eq!(store.live_snapshots(), 2);
        drop(before);
        drop(after);
        assert_eq!(store.live_snapshots(), 0);
    }

    #[test]
    fn tables_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path());
            store.ingest([("x", "old")]).unwrap();
            store.ingest([("x", "new"), ("y", "1")]).unwrap();
        }
        let store = Store::open(dir.path(), StoreOptions::new()).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(b"x").unwrap().as_deref(), Some(&b"new"[..]));
        store.ingest([("z", "1")]).unwrap();
        assert!(dir.path().join(table_file_name(3)).exists());
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let err = Store::open(dir.path(), StoreOptions::new()).unwrap_err();
        assert!(matches!(err, StoreError::Locked(_)), "{err}");
        // read-only handles don't take the lock
        Store::open(dir.path(), StoreOptions::new().read_only(true)).unwrap();
        drop(store);
        Store::open(dir.path(), StoreOptions::new()).unwrap();
    }

    #[test]
    fn stale_lock_file_is_not_held() {
        let dir = tempfile::tempdir().unwrap();
        drop(open(dir.path()));
        // left behind by a process that died while holding the store
        fs::write(dir.path().join(LOCK_FILE_NAME), "4242\n").unwrap();
        let store = Store::open(dir.path(), StoreOptions::new()).unwrap();
        let pid = fs::read_to_string(dir.path().join(LOCK_FILE_NAME)).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
        drop(store);
    }

    #[test]
    fn read_only_rejects_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), StoreOptions::new().read_only(true)).unwrap();
        assert!(matches!(store.ingest([("a", "b")]), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn ingest_rejects_empty_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let err = store.ingest([("", "b")]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert_eq!(store.table_count(), 0);
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README"), "hi").unwrap();
        fs::write(dir.path().join("00000000000000000009.sst.tmp"), "partial").unwrap();
        fs::write(dir.path().join("notanumber.sst"), "junk").unwrap();
        let store = Store::open(dir.path(), StoreOptions::new()).unwrap();
        assert_eq!(store.table_count(), 0);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_table_is_rejected_before_writing() {
        assert!(check_table_size(MAX_TABLE_SIZE).is_ok());
        assert!(matches!(
            check_table_size(MAX_TABLE_SIZE + 1),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn table_file_names_sort_by_id() {
        assert_eq!(table_id(Path::new(&table_file_name(42))), Some(42));
        assert!(table_file_name(9) < table_file_name(10));
    }
}
