//! Read-only views over ordered key-value data.
//!
//! The analyzers only need a point-in-time snapshot and a cursor that walks it in ascending
//! key order. [`kvscope_store::Store`] provides both, and [`MemSnapshot`] is an in-memory
//! stand-in for tests and embedding.
use std::{
    collections::BTreeMap,
    convert::Infallible,
    ops::Bound,
    sync::Arc,
};

use bytes::Bytes;
use kvscope_store::{Cursor, Snapshot, Store, StoreError};

/// A cursor over a snapshot, yielding keys in ascending byte order.
///
/// Once `valid` returns false, `key` and `value_size` must not be called.
pub trait OrderedCursor {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Position at the smallest key.
    fn rewind(&mut self) -> Result<(), Self::Error>;
    /// Position at the smallest key `>= key`.
    fn seek(&mut self, key: &[u8]) -> Result<(), Self::Error>;
    /// Move to the next key.
    fn advance(&mut self) -> Result<(), Self::Error>;
    fn valid(&self) -> bool;
    /// Whether the cursor is positioned on a key starting with `prefix`.
    fn valid_for_prefix(&self, prefix: &[u8]) -> bool {
        self.valid() && self.key().starts_with(prefix)
    }
    fn key(&self) -> &[u8];
    /// Stored size of the value in bytes, without loading it when possible.
    fn value_size(&self) -> u64;
}

/// A consistent, read-only view of a key-value store.
pub trait OrderedSnapshot {
    type Cursor<'a>: OrderedCursor
    where
        Self: 'a;

    fn cursor(&self) -> Self::Cursor<'_>;
}

/// Something that hands out snapshots, such as an open store.
pub trait SnapshotSource {
    type Snapshot: OrderedSnapshot;

    fn snapshot(&self) -> Self::Snapshot;

    /// Run `f` against a fresh snapshot, releasing it on every exit path.
    fn view<T, E>(&self, f: impl FnOnce(&Self::Snapshot) -> Result<T, E>) -> Result<T, E> {
        let snapshot = self.snapshot();
        f(&snapshot)
    }
}

impl OrderedCursor for Cursor<'_> {
    type Error = StoreError;

    fn rewind(&mut self) -> Result<(), StoreError> {
        Cursor::rewind(self)
    }

    fn seek(&mut self, key: &[u8]) -> Result<(), StoreError> {
        Cursor::seek(self, key)
    }

    fn advance(&mut self) -> Result<(), StoreError> {
        Cursor::advance(self)
    }

    fn valid(&self) -> bool {
        Cursor::valid(self)
    }

    fn valid_for_prefix(&self, prefix: &[u8]) -> bool {
        Cursor::valid_for_prefix(self, prefix)
    }

    fn key(&self) -> &[u8] {
        Cursor::key(self)
    }

    fn value_size(&self) -> u64 {
        Cursor::value_size(self) as u64
    }
}

impl OrderedSnapshot for Snapshot {
    type Cursor<'a> = Cursor<'a>;

    fn cursor(&self) -> Cursor<'_> {
        Snapshot::cursor(self)
    }
}

impl SnapshotSource for Store {
    type Snapshot = Snapshot;

    fn snapshot(&self) -> Snapshot {
        Store::snapshot(self)
    }
}

/// An immutable sorted map that can be cheaply cloned and scanned.
#[derive(Debug, Clone, Default)]
pub struct MemSnapshot {
    map: Arc<BTreeMap<Bytes, Bytes>>,
}

impl MemSnapshot {
    pub fn new(map: BTreeMap<Bytes, Bytes>) -> Self {
        Self { map: Arc::new(map) }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MemSnapshot
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| {
                    (
                        Bytes::copy_from_slice(k.as_ref()),
                        Bytes::copy_from_slice(v.as_ref()),
                    )
                })
                .collect(),
        )
    }
}

#[derive(Debug)]
pub struct MemCursor<'a> {
    map: &'a BTreeMap<Bytes, Bytes>,
    current: Option<(&'a Bytes, &'a Bytes)>,
}

impl<'a> MemCursor<'a> {
    fn first_from(&mut self, start: Bound<&[u8]>) {
        self.current = self
            .map
            .range::<[u8], _>((start, Bound::Unbounded))
            .next();
    }
}

impl OrderedCursor for MemCursor<'_> {
    type Error = Infallible;

    fn rewind(&mut self) -> Result<(), Infallible> {
        self.current = self.map.iter().next();
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<(), Infallible> {
        self.first_from(Bound::Included(key));
        Ok(())
    }

    fn advance(&mut self) -> Result<(), Infallible> {
        if let Some((key, _)) = self.current {
            self.first_from(Bound::Excluded(key.as_ref()));
        }
        Ok(())
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.map(|(k, _)| k.as_ref()).unwrap_or_default()
    }

    fn value_size(&self) -> u64 {
        self.current.map_or(0, |(_, v)| v.len() as u64)
    }
}

impl OrderedSnapshot for MemSnapshot {
    type Cursor<'a> = MemCursor<'a>;

    fn cursor(&self) -> MemCursor<'_> {
        MemCursor {
            map: &self.map,
            current: None,
        }
    }
}

impl SnapshotSource for MemSnapshot {
    type Snapshot = MemSnapshot;

    fn snapshot(&self) -> MemSnapshot {
        self.clone()
    }
}
