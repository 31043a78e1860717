use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::{BufMut, Bytes};

use crate::{
    block::{Block, BlockBuilder, XXH_SEED},
    compress::CompressionType,
    error::{DecodeError, StoreError, StoreResult},
    utils::{get_slice, get_u16_le, get_u32_le, get_u8},
    SIZE_OF_U16, SIZE_OF_U32, SIZE_OF_U8,
};

const MAGIC_BYTES: [u8; 4] = *b"KVSC";
pub const CURRENT_SCHEMA_VERSION: u8 = 1;
const HEADER_SIZE: usize = SIZE_OF_U32 + SIZE_OF_U8;
// meta offset + trailing magic
const FOOTER_SIZE: usize = SIZE_OF_U32 + SIZE_OF_U32;
const MAX_BLOCK_NUM: u32 = 10_000_000;

/// Decoded blocks shared by all tables of a store, keyed by `(table id, block index)`.
pub(crate) type BlockCache = quick_cache::sync::Cache<(u64, usize), Arc<Block>>;

#[derive(Debug, Clone)]
pub(crate) struct BlockMeta {
    offset: usize,
    len: usize,
    compression_type: CompressionType,
    first_key: Bytes,
    last_key: Bytes,
}

impl BlockMeta {
    /// ┌───────────────────────────────────────────────────────────────┐
    /// │ All Block Meta                                                │
    /// │┌ ─ ─ ─ ─ ─ ─ ─ ┌ ─ ─ ─ ─ ─ ─┌ ─ ─ ─┌ ─ ─ ─ ─ ─ ─┌ ─ ─ ─ ─ ─ ─ │
    /// │  block count   │ Block Meta │ ...  │ Block Meta │  checksum  ││
    /// ││     u32       │   bytes    │      │   bytes    │    u32      │
    /// │ ─ ─ ─ ─ ─ ─ ─ ─┘─ ─ ─ ─ ─ ─ ┘─ ─ ─ ┘─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ┘│
    /// └───────────────────────────────────────────────────────────────┘
    ///
    /// Each Block Meta is
    /// `offset u32 | len u32 | compression u8 | first key len u16 | first key | last key len u16 | last key`.
    fn encode_meta(meta: &[BlockMeta], buf: &mut Vec<u8>) {
        let estimated_size = SIZE_OF_U32
            + meta
                .iter()
                .map(|m| {
                    SIZE_OF_U32 * 2
                        + SIZE_OF_U8
                        + SIZE_OF_U16 * 2
                        + m.first_key.len()
                        + m.last_key.len()
                })
                .sum::<usize>()
            + SIZE_OF_U32;
        buf.reserve(estimated_size);

        let start = buf.len();
        buf.put_u32_le(meta.len() as u32);
        for m in meta {
            buf.put_u32_le(m.offset as u32);
            buf.put_u32_le(m.len as u32);
            buf.put_u8(m.compression_type.into());
            buf.put_u16_le(m.first_key.len() as u16);
            buf.put_slice(&m.first_key);
            buf.put_u16_le(m.last_key.len() as u16);
            buf.put_slice(&m.last_key);
        }
        let checksum = xxhash_rust::xxh32::xxh32(&buf[start..], XXH_SEED);
        buf.put_u32_le(checksum);
    }

    fn decode_meta(data: &[u8]) -> Result<Vec<BlockMeta>, DecodeError> {
        if data.len() < SIZE_OF_U32 * 2 {
            return Err(DecodeError::invalid("block meta is too short"));
        }
        let (body, checksum) = data.split_at(data.len() - SIZE_OF_U32);
        let (checksum, _) = get_u32_le(checksum)?;
        if checksum != xxhash_rust::xxh32::xxh32(body, XXH_SEED) {
            return Err(DecodeError::ChecksumMismatch);
        }

        let (num, mut rest) = get_u32_le(body)?;
        if num > MAX_BLOCK_NUM {
            return Err(DecodeError::invalid("too many blocks"));
        }
        let mut ans = Vec::with_capacity(num as usize);
        for _ in 0..num {
            let (offset, r) = get_u32_le(rest)?;
            let (len, r) = get_u32_le(r)?;
            let (compression_type, r) = get_u8(r)?;
            let (first_key_len, r) = get_u16_le(r)?;
            let (first_key, r) = get_slice(r, first_key_len as usize)?;
            let (last_key_len, r) = get_u16_le(r)?;
            let (last_key, r) = get_slice(r, last_key_len as usize)?;
            ans.push(BlockMeta {
                offset: offset as usize,
                len: len as usize,
                compression_type: CompressionType::from_u8(compression_type)?,
                first_key: Bytes::copy_from_slice(first_key),
                last_key: Bytes::copy_from_slice(last_key),
            });
            rest = r;
        }
        if !rest.is_empty() {
            return Err(DecodeError::invalid("trailing bytes after block meta"));
        }
        Ok(ans)
    }
}

/// Builds the bytes of one table file from entries given in strictly increasing key order.
#[derive(Debug)]
pub struct TableBuilder {
    block_builder: BlockBuilder,
    block_first_key: Bytes,
    block_last_key: Bytes,
    data: Vec<u8>,
    meta: Vec<BlockMeta>,
    block_size: usize,
    compression_type: CompressionType,
}

impl TableBuilder {
    pub fn new(block_size: usize, compression_type: CompressionType) -> Self {
        let mut data = Vec::with_capacity(HEADER_SIZE);
        data.put_slice(&MAGIC_BYTES);
        data.put_u8(CURRENT_SCHEMA_VERSION);
        Self {
            block_builder: BlockBuilder::new(block_size),
            block_first_key: Bytes::new(),
            block_last_key: Bytes::new(),
            data,
            meta: Vec::new(),
            block_size,
            compression_type,
        }
    }

    pub fn add(&mut self, key: Bytes, value: &[u8]) {
        if self.block_builder.add(&key, value) {
            if self.block_first_key.is_empty() {
                self.block_first_key = key.clone();
            }
            self.block_last_key = key;
            return;
        }

        self.finish_block();
        let added = self.block_builder.add(&key, value);
        debug_assert!(added, "an empty block accepts any entry");
        self.block_first_key = key.clone();
        self.block_last_key = key;
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.block_builder.is_empty()
    }

    fn finish_block(&mut self) {
        if self.block_builder.is_empty() {
            return;
        }
        let builder =
            std::mem::replace(&mut self.block_builder, BlockBuilder::new(self.block_size));
        let (stored, compression_type) = builder.build(self.compression_type);
        self.meta.push(BlockMeta {
            offset: self.data.len(),
            len: stored.len(),
            compression_type,
            first_key: std::mem::take(&mut self.block_first_key),
            last_key: std::mem::take(&mut self.block_last_key),
        });
        self.data.extend_from_slice(&stored);
    }

    /// ┌────────────────────────────────────────────────────────────────────────────────────────┐
    /// │ Table                                                                                  │
    /// │┌ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─┌ ─ ─ ─ ─ ┬ ─ ─ ─┌ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─┌ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ┐ │
    /// │  magic     version  │ block   │ ...  │ block   │ block meta │ meta offset │  magic    │
    /// ││ "KVSC"  │   u8     │ bytes   │      │ bytes   │   bytes    │    u32      │ "KVSC" │ │
    /// │ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘ │
    /// └────────────────────────────────────────────────────────────────────────────────────────┘
    pub fn finish(mut self) -> Bytes {
        self.finish_block();
        let mut buf = self.data;
        let meta_offset = buf.len() as u32;
        BlockMeta::encode_meta(&self.meta, &mut buf);
        buf.put_u32_le(meta_offset);
        buf.put_slice(&MAGIC_BYTES);
        Bytes::from(buf)
    }
}

/// An immutable, fully validated table file. Block bodies are decoded lazily.
pub(crate) struct Table {
    id: u64,
    path: PathBuf,
    data: Bytes,
    meta: Vec<BlockMeta>,
    cache: Option<Arc<BlockCache>>,
    verify_checksums: bool,
}

impl Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("size", &self.data.len())
            .field("blocks", &self.meta.len())
            .finish()
    }
}

impl Table {
    pub(crate) fn open(
        path: PathBuf,
        id: u64,
        cache: Option<Arc<BlockCache>>,
        verify_checksums: bool,
    ) -> StoreResult<Self> {
        let data = std::fs::read(&path).map_err(StoreError::io(&path))?;
        Self::from_bytes(path, id, Bytes::from(data), cache, verify_checksums)
    }

    /// # Errors
    /// - [StoreError::UnsupportedVersion]
    /// - [StoreError::Corrupted] for bad magic, truncation, meta checksum mismatch or
    ///   block meta that doesn't describe the data section
    pub(crate) fn from_bytes(
        path: PathBuf,
        id: u64,
        data: Bytes,
        cache: Option<Arc<BlockCache>>,
        verify_checksums: bool,
    ) -> StoreResult<Self> {
        let corrupted = |reason: &str| StoreError::Corrupted {
            file: path.clone(),
            reason: reason.into(),
        };
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupted("file is too short"));
        }
        if data[..SIZE_OF_U32] != MAGIC_BYTES || data[data.len() - SIZE_OF_U32..] != MAGIC_BYTES {
            return Err(corrupted("invalid magic number"));
        }
        let version = data[SIZE_OF_U32];
        if version != CURRENT_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion {
                file: path.clone(),
                found: version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        let footer_start = data.len() - FOOTER_SIZE;
        let (meta_offset, _) = get_u32_le(&data[footer_start..]).map_err(|e| e.in_table(&path))?;
        let meta_offset = meta_offset as usize;
        if meta_offset < HEADER_SIZE || meta_offset >= footer_start {
            return Err(corrupted("invalid meta offset"));
        }
        let meta = BlockMeta::decode_meta(&data[meta_offset..footer_start])
            .map_err(|e| e.in_table(&path))?;

        let mut expected_offset = HEADER_SIZE;
        for (i, m) in meta.iter().enumerate() {
            if m.offset != expected_offset || m.len < SIZE_OF_U32 {
                return Err(corrupted("block meta doesn't match the data section"));
            }
            expected_offset += m.len;
            if m.first_key.is_empty() || m.first_key > m.last_key {
                return Err(corrupted("invalid block key range"));
            }
            if i > 0 && meta[i - 1].last_key >= m.first_key {
                return Err(corrupted("blocks are not sorted"));
            }
        }
        if expected_offset != meta_offset {
            return Err(corrupted("block meta doesn't match the data section"));
        }

        Ok(Self {
            id,
            path,
            data,
            meta,
            cache,
            verify_checksums,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn block_count(&self) -> usize {
        self.meta.len()
    }

    pub(crate) fn size(&self) -> usize {
        self.data.len()
    }

    /// Index of the first block that may contain a key `>= key`.
    pub(crate) fn find_block(&self, key: &[u8]) -> usize {
        self.meta.partition_point(|m| m.last_key.as_ref() < key)
    }

    fn read_block(&self, block_idx: usize) -> StoreResult<Arc<Block>> {
        let m = &self.meta[block_idx];
        let raw = self.data.slice(m.offset..m.offset + m.len);
        Block::decode(raw, m.compression_type, self.verify_checksums)
            .map(Arc::new)
            .map_err(|e| e.in_block(&self.path, block_idx))
    }

    pub(crate) fn read_block_cached(&self, block_idx: usize) -> StoreResult<Arc<Block>> {
        match &self.cache {
            Some(cache) => {
                cache.get_or_insert_with(&(self.id, block_idx), || self.read_block(block_idx))
            }
            None => self.read_block(block_idx),
        }
    }
}

/// Positioned cursor over a single table.
#[derive(Debug, Clone)]
pub(crate) struct TableCursor {
    table: Arc<Table>,
    block_idx: usize,
    block: Option<Arc<Block>>,
    entry_idx: usize,
}

impl TableCursor {
    pub(crate) fn new(table: Arc<Table>) -> Self {
        Self {
            block_idx: table.block_count(),
            table,
            block: None,
            entry_idx: 0,
        }
    }

    fn load(&mut self, block_idx: usize, entry_idx: usize) -> StoreResult<()> {
        self.block = None;
        self.block_idx = block_idx;
        self.entry_idx = entry_idx;
        if block_idx >= self.table.block_count() {
            return Ok(());
        }
        let block = self.table.read_block_cached(block_idx)?;
        if entry_idx >= block.len() {
            return self.load(block_idx + 1, 0);
        }
        self.block = Some(block);
        Ok(())
    }

    pub(crate) fn rewind(&mut self) -> StoreResult<()> {
        self.load(0, 0)
    }

    pub(crate) fn seek(&mut self, key: &[u8]) -> StoreResult<()> {
        let block_idx = self.table.find_block(key);
        if block_idx >= self.table.block_count() {
            return self.load(block_idx, 0);
        }
        let block = self.table.read_block_cached(block_idx)?;
        let entry_idx = block.seek(key);
        self.load(block_idx, entry_idx)
    }

    pub(crate) fn advance(&mut self) -> StoreResult<()> {
        let Some(block) = &self.block else {
            return Ok(());
        };
        if self.entry_idx + 1 < block.len() {
            self.entry_idx += 1;
            return Ok(());
        }
        self.load(self.block_idx + 1, 0)
    }

    pub(crate) fn valid(&self) -> bool {
        self.block.is_some()
    }

    pub(crate) fn key(&self) -> &[u8] {
        match &self.block {
            Some(block) => block.key(self.entry_idx),
            None => &[],
        }
    }

    pub(crate) fn value_size(&self) -> usize {
        self.block
            .as_ref()
            .map_or(0, |block| block.value_len(self.entry_idx))
    }

    pub(crate) fn value(&self) -> Bytes {
        self.block
            .as_ref()
            .map_or_else(Bytes::new, |block| block.value(self.entry_idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(entries: &[(&str, &str)], block_size: usize) -> Arc<Table> {
        let mut builder = TableBuilder::new(block_size, CompressionType::Lz4);
        for (k, v) in entries {
            builder.add(Bytes::copy_from_slice(k.as_bytes()), v.as_bytes());
        }
        let bytes = builder.finish();
        Arc::new(Table::from_bytes(PathBuf::from("test.sst"), 1, bytes, None, true).unwrap())
    }

    fn collect(cursor: &mut TableCursor) -> Vec<String> {
        let mut ans = Vec::new();
        while cursor.valid() {
            ans.push(String::from_utf8(cursor.key().to_vec()).unwrap());
            cursor.advance().unwrap();
        }
        ans
    }

    #[test]
    fn scan_across_blocks() {
        let keys: Vec<String> = (0..200).map(|i| format!("key/{:04}", i)).collect();
        let entries: Vec<(&str, &str)> = keys.iter().map(|k| (k.as_str(), "value")).collect();
        let table = table_of(&entries, 64);
        assert!(table.block_count() > 10);

        let mut cursor = TableCursor::new(table);
        assert!(!cursor.valid());
        cursor.rewind().unwrap();
        assert_eq!(collect(&mut cursor), keys);
    }

    #[test]
    fn seek_lands_on_lower_bound() {
        let keys: Vec<String> = (0..100).map(|i| format!("k{:03}", i * 2)).collect();
        let entries: Vec<(&str, &str)> = keys.iter().map(|k| (k.as_str(), "v")).collect();
        let table = table_of(&entries, 48);
        let mut cursor = TableCursor::new(table);

        cursor.seek(b"k050").unwrap();
        assert_eq!(cursor.key(), b"k050");
        cursor.seek(b"k051").unwrap();
        assert_eq!(cursor.key(), b"k052");
        assert_eq!(cursor.value_size(), 1);
        assert_eq!(cursor.value().as_ref(), b"v");
        cursor.seek(b"a").unwrap();
        assert_eq!(cursor.key(), b"k000");
        cursor.seek(b"k199").unwrap();
        assert!(!cursor.valid());
        assert_eq!(cursor.key(), b"");
    }

    #[test]
    fn empty_table() {
        let table = table_of(&[], 4096);
        assert_eq!(table.block_count(), 0);
        let mut cursor = TableCursor::new(table);
        cursor.rewind().unwrap();
        assert!(!cursor.valid());
        cursor.seek(b"a").unwrap();
        assert!(!cursor.valid());
    }

    #[test]
    fn damaged_footer_is_rejected() {
        let mut builder = TableBuilder::new(4096, CompressionType::None);
        builder.add(Bytes::from_static(b"a"), b"1");
        let bytes = builder.finish().to_vec();

        let truncated = Bytes::copy_from_slice(&bytes[..bytes.len() - 1]);
        let err = Table::from_bytes(PathBuf::from("t.sst"), 1, truncated, None, true).unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }), "{err}");

        let mut bad_meta = bytes.clone();
        let meta_byte = bad_meta.len() - FOOTER_SIZE - 1;
        bad_meta[meta_byte] ^= 0xff;
        let err = Table::from_bytes(PathBuf::from("t.sst"), 1, Bytes::from(bad_meta), None, true)
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }), "{err}");

        let mut future = bytes;
        future[SIZE_OF_U32] = CURRENT_SCHEMA_VERSION + 1;
        let err = Table::from_bytes(PathBuf::from("t.sst"), 1, Bytes::from(future), None, true)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion { .. }), "{err}");
    }
}
