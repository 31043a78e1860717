use std::ops::Range;

use bytes::{BufMut, Bytes};

use crate::{
    compress::{compress, decompress, CompressionType},
    error::DecodeError,
    utils::{common_prefix_len, get_slice, get_u16_le, get_u32_le},
    SIZE_OF_U16, SIZE_OF_U32,
};

pub(crate) const XXH_SEED: u32 = u32::from_le_bytes(*b"KVSC");
const ENTRY_HEADER_SIZE: usize = SIZE_OF_U16 * 2 + SIZE_OF_U32;

#[derive(Debug, Clone)]
struct Entry {
    key: Bytes,
    value: Range<usize>,
}

/// A decoded data block. Keys are fully materialized, values stay as ranges into `data`.
#[derive(Debug)]
pub(crate) struct Block {
    data: Bytes,
    entries: Vec<Entry>,
}

impl Block {
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │ Block                                                               │
    /// │┌ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─┌ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─┌ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ │
    /// │  Entry       │ ...  │  Entry     │ entry count │ Block Checksum  ││
    /// ││   bytes     │      │   bytes    │    u32      │  u32 (stored)    │
    /// │ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ─ ┘─ ─ ─ ─ ─ ─ ─ ─ ─ ┘│
    /// └─────────────────────────────────────────────────────────────────────┘
    ///
    /// Everything before the checksum may be LZ4 compressed; the checksum covers the
    /// stored (possibly compressed) bytes.
    pub(crate) fn decode(
        raw: Bytes,
        compression_type: CompressionType,
        verify_checksum: bool,
    ) -> Result<Self, DecodeError> {
        if raw.len() < SIZE_OF_U32 {
            return Err(DecodeError::invalid("block is too short"));
        }
        let body_end = raw.len() - SIZE_OF_U32;
        if verify_checksum {
            let (stored, _) = get_u32_le(&raw[body_end..])?;
            if stored != xxhash_rust::xxh32::xxh32(&raw[..body_end], XXH_SEED) {
                return Err(DecodeError::ChecksumMismatch);
            }
        }

        let data = decompress(raw.slice(..body_end), compression_type)?;
        if data.len() < SIZE_OF_U32 {
            return Err(DecodeError::invalid("block body is too short"));
        }
        let entries_end = data.len() - SIZE_OF_U32;
        let (count, _) = get_u32_le(&data[entries_end..])?;
        if count == 0 {
            return Err(DecodeError::invalid("empty block"));
        }

        let mut entries: Vec<Entry> =
            Vec::with_capacity((count as usize).min(entries_end / ENTRY_HEADER_SIZE));
        let mut rest = &data[..entries_end];
        for _ in 0..count {
            let (shared, r) = get_u16_le(rest)?;
            let (suffix_len, r) = get_u16_le(r)?;
            let (value_len, r) = get_u32_le(r)?;
            let (suffix, r) = get_slice(r, suffix_len as usize)?;
            let prev = entries.last().map(|e| e.key.as_ref()).unwrap_or(&[]);
            if shared as usize > prev.len() {
                return Err(DecodeError::invalid("shared prefix exceeds previous key"));
            }
            let mut key = Vec::with_capacity(shared as usize + suffix.len());
            key.extend_from_slice(&prev[..shared as usize]);
            key.extend_from_slice(suffix);
            if !entries.is_empty() && key.as_slice() <= prev {
                return Err(DecodeError::invalid("keys are not strictly increasing"));
            }
            let value_start = entries_end - r.len();
            let (_, r) = get_slice(r, value_len as usize)?;
            entries.push(Entry {
                key: Bytes::from(key),
                value: value_start..value_start + value_len as usize,
            });
            rest = r;
        }
        if !rest.is_empty() {
            return Err(DecodeError::invalid("trailing bytes after the last entry"));
        }

        Ok(Block { data, entries })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn key(&self, idx: usize) -> &Bytes {
        &self.entries[idx].key
    }

    pub(crate) fn value(&self, idx: usize) -> Bytes {
        self.data.slice(self.entries[idx].value.clone())
    }

    pub(crate) fn value_len(&self, idx: usize) -> usize {
        self.entries[idx].value.len()
    }

    /// Index of the first entry whose key is `>= key`, or `len()` if there is none.
    pub(crate) fn seek(&self, key: &[u8]) -> usize {
        self.entries.partition_point(|e| e.key.as_ref() < key)
    }
}

#[derive(Debug)]
pub(crate) struct BlockBuilder {
    data: Vec<u8>,
    count: u32,
    last_key: Vec<u8>,
    block_size: usize,
}

impl BlockBuilder {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            data: Vec::new(),
            count: 0,
            last_key: Vec::new(),
            block_size,
        }
    }

    fn estimated_size(&self) -> usize {
        // entries + entry count + checksum
        self.data.len() + SIZE_OF_U32 + SIZE_OF_U32
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Add a key-value pair to the block.
    /// Returns false if the block is full. An empty block accepts any entry.
    ///
    /// ┌────────────────────────────────────────────────────────────────────┐
    /// │ Entry                                                              │
    /// │┌ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─ ─ ─┬ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─┬ ─ ─ ─ ─ ┐│
    /// │ shared len    key suffix len   value len     key suffix    value   │
    /// ││    u16      │      u16       │    u32      │   bytes    │  bytes ││
    /// │ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘│
    /// └────────────────────────────────────────────────────────────────────┘
    ///
    /// `shared len` is the length of the common prefix with the previous key of the block.
    pub(crate) fn add(&mut self, key: &[u8], value: &[u8]) -> bool {
        debug_assert!(!key.is_empty(), "key cannot be empty");
        debug_assert!(
            self.is_empty() || self.last_key.as_slice() < key,
            "keys must be added in increasing order"
        );
        let entry_size = ENTRY_HEADER_SIZE + key.len() + value.len();
        if !self.is_empty() && self.estimated_size() + entry_size > self.block_size {
            return false;
        }

        let shared = common_prefix_len(&self.last_key, key);
        let suffix = &key[shared..];
        self.data.put_u16_le(shared as u16);
        self.data.put_u16_le(suffix.len() as u16);
        self.data.put_u32_le(value.len() as u32);
        self.data.put_slice(suffix);
        self.data.put_slice(value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.count += 1;
        true
    }

    /// Returns the stored block bytes (checksum included) and the compression applied.
    pub(crate) fn build(self, compression_type: CompressionType) -> (Vec<u8>, CompressionType) {
        debug_assert!(!self.is_empty(), "block is empty");
        let mut body = self.data;
        body.put_u32_le(self.count);
        let (mut stored, real_compression_type) = compress(body, compression_type);
        let checksum = xxhash_rust::xxh32::xxh32(&stored, XXH_SEED);
        stored.put_u32_le(checksum);
        (stored, real_compression_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(entries: &[(&[u8], &[u8])], compression: CompressionType) -> (Bytes, CompressionType) {
        let mut builder = BlockBuilder::new(4096);
        for (k, v) in entries {
            assert!(builder.add(k, v));
        }
        let (bytes, ty) = builder.build(compression);
        (Bytes::from(bytes), ty)
    }

    #[test]
    fn keys_share_prefix_with_previous_entry() {
        let entries: [(&[u8], &[u8]); 3] = [(b"user/1", b"a"), (b"user/10", b""), (b"user/2", b"ccc")];
        let (raw, ty) = build(&entries, CompressionType::None);
        let block = Block::decode(raw, ty, true).unwrap();
        assert_eq!(block.len(), 3);
        for (i, (k, v)) in entries.iter().enumerate() {
            assert_eq!(block.key(i).as_ref(), *k);
            assert_eq!(block.value(i).as_ref(), *v);
            assert_eq!(block.value_len(i), v.len());
        }
        assert_eq!(block.seek(b"user/"), 0);
        assert_eq!(block.seek(b"user/10"), 1);
        assert_eq!(block.seek(b"user/11"), 2);
        assert_eq!(block.seek(b"v"), 3);
    }

    #[test]
    fn full_block_rejects_entry() {
        let mut builder = BlockBuilder::new(32);
        assert!(builder.add(b"a", &[0; 40]));
        assert!(!builder.add(b"b", b"1"));
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let value = vec![b'x'; 256];
        let entries: [(&[u8], &[u8]); 1] = [(b"k", &value)];
        let (raw, ty) = build(&entries, CompressionType::Lz4);
        assert_eq!(ty, CompressionType::Lz4);
        let mut corrupted = raw.to_vec();
        corrupted[2] ^= 0xff;
        assert!(matches!(
            Block::decode(Bytes::from(corrupted), ty, true),
            Err(DecodeError::ChecksumMismatch)
        ));
    }

    #[test]
    fn out_of_order_keys_are_rejected() {
        // two entries with identical keys: shared = 1, empty suffix
        let mut body = Vec::new();
        for shared in [0u16, 1] {
            body.put_u16_le(shared);
            body.put_u16_le(1 - shared);
            body.put_u32_le(0);
            if shared == 0 {
                body.put_u8(b'a');
            }
        }
        body.put_u32_le(2);
        let checksum = xxhash_rust::xxh32::xxh32(&body, XXH_SEED);
        body.put_u32_le(checksum);
        assert!(matches!(
            Block::decode(Bytes::from(body), CompressionType::None, true),
            Err(DecodeError::Invalid(_))
        ));
    }
}
