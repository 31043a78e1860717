use crate::compress::CompressionType;

const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;
const DEFAULT_CACHE_BLOCKS: usize = 1024;

/// Options used by [`Store::open`](crate::Store::open).
///
/// ```
/// use kvscope_store::{CompressionType, StoreOptions};
///
/// let options = StoreOptions::new()
///     .create_if_missing(true)
///     .compression(CompressionType::None)
///     .cache_blocks(0);
/// assert!(options.is_create_if_missing());
/// ```
#[derive(Debug, Clone)]
pub struct StoreOptions {
    block_size: usize,
    compression_type: CompressionType,
    cache_blocks: usize,
    verify_checksums: bool,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            compression_type: CompressionType::Lz4,
            cache_blocks: DEFAULT_CACHE_BLOCKS,
            verify_checksums: true,
            read_only: false,
            create_if_missing: false,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target size of a data block written by [`Store::ingest`](crate::Store::ingest).
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn compression(mut self, compression_type: CompressionType) -> Self {
        self.compression_type = compression_type;
        self
    }

    /// Capacity of the decoded block cache, in blocks. `0` disables the cache.
    pub fn cache_blocks(mut self, cache_blocks: usize) -> Self {
        self.cache_blocks = cache_blocks;
        self
    }

    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// A read-only store doesn't take the directory lock and refuses to ingest.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn get_block_size(&self) -> usize {
        self.block_size
    }

    pub fn get_compression(&self) -> CompressionType {
        self.compression_type
    }

    pub fn get_cache_blocks(&self) -> usize {
        self.cache_blocks
    }

    pub fn is_verify_checksums(&self) -> bool {
        self.verify_checksums
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_create_if_missing(&self) -> bool {
        self.create_if_missing
    }
}
