use bytes::Bytes;

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    None,
    #[default]
    Lz4,
}

impl CompressionType {
    pub(crate) fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(DecodeError::Invalid(
                format!("invalid compression type {}", value).into(),
            )),
        }
    }
}

impl From<CompressionType> for u8 {
    fn from(value: CompressionType) -> Self {
        match value {
            CompressionType::None => 0,
            CompressionType::Lz4 => 1,
        }
    }
}

/// Compress `data`, falling back to the raw bytes when compression doesn't pay off.
///
/// Returns the stored bytes and the compression actually applied.
pub(crate) fn compress(data: Vec<u8>, compression_type: CompressionType) -> (Vec<u8>, CompressionType) {
    match compression_type {
        CompressionType::None => (data, CompressionType::None),
        CompressionType::Lz4 => {
            let compressed = lz4_flex::compress_prepend_size(&data);
            if compressed.len() >= data.len() {
                (data, CompressionType::None)
            } else {
                (compressed, CompressionType::Lz4)
            }
        }
    }
}

pub(crate) fn decompress(data: Bytes, compression_type: CompressionType) -> Result<Bytes, DecodeError> {
    match compression_type {
        CompressionType::None => Ok(data),
        CompressionType::Lz4 => {
            let decompressed = lz4_flex::decompress_size_prepended(&data)
                .map_err(|e| DecodeError::Invalid(e.to_string().into()))?;
            Ok(Bytes::from(decompressed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_falls_back_on_incompressible_input() {
        let (stored, ty) = compress(vec![7], CompressionType::Lz4);
        assert_eq!(ty, CompressionType::None);
        assert_eq!(stored, vec![7]);

        let data = vec![b'a'; 1024];
        let (stored, ty) = compress(data.clone(), CompressionType::Lz4);
        assert_eq!(ty, CompressionType::Lz4);
        assert!(stored.len() < data.len());
        assert_eq!(decompress(Bytes::from(stored), ty).unwrap(), data);
    }

    #[test]
    fn unknown_compression_byte() {
        assert!(CompressionType::from_u8(9).is_err());
        assert_eq!(CompressionType::from_u8(1).unwrap(), CompressionType::Lz4);
    }
}
