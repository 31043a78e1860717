use crate::error::DecodeError;

pub(crate) fn get_u32_le(bytes: &[u8]) -> Result<(u32, &[u8]), DecodeError> {
    if bytes.len() < 4 {
        return Err(DecodeError::invalid("unexpected end of bytes"));
    }
    let (head, rest) = bytes.split_at(4);
    Ok((u32::from_le_bytes([head[0], head[1], head[2], head[3]]), rest))
}

pub(crate) fn get_u16_le(bytes: &[u8]) -> Result<(u16, &[u8]), DecodeError> {
    if bytes.len() < 2 {
        return Err(DecodeError::invalid("unexpected end of bytes"));
    }
    let (head, rest) = bytes.split_at(2);
    Ok((u16::from_le_bytes([head[0], head[1]]), rest))
}

pub(crate) fn get_u8(bytes: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    match bytes.split_first() {
        Some((b, rest)) => Ok((*b, rest)),
        None => Err(DecodeError::invalid("unexpected end of bytes")),
    }
}

pub(crate) fn get_slice(bytes: &[u8], len: usize) -> Result<(&[u8], &[u8]), DecodeError> {
    if bytes.len() < len {
        return Err(DecodeError::invalid("unexpected end of bytes"));
    }
    Ok(bytes.split_at(len))
}

pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
