use thiserror::Error;

/// Errors produced while decoding a binary asset container.
///
/// Decoder failures are hard failures: a corrupted asset that silently
/// produced wrong geometry would be far worse than one that refuses to
/// load, so every declared count is checked against the buffer before a
/// single byte of the body is trusted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("buffer ended at byte {offset} while reading {what}")]
    UnexpectedEof { what: &'static str, offset: usize },
    #[error("unsupported {container} version {version}")]
    UnsupportedVersion { container: &'static str, version: u32 },
    #[error("{what}: expected {expected}, found {found}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("index {index} in group {group:?} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        group: String,
        index: u32,
        vertex_count: usize,
    },
    #[error("{what} is not valid UTF-8")]
    InvalidText { what: &'static str },
}

/// Reads a little-endian `u32` and advances the cursor.
pub fn read_u32(data: &[u8], cursor: &mut usize, what: &'static str) -> Result<u32, FormatError> {
    let bytes = take(data, cursor, 4, what)?;
    Ok(u32::from_le_bytes(bytes.try_into().expect("slice length verified")))
}

/// Reads a little-endian `f32` and advances the cursor.
pub fn read_f32(data: &[u8], cursor: &mut usize, what: &'static str) -> Result<f32, FormatError> {
    let bytes = take(data, cursor, 4, what)?;
    Ok(f32::from_le_bytes(bytes.try_into().expect("slice length verified")))
}

/// Reads `count` little-endian `f32` values into a fresh buffer.
///
/// The total byte size is computed with overflow checks and validated
/// against the remaining buffer before any allocation happens, so a
/// corrupt count fails cleanly instead of attempting a huge allocation.
pub fn read_f32_slice(
    data: &[u8],
    cursor: &mut usize,
    count: usize,
    what: &'static str,
) -> Result<Vec<f32>, FormatError> {
    let byte_len = count.checked_mul(4).ok_or(FormatError::UnexpectedEof {
        what,
        offset: *cursor,
    })?;
    let bytes = take(data, cursor, byte_len, what)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("chunk length verified")))
        .collect())
}

/// Reads `count` little-endian `u32` values into a fresh buffer.
pub fn read_u32_slice(
    data: &[u8],
    cursor: &mut usize,
    count: usize,
    what: &'static str,
) -> Result<Vec<u32>, FormatError> {
    let byte_len = count.checked_mul(4).ok_or(FormatError::UnexpectedEof {
        what,
        offset: *cursor,
    })?;
    let bytes = take(data, cursor, byte_len, what)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes(chunk.try_into().expect("chunk length verified")))
        .collect())
}

/// Reads a fixed-width NUL-padded string field.
///
/// The field content runs up to the first NUL byte and must be UTF-8.
pub fn read_fixed_str(
    data: &[u8],
    cursor: &mut usize,
    width: usize,
    what: &'static str,
) -> Result<String, FormatError> {
    let bytes = take(data, cursor, width, what)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(width);
    std::str::from_utf8(&bytes[..end])
        .map(str::to_string)
        .map_err(|_| FormatError::InvalidText { what })
}

fn take<'a>(
    data: &'a [u8],
    cursor: &mut usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], FormatError> {
    let end = cursor.checked_add(len).filter(|end| *end <= data.len());
    let Some(end) = end else {
        return Err(FormatError::UnexpectedEof {
            what,
            offset: *cursor,
        });
    };
    let slice = &data[*cursor..end];
    *cursor = end;
    Ok(slice)
}

/// Appends a little-endian `u32`.
pub fn write_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

/// Appends a flat `f32` array as little-endian bytes.
pub fn write_f32_slice(buffer: &mut Vec<u8>, values: &[f32]) {
    if cfg!(target_endian = "little") {
        buffer.extend_from_slice(bytemuck::cast_slice(values));
    } else {
        for value in values {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Appends a NUL-padded fixed-width string field.
///
/// Longer names are truncated on a char boundary; the final byte of the
/// field is always NUL so decoders can rely on termination.
pub fn write_fixed_str(buffer: &mut Vec<u8>, value: &str, width: usize) {
    let limit = width.saturating_sub(1);
    let mut end = value.len().min(limit);
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    let bytes = &value.as_bytes()[..end];
    buffer.extend_from_slice(bytes);
    buffer.resize(buffer.len() + (width - bytes.len()), 0);
}
