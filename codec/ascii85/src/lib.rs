//! ASCII base-85 encoding as used by the PDF `ASCII85Decode` filter.
//!
//! Encoded data is terminated by the end-of-data marker `~>`. A leading `<~`
//! is accepted when decoding but never produced.

use std::fmt::Display;

const OFFSET: u8 = b'!';
const ZERO_GROUP: u8 = b'z';
const EOD: &[u8] = b"~>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Byte outside of `!`..=`u` that is neither whitespace nor `z`.
    InvalidByte { position: usize, byte: u8 },
    /// `z` in the middle of a group.
    MisplacedZero { position: usize },
    /// A group decodes to a value larger than `u32::MAX`.
    Overflow { position: usize },
    /// The final group holds a single character.
    TruncatedGroup,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidByte { position, byte } => {
                write!(f, "invalid byte 0x{:02x} at {}", byte, position)
            }
            DecodeError::MisplacedZero { position } => write!(f, "'z' inside a group at {}", position),
            DecodeError::Overflow { position } => write!(f, "group overflow at {}", position),
            DecodeError::TruncatedGroup => write!(f, "final group has only one character"),
        }
    }
}

impl std::error::Error for DecodeError {}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

/// Encode `data`, appending the `~>` end-of-data marker.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 5 + 7);
    let mut chunks = data.chunks_exact(4);
    for chunk in chunks.by_ref() {
        let value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if value == 0 {
            out.push(ZERO_GROUP);
        } else {
            out.extend_from_slice(&encode_group(value));
        }
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut padded = [0u8; 4];
        padded[..rest.len()].copy_from_slice(rest);
        let group = encode_group(u32::from_be_bytes(padded));
        out.extend_from_slice(&group[..rest.len() + 1]);
    }

    out.extend_from_slice(EOD);
    out
}

fn encode_group(mut value: u32) -> [u8; 5] {
    let mut group = [0u8; 5];
    for digit in group.iter_mut().rev() {
        *digit = (value % 85) as u8 + OFFSET;
        value /= 85;
    }
    group
}

/// Decode `data` up to the `~>` marker or the end of input.
pub fn decode(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let mut out = Vec::with_capacity(data.len() / 5 * 4 + 4);
    let mut group = [0u8; 5];
    let mut filled = 0;

    for (position, &c) in data.iter().enumerate() {
        match c {
            b'~' => break,
            c if is_whitespace(c) => continue,
            ZERO_GROUP if filled == 0 => out.extend_from_slice(&[0; 4]),
            ZERO_GROUP => return Err(DecodeError::MisplacedZero { position }),
            b'!'..=b'u' => {
                group[filled] = c - OFFSET;
                filled += 1;
                if filled == 5 {
                    out.extend_from_slice(&decode_group(&group, position)?);
                    filled = 0;
                }
            }
            byte => return Err(DecodeError::InvalidByte { position, byte }),
        }
    }

    match filled {
        0 => {}
        1 => return Err(DecodeError::TruncatedGroup),
        n => {
            // pad with the highest digit so the truncated value rounds up correctly
            for digit in group.iter_mut().skip(n) {
                *digit = b'u' - OFFSET;
            }
            let bytes = decode_group(&group, data.len())?;
            out.extend_from_slice(&bytes[..n - 1]);
        }
    }

    Ok(out)
}

fn decode_group(group: &[u8; 5], position: usize) -> Result<[u8; 4], DecodeError> {
    let value = group
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85).and_then(|v| v.checked_add(u32::from(d))))
        .ok_or(DecodeError::Overflow { position })?;
    Ok(value.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_known_value() {
        assert_eq!(encode(b"Man "), b"9jqo^~>".to_vec());
        assert_eq!(encode(b""), b"~>".to_vec());
    }

    #[test]
    fn zero_group_shortcut() {
        assert_eq!(encode(&[0, 0, 0, 0]), b"z~>".to_vec());
        assert_eq!(decode(b"z~>"), Ok(vec![0, 0, 0, 0]));
    }

    #[test]
    fn partial_group() {
        let encoded = encode(b"hello");
        assert_eq!(decode(&encoded), Ok(b"hello".to_vec()));
    }

    #[test]
    fn decode_ignores_whitespace_and_prefix() {
        assert_eq!(decode(b"<~9jq\no^~>"), Ok(b"Man ".to_vec()));
    }

    #[test]
    fn decode_without_marker() {
        assert_eq!(decode(b"9jqo^"), Ok(b"Man ".to_vec()));
    }

    #[test]
    fn invalid_input() {
        assert_eq!(decode(b"9jqo{"), Err(DecodeError::InvalidByte { position: 4, byte: b'{' }));
        assert_eq!(decode(b"9jzqo"), Err(DecodeError::MisplacedZero { position: 2 }));
        assert_eq!(decode(b"9jqo^9~>"), Err(DecodeError::TruncatedGroup));
        assert_eq!(decode(b"uuuuu"), Err(DecodeError::Overflow { position: 4 }));
    }
}
