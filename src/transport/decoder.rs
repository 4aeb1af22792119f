// Tue Jan 13 2026 - Alex

use crate::transport::error::TransportError;
use bytes::Buf;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Decoded constant records: 8 byte key -> one or two strings
pub type ConstantTable = IndexMap<String, Vec<String>>;

const ALPHABET_LEN: usize = 16;
const END_OF_TABLE: u8 = 5;

/// Reverses the rotating-key hex substitution used for payload strings.
///
/// The first 16 characters are the nibble alphabet. Characters outside the
/// alphabet count as nibble 0, and a dangling final character is paired
/// with 0.
pub fn decode(data: &str, key: i64) -> Result<Vec<u8>, TransportError> {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() < ALPHABET_LEN {
        return Err(TransportError::MissingAlphabet(chars.len()));
    }

    let alphabet: HashMap<char, i64> = chars[..ALPHABET_LEN]
        .iter()
        .enumerate()
        .map(|(i, &c)| (c, i as i64))
        .collect();
    let nibble = |c: Option<&char>| c.and_then(|c| alphabet.get(c)).copied().unwrap_or(0);

    let body = &chars[ALPHABET_LEN..];
    let mut decoded = Vec::with_capacity((body.len() + 1) / 2);
    let mut running_key = key;

    for pair in body.chunks(2) {
        let high = nibble(pair.first());
        let low = nibble(pair.get(1));
        decoded.push((high * 16 + low + running_key).rem_euclid(256) as u8);
        running_key = running_key.wrapping_add(key);
    }

    Ok(decoded)
}

/// Inverse of [`decode`] for a given alphabet
pub fn encode(bytes: &[u8], key: i64, alphabet: &str) -> String {
    let symbols: Vec<char> = alphabet.chars().take(ALPHABET_LEN).collect();
    let mut out: String = symbols.iter().collect();
    let mut running_key = key;

    for &b in bytes {
        let value = (b as i64 - running_key).rem_euclid(256) as usize;
        out.push(symbols.get(value / 16).copied().unwrap_or('?'));
        out.push(symbols.get(value % 16).copied().unwrap_or('?'));
        running_key = running_key.wrapping_add(key);
    }

    out
}

/// Parses `\65\66\67` style byte strings
pub fn decode_escape(data: &str) -> Result<Vec<u8>, TransportError> {
    data.split('\\')
        .skip(1)
        .map(|part| {
            part.parse::<u8>()
                .map_err(|_| TransportError::InvalidEscape(part.to_string()))
        })
        .collect()
}

/// Reads the constant table record stream.
///
/// Record: control byte, size byte, payload, an extra sized payload when
/// control is 0, then an 8 byte key. Control 5 ends the table and control 1
/// is treated as 2. Records with other control values are dropped.
pub fn decode_constants(data: &[u8]) -> Result<ConstantTable, TransportError> {
    let mut constants = ConstantTable::new();
    let mut buf = data;

    let offset = |buf: &[u8]| data.len() - buf.remaining();

    loop {
        if !buf.has_remaining() {
            return Err(TransportError::Truncated(offset(buf)));
        }
        let mut control = buf.get_u8();
        if control == END_OF_TABLE {
            break;
        }
        if control == 1 {
            control += 1;
        }

        let first = read_sized_string(&mut buf).ok_or_else(|| TransportError::Truncated(offset(buf)))?;
        let value = match control {
            0 => {
                let second =
                    read_sized_string(&mut buf).ok_or_else(|| TransportError::Truncated(offset(buf)))?;
                Some(vec![first, second])
            }
            2 | 4 | 6 => Some(vec![first]),
            _ => None,
        };

        if buf.remaining() < 8 {
            return Err(TransportError::Truncated(offset(buf)));
        }
        let key = String::from_utf8_lossy(&buf[..8]).into_owned();
        buf.advance(8);

        match value {
            Some(value) => {
                constants.insert(key, value);
            }
            None => log::debug!("Skipping constant record {:?} with control byte {}", key, control),
        }
    }

    Ok(constants)
}

fn read_sized_string(buf: &mut &[u8]) -> Option<String> {
    if !buf.has_remaining() {
        return None;
    }
    let size = buf.get_u8() as usize;
    if buf.remaining() < size {
        return None;
    }
    let text = String::from_utf8_lossy(&buf[..size]).into_owned();
    buf.advance(size);
    Some(text)
}

/// Undoes the per-string shift applied to bytecode string constants.
/// Strings whose first byte has the high bit set carry a marker byte
/// followed by the shifted payload.
pub fn decode_constant(key: i64, bytes: &[u8]) -> String {
    if bytes.len() > 1 && bytes[0] > 0x7F {
        let shifted: Vec<u8> = bytes[1..]
            .iter()
            .map(|&b| (b as i64 + key).rem_euclid(256) as u8)
            .collect();
        return String::from_utf8_lossy(&shifted).into_owned();
    }
    String::from_utf8_lossy(bytes).into_owned()
}
