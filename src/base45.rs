//! Base45 text encoding as used by HC1 QR payloads (RFC 9285).
//!
//! Two bytes are packed into three characters of a 45 symbol alphabet,
//! a trailing single byte into two characters.

use thiserror::Error;

const ALPHABET: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Base45Error {
    #[error("character {0:?} is not part of the Base45 alphabet")]
    InvalidCharacter(char),
    #[error("Base45 input ends with a dangling single character")]
    InvalidLength,
    #[error("Base45 group value {0} does not fit into its output bytes")]
    Overflow(u32),
}

fn index_of(c: char) -> Result<u8, Base45Error> {
    let upper = c.to_ascii_uppercase();
    ALPHABET
        .iter()
        .position(|&a| char::from(a) == upper)
        .and_then(|i| u8::try_from(i).ok())
        .ok_or(Base45Error::InvalidCharacter(c))
}

/// Decodes Base45 text into raw bytes.
/// Lowercase input is accepted and treated as uppercase.
/// ### Usage
/// ```rust,ignore
/// assert_eq!(greenpass::base45::decode("QED8WEX0").unwrap(), b"ietf!");
/// ```
pub fn decode(text: &str) -> Result<Vec<u8>, Base45Error> {
    let indices = text.chars().map(index_of).collect::<Result<Vec<u8>, _>>()?;

    let mut output = Vec::with_capacity(indices.len() / 3 * 2 + 1);
    for group in indices.chunks(3) {
        match *group {
            [c, d, e] => {
                let value = u32::from(c) + 45 * u32::from(d) + 2025 * u32::from(e);
                let pair = u16::try_from(value).map_err(|_| Base45Error::Overflow(value))?;
                output.extend_from_slice(&pair.to_be_bytes());
            }
            [c, d] => {
                let value = u32::from(c) + 45 * u32::from(d);
                let byte = u8::try_from(value).map_err(|_| Base45Error::Overflow(value))?;
                output.push(byte);
            }
            _ => return Err(Base45Error::InvalidLength),
        }
    }
    Ok(output)
}

/// Encodes bytes as uppercase Base45 text.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len().div_ceil(2) * 3);
    let symbol = |i: u32| char::from(ALPHABET[i as usize]);
    for pair in bytes.chunks(2) {
        let value = pair.iter().fold(0u32, |acc, &b| acc << 8 | u32::from(b));
        output.push(symbol(value % 45));
        output.push(symbol(value / 45 % 45));
        if pair.len() == 2 {
            output.push(symbol(value / 2025));
        }
    }
    output
}
