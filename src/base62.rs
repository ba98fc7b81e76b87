//! Base62 short-ID encoding.
//!
//! A bijection between `u64` values and strings over `[0-9a-zA-Z]`. The
//! encoding is the plain positional one: most significant symbol first, no
//! leading `'0'` except for the value zero itself.

use thiserror::Error;

pub const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const BASE: u64 = ALPHABET.len() as u64;

/// Longest encoding of any `u64` (`u64::MAX` needs 11 symbols).
const MAX_WIDTH: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("empty short id")]
    Empty,

    #[error("invalid character {found:?} at position {position}")]
    InvalidCharacter { found: char, position: usize },

    #[error("short id {0:?} does not fit in 64 bits")]
    Overflow(String),
}

/// Encode `n` as the shortest base62 string.
pub fn encode(mut n: u64) -> String {
    if n == 0 {
        return (ALPHABET[0] as char).to_string();
    }

    let mut buf = [0u8; MAX_WIDTH];
    let mut pos = MAX_WIDTH;
    while n > 0 {
        pos -= 1;
        buf[pos] = ALPHABET[(n % BASE) as usize];
        n /= BASE;
    }

    // Every byte comes from ALPHABET, so this is always ASCII.
    buf[pos..].iter().map(|&b| b as char).collect()
}

/// Decode a base62 string back to its integer value.
pub fn decode(s: &str) -> Result<u64, EncodingError> {
    if s.is_empty() {
        return Err(EncodingError::Empty);
    }

    s.chars().enumerate().try_fold(0u64, |acc, (position, c)| {
        let digit = digit_of(c).ok_or(EncodingError::InvalidCharacter { found: c, position })?;
        acc.checked_mul(BASE)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| EncodingError::Overflow(s.to_owned()))
    })
}

/// Returns `true` if every character of `s` belongs to the alphabet.
pub fn is_valid(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| digit_of(c).is_some())
}

/// Smallest value whose encoding is `width` symbols long.
///
/// Seeding the counter just below this value makes every generated ID at
/// least `width` characters wide without ever padding the encoding itself.
/// Widths past the `u64` range saturate at `u64::MAX`.
pub fn first_value_of_width(width: u32) -> u64 {
    if width <= 1 {
        return 0;
    }
    BASE.checked_pow(width - 1).unwrap_or(u64::MAX)
}

fn digit_of(c: char) -> Option<u64> {
    match c {
        '0'..='9' => Some(c as u64 - '0' as u64),
        'a'..='z' => Some(c as u64 - 'a' as u64 + 10),
        'A'..='Z' => Some(c as u64 - 'A' as u64 + 36),
        _ => None,
    }
}
