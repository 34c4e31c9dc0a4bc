//! `unicodePwd` encoding.
//!
//! The directory accepts a password only as the double-quoted string
//! encoded in UTF-16LE, and only over an encrypted connection.

use crate::error::{DirectoryError, DirectoryResult};

pub const PASSWORD_ATTRIBUTE: &str = "unicodePwd";

/// Quote `password` and encode it as UTF-16LE.
pub fn encode_password(password: &str) -> DirectoryResult<Vec<u8>> {
    if password.is_empty() {
        return Err(DirectoryError::Unsupported(
            "password cannot be empty".to_string(),
        ));
    }
    let quoted = format!("\"{password}\"");
    Ok(quoted.encode_utf16().flat_map(u16::to_le_bytes).collect())
}

/// Inverse of [`encode_password`]; `None` for malformed input.
pub fn decode_password(encoded: &[u8]) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = encoded
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let quoted = String::from_utf16(&units).ok()?;
    quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::to_string)
}
