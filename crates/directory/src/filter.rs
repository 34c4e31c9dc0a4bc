//! Search-filter construction (RFC 4515).

use uuid::Uuid;

/// Escape special characters in a filter assertion value.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape every byte of a binary value (`\xx` each).
pub fn escape_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{b:02x}")).collect()
}

/// `(attr=value)` with the value escaped.
pub fn eq(attr: &str, value: &str) -> String {
    format!("({attr}={})", escape_value(value))
}

/// `(&f1f2...)`.
pub fn and(filters: &[&str]) -> String {
    format!("(&{})", filters.concat())
}

/// `(|f1f2...)`.
pub fn or(filters: &[&str]) -> String {
    format!("(|{})", filters.concat())
}

/// `(objectGUID=\xx...)` in the directory's mixed-endian byte order.
pub fn object_guid(guid: Uuid) -> String {
    format!("(objectGUID={})", escape_bytes(&guid.to_bytes_le()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_filter_metacharacters() {
        assert_eq!(escape_value("John Doe"), "John Doe");
        assert_eq!(escape_value("John*"), "John\\2a");
        assert_eq!(escape_value("(admin)"), "\\28admin\\29");
        assert_eq!(escape_value("a\\b"), "a\\5cb");
    }

    #[test]
    fn guid_filter_is_little_endian() {
        let guid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        assert_eq!(
            object_guid(guid),
            "(objectGUID=\\33\\22\\11\\00\\55\\44\\77\\66\\88\\99\\aa\\bb\\cc\\dd\\ee\\ff)"
        );
    }

    #[test]
    fn composes_and() {
        assert_eq!(
            and(&["(objectClass=user)", eq("sAMAccountName", "j*").as_str()]),
            "(&(objectClass=user)(sAMAccountName=j\\2a))"
        );
    }
}
