//! Distinguished-name helpers.
//!
//! DNs are handled as strings in their RFC 4514 textual form. Only the
//! leading RDN is ever parsed; everything after the first unescaped comma
//! is treated as the opaque parent path.

/// Attribute type of the leading RDN for the entries this system manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdnKind {
    /// `CN=`, user accounts.
    Cn,
    /// `OU=`, organizational units.
    Ou,
}

impl RdnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RdnKind::Cn => "CN",
            RdnKind::Ou => "OU",
        }
    }
}

/// Escape a value for use inside an RDN (RFC 4514 section 2.4).
pub fn escape_rdn_value(value: &str) -> String {
    let char_count = value.chars().count();
    let mut out = String::with_capacity(value.len() + 8);

    for (i, ch) in value.chars().enumerate() {
        let first = i == 0;
        let last = i + 1 == char_count;
        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            '\0' => out.push_str("\\00"),
            ' ' if first || last => out.push_str("\\20"),
            '#' if first => out.push_str("\\23"),
            _ => out.push(ch),
        }
    }

    out
}

/// Reverse [`escape_rdn_value`] for the escapes this module produces.
pub fn unescape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match (next, chars.peek().copied()) {
            (h, Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => {
                chars.next();
                let byte = u8::from_str_radix(&format!("{h}{l}"), 16).unwrap_or(b'?');
                out.push(byte as char);
            }
            (other, _) => out.push(other),
        }
    }

    out
}

/// Split a DN into its leading RDN and the parent path.
///
/// The split happens at the first comma that is not escaped.
pub fn split_rdn(dn: &str) -> (&str, Option<&str>) {
    let mut escaped = false;
    for (i, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => return (&dn[..i], Some(dn[i + 1..].trim_start())),
            _ => escaped = false,
        }
    }
    (dn, None)
}

/// Parent path of `dn`, if it has one.
pub fn parent_of(dn: &str) -> Option<&str> {
    split_rdn(dn).1
}

/// Attribute type of the leading RDN (`CN`, `OU`, ...).
pub fn rdn_type(dn: &str) -> Option<&str> {
    let (rdn, _) = split_rdn(dn);
    rdn.split_once('=').map(|(t, _)| t.trim())
}

/// Unescaped value of the leading RDN.
pub fn rdn_value(dn: &str) -> Option<String> {
    let (rdn, _) = split_rdn(dn);
    rdn.split_once('=').map(|(_, v)| unescape_rdn_value(v.trim()))
}

/// Build `<KIND>=<escaped value>,<parent>`.
pub fn child_dn(kind: RdnKind, value: &str, parent: &str) -> String {
    format!("{}={},{}", kind.as_str(), escape_rdn_value(value), parent)
}

/// Replace the parent path of `dn`, keeping its leading RDN.
pub fn reparent(dn: &str, new_parent: &str) -> String {
    let (rdn, _) = split_rdn(dn);
    format!("{rdn},{new_parent}")
}

/// Case-insensitive DN comparison.
pub fn dn_eq(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Whether `dn` sits strictly below `base`.
pub fn is_descendant(dn: &str, base: &str) -> bool {
    let dn = dn.trim().to_ascii_lowercase();
    let base = base.trim().to_ascii_lowercase();
    dn.len() > base.len() && dn.ends_with(&format!(",{base}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_plain_value() {
        assert_eq!(escape_rdn_value("Finance"), "Finance");
    }

    #[test]
    fn escape_special_characters() {
        assert_eq!(escape_rdn_value("Doe, John"), "Doe\\, John");
        assert_eq!(escape_rdn_value("a=b+c"), "a\\=b\\+c");
    }

    #[test]
    fn escape_leading_and_trailing_space() {
        assert_eq!(escape_rdn_value(" x "), "\\20x\\20");
        assert_eq!(escape_rdn_value("#tag"), "\\23tag");
    }

    #[test]
    fn escape_multibyte_trailing_space() {
        assert_eq!(escape_rdn_value("张三 "), "张三\\20");
    }

    #[test]
    fn unescape_reverses_escape() {
        for raw in ["Doe, John", " x ", "#tag", "a=b+c", "plain"] {
            assert_eq!(unescape_rdn_value(&escape_rdn_value(raw)), raw);
        }
    }

    #[test]
    fn split_at_first_unescaped_comma() {
        let (rdn, parent) = split_rdn("CN=Doe\\, John,OU=Corp,DC=x");
        assert_eq!(rdn, "CN=Doe\\, John");
        assert_eq!(parent, Some("OU=Corp,DC=x"));
    }

    #[test]
    fn split_root_has_no_parent() {
        assert_eq!(split_rdn("DC=x"), ("DC=x", None));
    }

    #[test]
    fn rdn_accessors() {
        let dn = "OU=Finance,OU=Corp,DC=x";
        assert_eq!(rdn_type(dn), Some("OU"));
        assert_eq!(rdn_value(dn).as_deref(), Some("Finance"));
        assert_eq!(parent_of(dn), Some("OU=Corp,DC=x"));
    }

    #[test]
    fn child_dn_escapes_value() {
        assert_eq!(
            child_dn(RdnKind::Cn, "Doe, John", "OU=Corp,DC=x"),
            "CN=Doe\\, John,OU=Corp,DC=x"
        );
        assert_eq!(
            child_dn(RdnKind::Ou, "Finance", "OU=Corp,DC=x"),
            "OU=Finance,OU=Corp,DC=x"
        );
    }

    #[test]
    fn reparent_keeps_rdn() {
        assert_eq!(
            reparent("CN=jdoe,OU=Active,DC=x", "OU=Leaved,DC=x"),
            "CN=jdoe,OU=Leaved,DC=x"
        );
    }

    #[test]
    fn dn_comparison_ignores_case() {
        assert!(dn_eq("ou=Corp,dc=X", "OU=Corp,DC=x"));
        assert!(!dn_eq("OU=Corp,DC=x", "OU=Corp2,DC=x"));
    }

    #[test]
    fn descendant_check() {
        assert!(is_descendant("CN=a,OU=Active,DC=x", "ou=active,dc=x"));
        assert!(!is_descendant("OU=Active,DC=x", "OU=Active,DC=x"));
        assert!(!is_descendant("CN=a,OU=Inactive,DC=x", "OU=Active,DC=x"));
    }
}
