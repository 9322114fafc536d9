/// Checks that `s` is a syntactically plausible email address.
///
/// This is a cheap pre-flight filter, not RFC 5322 validation. The provider
/// stays the source of truth; this only keeps obvious garbage off the wire.
///
/// A plausible address:
/// - is at most 254 bytes with no whitespace
/// - has exactly one `@` with a non-empty local part
/// - has a domain containing a dot, not starting or ending with one
#[must_use]
pub fn is_plausible_email(s: &str) -> bool {
    if s.is_empty() || s.len() > 254 || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plausible_email() {
        assert!(is_plausible_email("a@x.test"));
        assert!(is_plausible_email("first.last+tag@mail.example.com"));
    }

    #[test]
    fn test_missing_parts() {
        assert!(!is_plausible_email(""));
        assert!(!is_plausible_email("a.x.test"));
        assert!(!is_plausible_email("@x.test"));
        assert!(!is_plausible_email("a@"));
        assert!(!is_plausible_email("a@localhost"));
    }

    #[test]
    fn test_malformed_domain() {
        assert!(!is_plausible_email("a@.x.test"));
        assert!(!is_plausible_email("a@x.test."));
        assert!(!is_plausible_email("a@x..test"));
        assert!(!is_plausible_email("a@b@x.test"));
    }

    #[test]
    fn test_whitespace_and_length() {
        assert!(!is_plausible_email("a b@x.test"));
        assert!(!is_plausible_email(" a@x.test"));
        let long = format!("{}@x.test", "a".repeat(250));
        assert!(!is_plausible_email(&long));
    }
}
