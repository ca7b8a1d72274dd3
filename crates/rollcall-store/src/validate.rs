//! Contact-field validation, enforced by enrollment callers.
//!
//! The store itself accepts pre-validated data; these checks run before
//! anything reaches it.

/// Phone numbers are `+` followed by 10–15 digits, nothing else.
pub fn valid_phone(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Minimal local@domain check: exactly one `@`, a non-empty local part,
/// and a dotted domain with non-empty labels. Deliverability is the mail
/// system's problem, not ours.
pub fn valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_phone_accepts_international() {
        assert!(valid_phone("+919876543210"));
        assert!(valid_phone("+1234567890")); // 10 digits, minimum
        assert!(valid_phone("+123456789012345")); // 15 digits, maximum
    }

    #[test]
    fn test_valid_phone_rejects_bad_shapes() {
        assert!(!valid_phone("919876543210")); // missing +
        assert!(!valid_phone("+123456789")); // 9 digits
        assert!(!valid_phone("+1234567890123456")); // 16 digits
        assert!(!valid_phone("+91abc5543210"));
        assert!(!valid_phone("+"));
        assert!(!valid_phone(""));
    }

    #[test]
    fn test_valid_email_accepts_common_forms() {
        assert!(valid_email("john.doe@example.com"));
        assert!(valid_email("a@b.co"));
        assert!(valid_email("user+tag@mail.example.org"));
    }

    #[test]
    fn test_valid_email_rejects_bad_shapes() {
        assert!(!valid_email("no-at-sign"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("user@nodot"));
        assert!(!valid_email("user@@example.com"));
        assert!(!valid_email("user@example..com"));
        assert!(!valid_email("user@.com"));
        assert!(!valid_email("user name@example.com"));
        assert!(!valid_email(""));
    }
}
