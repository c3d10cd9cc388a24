use super::{Code, RawCode};

/// Length of a short order code
pub const SHORT_CODE_LEN: usize = 6;

/// Separator kept by normalization; long identifiers must contain it
pub const SEPARATOR: char = '-';

const LONG_IDENTIFIER_MIN_LEN: usize = 21;

/// Strip everything except ASCII letters, digits and the separator, then uppercase
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == SEPARATOR)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Classify a raw string into a typed code, or `None` when it fits no format
pub fn classify(raw: &RawCode) -> Option<Code> {
    let normalized = normalize(last_url_segment(raw.as_str().trim()));

    if normalized.len() == SHORT_CODE_LEN && normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(Code::ShortCode(normalized));
    }

    if normalized.len() >= LONG_IDENTIFIER_MIN_LEN && normalized.contains(SEPARATOR) {
        return Some(Code::LongIdentifier(normalized));
    }

    None
}

/// For URL-like input, the last path segment before any query or fragment.
/// Anything else is returned untouched.
fn last_url_segment(input: &str) -> &str {
    if !looks_like_url(input) {
        return input;
    }

    let path = input
        .split(['?', '#'])
        .next()
        .unwrap_or(input)
        .trim_end_matches('/');

    path.rsplit('/').next().unwrap_or(path)
}

fn looks_like_url(input: &str) -> bool {
    input.contains("://") || input.starts_with("www.") || input.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_str(input: &str) -> Option<Code> {
        classify(&RawCode::new(input))
    }

    #[test]
    fn test_short_code_is_uppercased() {
        assert_eq!(classify_str("a1b2c3"), Some(Code::ShortCode("A1B2C3".into())));
    }

    #[test]
    fn test_short_code_ignores_noise_characters() {
        assert_eq!(classify_str("  k7q 2xz\n"), Some(Code::ShortCode("K7Q2XZ".into())));
        assert_eq!(classify_str("K7Q.2XZ"), Some(Code::ShortCode("K7Q2XZ".into())));
    }

    #[test]
    fn test_dictionary_word_is_still_a_short_code() {
        // No denylist on this path: a six letter word is as valid as any other code
        assert_eq!(classify_str("PEDIDO"), Some(Code::ShortCode("PEDIDO".into())));
        assert_eq!(classify_str("ticket"), Some(Code::ShortCode("TICKET".into())));
    }

    #[test]
    fn test_long_identifier() {
        assert_eq!(
            classify_str("550e8400-e29b-41d4-a716-446655440000"),
            Some(Code::LongIdentifier("550E8400-E29B-41D4-A716-446655440000".into()))
        );
    }

    #[test]
    fn test_long_identifier_requires_separator() {
        assert_eq!(classify_str("550e8400e29b41d4a716446655440000"), None);
    }

    #[test]
    fn test_url_takes_last_path_segment() {
        assert_eq!(
            classify_str("https://meals.example.com/orders/550e8400-e29b-41d4-a716-446655440000?src=qr"),
            Some(Code::LongIdentifier("550E8400-E29B-41D4-A716-446655440000".into()))
        );
        assert_eq!(
            classify_str("https://meals.example.com/t/k7q2xz/"),
            Some(Code::ShortCode("K7Q2XZ".into()))
        );
        assert_eq!(
            classify_str("https://meals.example.com/t/a1b2c3#top"),
            Some(Code::ShortCode("A1B2C3".into()))
        );
    }

    #[test]
    fn test_unclassified_inputs() {
        assert_eq!(classify_str(""), None);
        assert_eq!(classify_str("ABC12"), None);
        assert_eq!(classify_str("ABC1234"), None);
        assert_eq!(classify_str("A1-B2C"), None);
        assert_eq!(classify_str("short-but-dashed"), None);
        assert_eq!(classify_str("https://meals.example.com/"), None);
    }

    #[test]
    fn test_non_ascii_letters_are_stripped() {
        // "CÓDIGO" loses the accented letter and no longer fits a short code
        assert_eq!(classify_str("CÓDIGO"), None);
        assert_eq!(normalize("CÓDIGO"), "CDIGO");
    }
}
