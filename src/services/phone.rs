/// Minimum digit count for a dispatchable number.
const MIN_DIGITS: usize = 8;

/// Canonicalize a raw phone string to digits only.
///
/// Returns `None` for inputs with fewer than 8 digits; callers skip those
/// contacts rather than failing the batch.
pub fn normalize(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_DIGITS {
        return None;
    }
    Some(digits)
}

/// Canonicalize with an optional configured country prefix.
///
/// Prefixing is an opt-in extension point, never a default: with no prefix
/// configured this is exactly [`normalize`].
pub fn normalize_with_prefix(raw: &str, country_prefix: Option<&str>) -> Option<String> {
    let digits = normalize(raw)?;
    match country_prefix {
        Some(prefix) if !prefix.is_empty() && !digits.starts_with(prefix) => {
            Some(format!("{prefix}{digits}"))
        }
        _ => Some(digits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_non_digits() {
        assert_eq!(normalize("+55 (11) 98765-4321"), Some("5511987654321".to_string()));
        assert_eq!(normalize("11 9876-5432"), Some("1198765432".to_string()));
    }

    #[test]
    fn test_rejects_short_numbers() {
        assert_eq!(normalize("1234567"), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("abc-def"), None);
    }

    #[test]
    fn test_exactly_eight_digits_accepted() {
        assert_eq!(normalize("12345678"), Some("12345678".to_string()));
    }

    #[test]
    fn test_prefix_is_opt_in() {
        assert_eq!(normalize_with_prefix("11987654321", None), Some("11987654321".to_string()));
        assert_eq!(
            normalize_with_prefix("11987654321", Some("55")),
            Some("5511987654321".to_string())
        );
        // Already prefixed numbers are left alone
        assert_eq!(
            normalize_with_prefix("5511987654321", Some("55")),
            Some("5511987654321".to_string())
        );
    }
}
