/// Canonical form of a CUSIP: trimmed and uppercased.
pub fn format_cusip(cusip: &str) -> String {
    cusip.trim().to_uppercase()
}

/// Check the shape of a CUSIP: nine alphanumeric characters, the last one a digit.
///
/// The check digit itself is not verified.
pub fn validate_cusip(cusip: &str) -> Result<String, String> {
    let cusip = format_cusip(cusip);

    if cusip.is_empty() {
        return Err("CUSIP cannot be empty".to_string());
    }
    let len = cusip.chars().count();
    if len != 9 {
        return Err(format!("CUSIP must be 9 characters (got {len})"));
    }
    if !cusip.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("CUSIP must contain only alphanumeric characters".to_string());
    }
    if !cusip.chars().last().is_some_and(|c| c.is_ascii_digit()) {
        return Err("CUSIP must have 8 alphanumeric characters followed by 1 digit".to_string());
    }

    Ok(cusip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cusip() {
        assert_eq!(validate_cusip("912828Z29"), Ok("912828Z29".to_string()));
        assert_eq!(validate_cusip("  912828z29  "), Ok("912828Z29".to_string()));
    }

    #[test]
    fn test_invalid_length() {
        let err = validate_cusip("12345").unwrap_err();
        assert!(err.contains("9 characters"));
    }

    #[test]
    fn test_invalid_characters() {
        let err = validate_cusip("912828Z2!").unwrap_err();
        assert!(err.contains("alphanumeric"));
    }

    #[test]
    fn test_last_character_must_be_digit() {
        assert!(validate_cusip("912828Z2A").is_err());
    }

    #[test]
    fn test_empty_cusip() {
        let err = validate_cusip("").unwrap_err();
        assert!(err.contains("empty"));
    }
}
