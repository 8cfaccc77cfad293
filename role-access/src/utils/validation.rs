// role-access/src/utils/validation.rs

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

/// ページキー・アクショントークン用正規表現（小文字英数字とアンダースコア、先頭は英字）
pub static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

/// 空白のみの文字列を拒否
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

/// 重複したIDを拒否
pub fn validate_unique_ids(ids: &[String]) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    if ids.iter().all(|id| seen.insert(id.as_str())) {
        Ok(())
    } else {
        Err(ValidationError::new("duplicate_id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_regex() {
        assert!(TOKEN_REGEX.is_match("show"));
        assert!(TOKEN_REGEX.is_match("download_obligation"));
        assert!(TOKEN_REGEX.is_match("leave2"));
        assert!(!TOKEN_REGEX.is_match("Show"));
        assert!(!TOKEN_REGEX.is_match("status-update"));
        assert!(!TOKEN_REGEX.is_match("_hidden"));
        assert!(!TOKEN_REGEX.is_match(""));
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("Manager").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }

    #[test]
    fn test_validate_unique_ids() {
        assert!(validate_unique_ids(&["a".to_string(), "b".to_string()]).is_ok());
        assert!(validate_unique_ids(&["a".to_string(), "a".to_string()]).is_err());
    }
}
