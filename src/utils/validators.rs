use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{10,15}$").unwrap());

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]").unwrap());

static BHK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]?(\.5)?BHK$").unwrap());

pub fn validate_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone)
}

pub fn validate_bhk(bhk: &str) -> bool {
    BHK_REGEX.is_match(bhk)
}

/// Login name derived from a flat number: lower-cased, alphanumerics only.
pub fn username_from_flat_number(flat_number: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(&flat_number.to_lowercase(), "")
        .into_owned()
}

/// Blank phone numbers are allowed; anything else must look like one.
pub fn check_phone(field: &str, phone: Option<&str>) -> AppResult<()> {
    match phone.map(str::trim) {
        Some(p) if !p.is_empty() && !validate_phone(p) => {
            Err(AppError::field(field, "Enter a valid phone number"))
        }
        _ => Ok(()),
    }
}

pub fn check_bhk(bhk: Option<&str>) -> AppResult<()> {
    match bhk {
        Some(b) if !validate_bhk(b) => Err(AppError::field("bhk", "Use a value such as 2BHK")),
        _ => Ok(()),
    }
}

pub fn sanitize_string(input: &str) -> String {
    input.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("9876543210"));
        assert!(validate_phone("+919876543210"));
        assert!(!validate_phone("98765"));
        assert!(!validate_phone("98765-43210"));
    }

    #[test]
    fn test_validate_bhk() {
        assert!(validate_bhk("2BHK"));
        assert!(validate_bhk("2.5BHK"));
        assert!(validate_bhk("10BHK"));
        assert!(!validate_bhk("0BHK"));
        assert!(!validate_bhk("2 bhk"));
    }

    #[test]
    fn test_username_from_flat_number() {
        assert_eq!(username_from_flat_number("A-101"), "a101");
        assert_eq!(username_from_flat_number(" Tower B / 12 "), "towerb12");
        assert_eq!(username_from_flat_number("--"), "");
    }

    #[test]
    fn test_check_phone_allows_blank() {
        assert!(check_phone("phone", None).is_ok());
        assert!(check_phone("phone", Some("")).is_ok());
        assert!(check_phone("phone", Some("12")).is_err());
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("  Block A  "), "Block A");
    }
}
