//! # Validation Module
//!
//! Checks applied to external data before anything is written.
//!
//! ```rust
//! use ledger_core::validation::{validate_item_name, validate_tin};
//!
//! assert!(validate_tin("123456789").is_ok());
//! assert!(validate_tin("DE123456789").is_ok());
//! assert!(validate_tin("   ").is_err());
//! assert!(validate_item_name("  ").is_err());
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest item name the catalog accepts.
pub const MAX_ITEM_NAME_LEN: usize = 500;

/// Longest TIN accepted (national and foreign formats).
pub const MAX_TIN_LEN: usize = 20;

// =============================================================================
// Validators
// =============================================================================

/// Validates a taxpayer identification number.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_TIN_LEN`] characters
/// - No control characters
///
/// Foreign partners carry country-prefixed TINs, so letters are allowed.
pub fn validate_tin(tin: &str) -> ValidationResult<()> {
    let tin = tin.trim();

    if tin.is_empty() {
        return Err(ValidationError::Required {
            field: "tin".to_string(),
        });
    }

    if tin.len() > MAX_TIN_LEN {
        return Err(ValidationError::TooLong {
            field: "tin".to_string(),
            max: MAX_TIN_LEN,
        });
    }

    if tin.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "tin".to_string(),
            reason: "contains control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates an invoice line's item name.
pub fn validate_item_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_ITEM_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_ITEM_NAME_LEN,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tin() {
        assert!(validate_tin("111").is_ok());
        assert!(validate_tin(" 302563778 ").is_ok());
        assert!(matches!(
            validate_tin(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_tin("DE123456789").is_ok());
        assert!(validate_tin("GB-123 456").is_ok());
        assert!(matches!(
            validate_tin("30\u{0}1"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_tin(&"1".repeat(21)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_item_name() {
        assert!(validate_item_name("Cement").is_ok());
        assert!(validate_item_name("\t").is_err());
        assert!(validate_item_name(&"x".repeat(MAX_ITEM_NAME_LEN + 1)).is_err());
    }
}
