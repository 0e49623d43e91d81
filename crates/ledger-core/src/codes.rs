//! # Item Codes
//!
//! Name normalization for exact catalog matching, and code synthesis for
//! items created on demand.
//!
//! ## Code Format
//! ```text
//! "Cement M-400"  ──►  prefix "CEME"  ──►  CEME-0001, CEME-0002, ...
//! "ц-400"         ──►  prefix "Ц400"  ──►  Ц400-0001
//! "---"           ──►  prefix "ITEM"  ──►  ITEM-0001
//! ```
//! The caller walks the counter upward until it finds a code not yet taken.

/// Maximum number of characters taken from the name for the prefix.
pub const PREFIX_LEN: usize = 4;

/// Prefix used when a name has no alphanumeric characters.
pub const FALLBACK_PREFIX: &str = "ITEM";

/// Key used for exact catalog matching: trimmed and lower-cased.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// First alphanumeric characters of `name`, upper-cased.
pub fn code_prefix(name: &str) -> String {
    let prefix: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(PREFIX_LEN)
        .flat_map(char::to_uppercase)
        .collect();

    if prefix.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        prefix
    }
}

/// Formats the `counter`-th code for `prefix`.
pub fn item_code(prefix: &str, counter: u32) -> String {
    format!("{}-{:04}", prefix, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Cement "), "cement");
        assert_eq!(normalize_name("CEMENT"), normalize_name("cement"));
    }

    #[test]
    fn test_code_prefix() {
        assert_eq!(code_prefix("Cement"), "CEME");
        assert_eq!(code_prefix("a-1"), "A1");
        assert_eq!(code_prefix("  -- "), FALLBACK_PREFIX);
        assert_eq!(code_prefix("ц-400"), "Ц400");
    }

    #[test]
    fn test_item_code() {
        assert_eq!(item_code("CEME", 1), "CEME-0001");
        assert_eq!(item_code("A1", 12345), "A1-12345");
    }
}
