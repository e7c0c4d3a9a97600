//! Entry name validation.
//!
//! Valid entry names:
//! - Must be non-empty
//! - Must not contain `/`, `\` or NUL
//! - Must not be `.` or `..`
//! - Must not be the reserved sidecar name
//! - Must not start with `.tmp` (reserved for in-flight writes)

use crate::error::{TreeError, TreeResult};

/// Name of the per-directory sidecar metadata file.
pub const SIDECAR_NAME: &str = ".collection.json";

/// Prefix of temporary files created by atomic writes.
const TEMP_PREFIX: &str = ".tmp";

const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0'];

fn invalid(name: &str, reason: impl Into<String>) -> TreeError {
    TreeError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a single entry name, returning `Ok(())` if it may be created.
pub fn validate_name(name: &str) -> TreeResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }
    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
        }
    }
    if name == "." || name == ".." {
        return Err(invalid(name, "must not be '.' or '..'"));
    }
    if name == SIDECAR_NAME {
        return Err(invalid(name, "reserved for directory metadata"));
    }
    if name.starts_with(TEMP_PREFIX) {
        return Err(invalid(name, format!("must not start with {TEMP_PREFIX:?}")));
    }
    Ok(())
}

/// Whether `name` is hidden from child enumeration.
pub fn is_reserved(name: &str) -> bool {
    name == SIDECAR_NAME || name.starts_with(TEMP_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(validate_name("with space").is_ok());
        assert!(validate_name(".hidden").is_ok());
        assert!(validate_name("a..b").is_ok());
    }

    #[test]
    fn reject_empty_and_dots() {
        assert!(validate_name("").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
    }

    #[test]
    fn reject_separators() {
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("nul\0").is_err());
    }

    #[test]
    fn reject_reserved() {
        assert!(validate_name(SIDECAR_NAME).is_err());
        assert!(validate_name(".tmpXYZ").is_err());
        assert!(is_reserved(SIDECAR_NAME));
        assert!(!is_reserved("data"));
    }
}
