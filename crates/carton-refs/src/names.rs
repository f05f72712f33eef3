//! Ref name validation.
//!
//! Valid ref names:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` (double dot)
//! - Must not start or end with `.` or `/`
//! - Must not end with `.lock`
//! - Components between slashes must be non-empty
//!
//! The rules keep names unambiguous on the command line and safe to map
//! onto filesystem paths in [`crate::FsRefStore`].

use crate::error::{RefError, RefResult};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

/// Validate a ref name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use carton_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("main").is_ok());
/// assert!(validate_ref_name("builds/nightly").is_ok());
/// assert!(validate_ref_name("").is_err());
/// assert!(validate_ref_name("bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> RefResult<()> {
    let invalid = |reason: &str| {
        Err(RefError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("ref name must not be empty");
    }
    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(RefError::InvalidName {
                name: name.to_string(),
                reason: format!("contains forbidden character: {ch:?}"),
            });
        }
    }
    if name.contains("..") {
        return invalid("must not contain '..'");
    }
    if name.starts_with('.') || name.ends_with('.') {
        return invalid("must not start or end with '.'");
    }
    if name.starts_with('/') || name.ends_with('/') {
        return invalid("must not start or end with '/'");
    }
    if name.ends_with(".lock") {
        return invalid("must not end with '.lock'");
    }
    if name.split('/').any(str::is_empty) {
        return invalid("components between slashes must be non-empty");
    }
    Ok(())
}
