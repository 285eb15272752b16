//! T-SQL identifier quoting for statements that cannot take parameters.

use crate::{CatalogError, Result};

/// Longest identifier SQL Server accepts (`sysname`).
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Quotes `name` as a bracketed T-SQL identifier, doubling any `]`.
///
/// The name is used verbatim apart from the escape; it is not trimmed or
/// case-folded.
///
/// ```rust
/// use catalog_core::bootstrap::quote_identifier;
///
/// assert_eq!(quote_identifier("catalog_reader")?, "[catalog_reader]");
/// assert_eq!(quote_identifier("odd]name")?, "[odd]]name]");
/// # Ok::<(), catalog_core::CatalogError>(())
/// ```
///
/// # Errors
/// Returns a configuration error for a blank name, a name longer than
/// [`MAX_IDENTIFIER_LEN`] characters, or one containing NUL.
pub fn quote_identifier(name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(CatalogError::configuration("Identifier must not be blank"));
    }
    if name.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(CatalogError::configuration(format!(
            "Identifier is longer than {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if name.contains('\0') {
        return Err(CatalogError::configuration(
            "Identifier must not contain NUL characters",
        ));
    }

    Ok(format!("[{}]", name.replace(']', "]]")))
}
