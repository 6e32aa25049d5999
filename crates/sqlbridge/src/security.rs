//! Escaping and validation helpers.
//!
//! Statement templates substitute values as plain text, so any value that came
//! from outside the program must be escaped by the caller before rendering.
//! This module provides:
//! - String literal escaping (standard SQL and MySQL flavours)
//! - Pool name validation

use crate::error::Error;

/// Maximum pool name length accepted by [`validate_pool_name`]
pub const MAX_POOL_NAME_LEN: usize = 64;

/// Escape a value for a single-quoted standard SQL string literal.
///
/// Replaces `'` with `''`.
///
/// # Examples
///
/// ```
/// use sqlbridge::security::escape_string_literal;
///
/// assert_eq!(escape_string_literal("users"), "users");
/// assert_eq!(escape_string_literal("don't"), "don''t");
/// ```
pub fn escape_string_literal(value: &str) -> String {
    // Fast path: no escaping needed (common case)
    if !value.contains('\'') {
        return value.to_string();
    }
    value.replace('\'', "''")
}

/// Escape a value for a MySQL string literal under the default SQL mode,
/// where backslash is an escape character.
///
/// # Examples
///
/// ```
/// use sqlbridge::security::escape_mysql_string;
///
/// assert_eq!(escape_mysql_string("it's"), "it\\'s");
/// assert_eq!(escape_mysql_string("a\\b"), "a\\\\b");
/// ```
pub fn escape_mysql_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

/// Escape and wrap a value in single quotes for MySQL
///
/// ```
/// use sqlbridge::security::quote_mysql_string;
///
/// assert_eq!(quote_mysql_string("O'Brien"), "'O\\'Brien'");
/// ```
pub fn quote_mysql_string(value: &str) -> String {
    format!("'{}'", escape_mysql_string(value))
}

/// Validate a connection pool name.
///
/// Names must be 1 to 64 characters long and use only ASCII letters, digits
/// and `.`, `_`, `:`, `-`, `*`, `$`, `#`.
///
/// ```
/// use sqlbridge::security::validate_pool_name;
///
/// assert!(validate_pool_name("mysql_pool").is_ok());
/// assert!(validate_pool_name("orders:ro#1").is_ok());
/// assert!(validate_pool_name("").is_err());
/// assert!(validate_pool_name("bad name").is_err());
/// ```
pub fn validate_pool_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("Pool name cannot be empty"));
    }

    if name.len() > MAX_POOL_NAME_LEN {
        return Err(Error::config(format!(
            "Pool name too long: {} chars (max {})",
            name.len(),
            MAX_POOL_NAME_LEN
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !"._:-*$#".contains(*c))
    {
        return Err(Error::config(format!(
            "Invalid pool name '{}': contains invalid character '{}'",
            name, c
        )));
    }

    Ok(())
}
