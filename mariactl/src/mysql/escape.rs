//! String and identifier escaping for MySQL-dialect statements.
//!
//! Two containment strategies are used:
//!
//! - [`escape`] rewrites a value so it can sit inside a single-quoted literal. It is
//!   byte-wise: multi-byte UTF-8 sequences never contain the rewritten bytes, so they pass
//!   through untouched.
//! - [`escape_identifier`] handles schema/table names, which cannot be bound as
//!   parameters. Backticks are stripped rather than doubled, then the name is wrapped.

/// Escape `raw` for embedding in a single-quoted SQL literal.
pub fn escape(raw: &str) -> String {
    let mut dest = String::with_capacity(raw.len() * 2);
    for ch in raw.chars() {
        let substitute = match ch {
            '\0' => Some('0'),
            '\n' => Some('n'),
            '\r' => Some('r'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            '\x1a' => Some('Z'),
            _ => None,
        };

        match substitute {
            Some(sub) => {
                dest.push('\\');
                dest.push(sub);
            }
            None => dest.push(ch),
        }
    }
    dest
}

/// Quote an identifier with backticks, removing any backticks it contains.
///
/// The wildcard `*` is returned unchanged so that `GRANT ... ON db.*` keeps working.
pub fn escape_identifier(id: &str) -> String {
    if id == "*" {
        return id.to_string();
    }

    format!("`{}`", id.replace('`', ""))
}
