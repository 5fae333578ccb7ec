//! Immutable SQL statements with positional arguments.
//!
//! A [`Query`] pairs an already-escaped template containing `?` placeholders with the
//! ordered list of values bound to them. Queries are never mutated; composing them with
//! [`Query::concatenate`] or [`Query::atomic`] produces a new value whose arguments line
//! up with the placeholders when the text is read left to right.

use std::fmt;

/// Errors raised while constructing a query.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unexpected empty query")]
    Empty,
}

/// A value bound to a `?` placeholder.
#[derive(Clone, PartialEq, Eq)]
pub enum SqlArg {
    Text(String),
    Int(i64),
    UInt(u64),
}

impl fmt::Debug for SqlArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlArg::Text(s) => write!(f, "{s:?}"),
            SqlArg::Int(v) => write!(f, "{v}"),
            SqlArg::UInt(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for SqlArg {
    fn from(value: &str) -> Self {
        SqlArg::Text(value.to_string())
    }
}

impl From<&String> for SqlArg {
    fn from(value: &String) -> Self {
        SqlArg::Text(value.clone())
    }
}

impl From<String> for SqlArg {
    fn from(value: String) -> Self {
        SqlArg::Text(value)
    }
}

impl From<i64> for SqlArg {
    fn from(value: i64) -> Self {
        SqlArg::Int(value)
    }
}

impl From<u64> for SqlArg {
    fn from(value: u64) -> Self {
        SqlArg::UInt(value)
    }
}

/// An escaped SQL template terminated with `;` plus its positional arguments.
#[derive(Clone, PartialEq, Eq)]
pub struct Query {
    escaped: String,
    args: Vec<SqlArg>,
}

impl Query {
    /// Build a query, appending a trailing `;` when missing.
    pub fn new(text: impl Into<String>, args: Vec<SqlArg>) -> Result<Self, QueryError> {
        let mut escaped = text.into();
        if escaped.is_empty() {
            return Err(QueryError::Empty);
        }
        if !escaped.ends_with(';') {
            escaped.push(';');
        }
        Ok(Self { escaped, args })
    }

    /// Build a query without arguments.
    pub fn plain(text: impl Into<String>) -> Result<Self, QueryError> {
        Self::new(text, Vec::new())
    }

    /// Join queries with newlines, concatenating their arguments in the same order.
    pub fn concatenate<I>(queries: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = Query>,
    {
        let mut text = String::new();
        let mut args = Vec::new();

        for query in queries {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&query.escaped);
            args.extend(query.args);
        }

        Self::new(text, args)
    }

    /// Wrap queries in `BEGIN;` / `COMMIT;` so they apply as a single transaction.
    pub fn atomic<I>(queries: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = Query>,
    {
        let begin = Self::plain("BEGIN")?;
        let commit = Self::plain("COMMIT")?;

        Self::concatenate(std::iter::once(begin).chain(queries).chain(std::iter::once(commit)))
    }

    pub fn as_str(&self) -> &str {
        &self.escaped
    }

    pub fn args(&self) -> &[SqlArg] {
        &self.args
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.escaped)
    }
}

// Arguments may carry credentials, so Debug only reports how many there are.
impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("escaped", &self.escaped)
            .field("args", &self.args.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(text: &str, args: Vec<SqlArg>) -> Query {
        Query::new(text, args).unwrap()
    }

    #[test]
    fn test_new_appends_semicolon() {
        assert_eq!(q("SELECT 1", vec![]).as_str(), "SELECT 1;");
        assert_eq!(q("SELECT 1;", vec![]).as_str(), "SELECT 1;");
    }

    #[test]
    fn test_new_rejects_empty_text() {
        assert_eq!(Query::new("", vec![]), Err(QueryError::Empty));
        assert_eq!(Query::concatenate(Vec::new()), Err(QueryError::Empty));
    }

    #[test]
    fn test_concatenate_joins_with_newlines() {
        let joined = Query::concatenate(vec![
            q("SELECT ?", vec!["a".into()]),
            q("SELECT ?, ?", vec!["b".into(), 2i64.into()]),
        ])
        .unwrap();

        assert_eq!(joined.as_str(), "SELECT ?;\nSELECT ?, ?;");
        assert_eq!(joined.args(), &[SqlArg::from("a"), SqlArg::from("b"), SqlArg::Int(2)]);
    }

    #[test]
    fn test_concatenate_of_one_query_is_unchanged() {
        let single = q("SELECT ?", vec!["a".into()]);
        assert_eq!(Query::concatenate(vec![single.clone()]).unwrap(), single);
    }

    #[test]
    fn test_atomic_wraps_in_transaction() {
        let q1 = q("INSERT INTO t VALUES (?)", vec!["x".into()]);
        let q2 = q("UPDATE t SET v = ?", vec![7u64.into()]);
        let atomic = Query::atomic(vec![q1.clone(), q2.clone()]).unwrap();

        assert!(atomic.as_str().starts_with("BEGIN;"));
        assert!(atomic.as_str().ends_with("COMMIT;"));
        assert_eq!(atomic.as_str(), "BEGIN;\nINSERT INTO t VALUES (?);\nUPDATE t SET v = ?;\nCOMMIT;");

        let expected: Vec<SqlArg> = q1.args().iter().chain(q2.args()).cloned().collect();
        assert_eq!(atomic.args(), expected.as_slice());
    }

    #[test]
    fn test_atomic_of_nothing_is_just_begin_commit() {
        let atomic = Query::atomic(Vec::new()).unwrap();
        assert_eq!(atomic.as_str(), "BEGIN;\nCOMMIT;");
        assert!(atomic.args().is_empty());
    }

    #[test]
    fn test_debug_hides_argument_values() {
        let query = q("ALTER USER ?@? IDENTIFIED BY ?", vec!["u".into(), "%".into(), "hunter2".into()]);
        let rendered = format!("{query:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("args: 3"));
    }
}
