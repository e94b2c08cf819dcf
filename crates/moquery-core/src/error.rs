//! Error types for moquery operations.

use std::fmt;

/// The primary error type for all moquery operations.
#[derive(Debug)]
pub enum Error {
    /// The builder was given something it cannot turn into SQL
    Build(BuildError),
    /// Connection-related errors (connect, routing, disconnect)
    Connection(ConnectionError),
    /// Query execution errors reported by the executor
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// An error raised while building or composing a query.
///
/// These surface synchronously at the builder call (or at composition for
/// identifiers and deferred join targets) and are never retried.
#[derive(Debug, Clone)]
pub struct BuildError {
    pub kind: BuildErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    /// Empty identifier, empty dotted segment, or embedded NUL
    InvalidIdentifier,
    /// Order-by token that is not `name`, `-name`, `name ASC` or `name DESC`
    InvalidOrderBy,
    /// Join target that is empty or cannot be resolved
    InvalidJoinTarget,
    /// Negative index or slice bound
    UnsupportedIndex,
    /// Where key with an operator outside the allowed set
    InvalidCondition,
    /// Literal that has no SQL representation (NaN, infinity)
    InvalidLiteral,
}

impl BuildErrorKind {
    /// Short name used in error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            BuildErrorKind::InvalidIdentifier => "invalid identifier",
            BuildErrorKind::InvalidOrderBy => "invalid order by",
            BuildErrorKind::InvalidJoinTarget => "invalid join target",
            BuildErrorKind::UnsupportedIndex => "unsupported index",
            BuildErrorKind::InvalidCondition => "invalid condition",
            BuildErrorKind::InvalidLiteral => "invalid literal",
        }
    }
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// No connection is registered for the requested alias
    UnknownAlias,
    /// Connection lost during operation
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Lock contention
    Busy,
    /// Cancelled
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Shorthand for a [`BuildError`].
    pub fn build(kind: BuildErrorKind, message: impl Into<String>) -> Self {
        Error::Build(BuildError {
            kind,
            message: message.into(),
        })
    }

    /// The builder error kind, if this is a builder error.
    pub fn build_kind(&self) -> Option<BuildErrorKind> {
        match self {
            Error::Build(b) => Some(b.kind),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Build(e) => write!(f, "Build error: {}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Self {
        Error::Build(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for moquery operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_error_display_and_kind() {
        let err = Error::build(BuildErrorKind::InvalidOrderBy, "price kind");
        assert_eq!(err.build_kind(), Some(BuildErrorKind::InvalidOrderBy));
        assert_eq!(err.to_string(), "Build error: invalid order by: price kind");
    }

    #[test]
    fn sqlstate_and_sql_helpers() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: Some("DELETE FROM \"fruit\"".to_string()),
            sqlstate: Some("23503".to_string()),
            message: "foreign key violation".to_string(),
            source: None,
        });

        assert_eq!(err.sqlstate(), Some("23503"));
        assert_eq!(err.sql(), Some("DELETE FROM \"fruit\""));
        assert_eq!(err.build_kind(), None);
        assert_eq!(
            err.to_string(),
            "Query error (SQLSTATE 23503): foreign key violation"
        );
    }

    #[test]
    fn type_error_mentions_column() {
        let err = Error::Type(TypeError {
            expected: "f64",
            actual: "TEXT".to_string(),
            column: Some("price".to_string()),
        });
        assert_eq!(
            err.to_string(),
            "Type error: expected f64 for column 'price', found TEXT"
        );
    }
}
