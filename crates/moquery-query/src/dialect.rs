//! Per-engine SQL dialect descriptors.
//!
//! A [`Dialect`] is a small `Copy` table of quoting rules, placeholder style
//! and capability flags. It is resolved from a connection's vendor name each
//! time a query is finalized and handed explicitly to every compose call, so
//! there is no process-wide escaper state to patch or restore.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Database engines with a known dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgresql,
    Mysql,
    Sqlite,
    /// Anything else; generates standard SQL.
    Unknown,
}

impl Engine {
    /// Canonical vendor name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Engine::Postgresql => "postgresql",
            Engine::Mysql => "mysql",
            Engine::Sqlite => "sqlite",
            Engine::Unknown => "unknown",
        }
    }

    /// Match a vendor name case-insensitively.
    pub fn from_vendor(vendor: &str) -> Option<Self> {
        match vendor.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Some(Engine::Postgresql),
            "mysql" => Some(Engine::Mysql),
            "sqlite" | "sqlite3" => Some(Engine::Sqlite),
            _ => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quoting, placeholder and capability rules for one engine.
#[derive(Clone, Copy)]
pub struct Dialect {
    engine: Engine,
    quote: char,
    escape_string: fn(&str) -> String,
    placeholder: fn(usize) -> String,
    no_limit: &'static str,
    grouped_aggregate_columns: bool,
    delete_subquery_on_target: bool,
}

impl Dialect {
    pub const POSTGRESQL: Dialect = Dialect {
        engine: Engine::Postgresql,
        quote: '"',
        escape_string: escape_standard,
        placeholder: dollar_placeholder,
        no_limit: "ALL",
        grouped_aggregate_columns: true,
        delete_subquery_on_target: true,
    };

    /// MySQL refuses `DELETE FROM t WHERE pk IN (SELECT .. FROM t ..)`.
    pub const MYSQL: Dialect = Dialect {
        engine: Engine::Mysql,
        quote: '`',
        escape_string: escape_backslash,
        placeholder: question_placeholder,
        no_limit: "18446744073709551615",
        grouped_aggregate_columns: true,
        delete_subquery_on_target: false,
    };

    /// SQLite resolves `MIN(col)` against the whole group rather than the
    /// selected row, so grouped queries keep the plain star list.
    pub const SQLITE: Dialect = Dialect {
        engine: Engine::Sqlite,
        quote: '"',
        escape_string: escape_standard,
        placeholder: numbered_placeholder,
        no_limit: "-1",
        grouped_aggregate_columns: false,
        delete_subquery_on_target: true,
    };

    pub const STANDARD: Dialect = Dialect {
        engine: Engine::Unknown,
        quote: '"',
        escape_string: escape_standard,
        placeholder: question_placeholder,
        no_limit: "ALL",
        grouped_aggregate_columns: true,
        delete_subquery_on_target: true,
    };

    /// The descriptor for an engine.
    pub const fn for_engine(engine: Engine) -> Dialect {
        match engine {
            Engine::Postgresql => Self::POSTGRESQL,
            Engine::Mysql => Self::MYSQL,
            Engine::Sqlite => Self::SQLITE,
            Engine::Unknown => Self::STANDARD,
        }
    }

    pub const fn engine(&self) -> Engine {
        self.engine
    }

    /// Identifier quote character.
    pub const fn quote_char(&self) -> char {
        self.quote
    }

    /// Escape the body of a string literal (without the surrounding quotes).
    pub fn escape_string(&self, text: &str) -> String {
        (self.escape_string)(text)
    }

    /// Placeholder for the given 1-based parameter index.
    pub fn placeholder(&self, index: usize) -> String {
        (self.placeholder)(index)
    }

    /// LIMIT value meaning "no limit", used when only an offset is set.
    pub const fn no_limit(&self) -> &'static str {
        self.no_limit
    }

    /// Whether grouped queries may select `MIN(col) AS col` per field.
    pub const fn supports_grouped_aggregate_columns(&self) -> bool {
        self.grouped_aggregate_columns
    }

    /// Whether a DELETE may filter its own table through a subquery.
    pub const fn allows_delete_subquery_on_target(&self) -> bool {
        self.delete_subquery_on_target
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("engine", &self.engine)
            .field("quote", &self.quote)
            .field("no_limit", &self.no_limit)
            .field("grouped_aggregate_columns", &self.grouped_aggregate_columns)
            .field("delete_subquery_on_target", &self.delete_subquery_on_target)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Dialect {
    fn eq(&self, other: &Self) -> bool {
        self.engine == other.engine
    }
}

impl Eq for Dialect {}

impl Default for Dialect {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Resolve the dialect for a connection vendor name.
///
/// Unrecognised vendors get standard SQL and a warning.
pub fn resolve_dialect(vendor: &str) -> Dialect {
    if let Some(engine) = Engine::from_vendor(vendor) {
        Dialect::for_engine(engine)
    } else {
        tracing::warn!(
            vendor = vendor,
            "database engine is not supported; generating standard SQL"
        );
        Dialect::STANDARD
    }
}

fn escape_standard(text: &str) -> String {
    text.replace('\'', "''")
}

fn escape_backslash(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out
}

fn dollar_placeholder(index: usize) -> String {
    format!("${index}")
}

fn numbered_placeholder(index: usize) -> String {
    format!("?{index}")
}

fn question_placeholder(_index: usize) -> String {
    "?".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_names_resolve_case_insensitively() {
        assert_eq!(resolve_dialect("PostgreSQL").engine(), Engine::Postgresql);
        assert_eq!(resolve_dialect("postgres").engine(), Engine::Postgresql);
        assert_eq!(resolve_dialect("MySQL").engine(), Engine::Mysql);
        assert_eq!(resolve_dialect("sqlite3").engine(), Engine::Sqlite);
    }

    #[test]
    fn unknown_vendor_gets_standard_sql() {
        let dialect = resolve_dialect("oracle");
        assert_eq!(dialect, Dialect::STANDARD);
        assert_eq!(dialect.quote_char(), '"');
        assert_eq!(dialect.no_limit(), "ALL");
    }

    #[test]
    fn capability_flags() {
        assert!(!Dialect::MYSQL.allows_delete_subquery_on_target());
        assert!(Dialect::MYSQL.supports_grouped_aggregate_columns());
        assert!(!Dialect::SQLITE.supports_grouped_aggregate_columns());
        assert!(Dialect::SQLITE.allows_delete_subquery_on_target());
        assert!(Dialect::POSTGRESQL.supports_grouped_aggregate_columns());
    }

    #[test]
    fn placeholders() {
        assert_eq!(Dialect::POSTGRESQL.placeholder(3), "$3");
        assert_eq!(Dialect::SQLITE.placeholder(3), "?3");
        assert_eq!(Dialect::MYSQL.placeholder(3), "?");
        assert_eq!(Dialect::STANDARD.placeholder(1), "?");
    }

    #[test]
    fn string_escaping() {
        assert_eq!(Dialect::POSTGRESQL.escape_string("O'Hara"), "O''Hara");
        assert_eq!(Dialect::MYSQL.escape_string("O'Hara"), "O\\'Hara");
        assert_eq!(Dialect::MYSQL.escape_string("a\\b\n"), "a\\\\b\\n");
        assert_eq!(Dialect::MYSQL.escape_string("\0\x1a"), "\\0\\Z");
    }

    #[test]
    fn no_limit_sentinels() {
        assert_eq!(Dialect::MYSQL.no_limit(), "18446744073709551615");
        assert_eq!(Dialect::SQLITE.no_limit(), "-1");
        assert_eq!(Dialect::POSTGRESQL.no_limit(), "ALL");
    }

    #[test]
    fn engine_names_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Engine::Postgresql).unwrap(), "\"postgresql\"");
        let engine: Engine = serde_json::from_str("\"mysql\"").unwrap();
        assert_eq!(engine, Engine::Mysql);
        assert_eq!(engine.to_string(), "mysql");
    }
}
