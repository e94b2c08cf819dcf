//! Aggregate function expressions.
//!
//! An [`Aggregate`] holds a function name and raw column references; it is
//! only turned into SQL text when a query is composed for a dialect.
//!
//! ```
//! use moquery_query::dialect::Dialect;
//! use moquery_query::func;
//!
//! let sql = func::min("price").resolve(&Dialect::MYSQL).unwrap();
//! assert_eq!(sql, "MIN(`price`)");
//! ```

use crate::dialect::Dialect;
use crate::escape::quote_identifier;
use moquery_core::{BuildErrorKind, Error, Result};

/// A deferred aggregate call such as `MIN("price")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    name: &'static str,
    args: Vec<String>,
}

impl Aggregate {
    pub fn new(name: &'static str, args: impl AggregateArgs) -> Self {
        Self {
            name,
            args: args.into_args(),
        }
    }

    /// Upper-case function name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Render `NAME(arg, ...)` with each argument quoted for `dialect`.
    pub fn resolve(&self, dialect: &Dialect) -> Result<String> {
        if self.args.is_empty() {
            return Err(Error::build(
                BuildErrorKind::InvalidIdentifier,
                format!("{}() needs at least one argument", self.name),
            ));
        }
        let args = self
            .args
            .iter()
            .map(|arg| {
                if arg == "*" {
                    Ok("*".to_string())
                } else {
                    quote_identifier(dialect, arg)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{}({})", self.name, args.join(", ")))
    }
}

/// Argument lists accepted by the aggregate constructors.
pub trait AggregateArgs {
    fn into_args(self) -> Vec<String>;
}

impl AggregateArgs for &str {
    fn into_args(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl AggregateArgs for String {
    fn into_args(self) -> Vec<String> {
        vec![self]
    }
}

impl<const N: usize> AggregateArgs for [&str; N] {
    fn into_args(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_string()).collect()
    }
}

impl AggregateArgs for &[&str] {
    fn into_args(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_string()).collect()
    }
}

impl AggregateArgs for Vec<String> {
    fn into_args(self) -> Vec<String> {
        self
    }
}

pub fn avg(args: impl AggregateArgs) -> Aggregate {
    Aggregate::new("AVG", args)
}

/// `COUNT(..)`; pass `"*"` for `COUNT(*)`.
pub fn count(args: impl AggregateArgs) -> Aggregate {
    Aggregate::new("COUNT", args)
}

pub fn min(args: impl AggregateArgs) -> Aggregate {
    Aggregate::new("MIN", args)
}

pub fn max(args: impl AggregateArgs) -> Aggregate {
    Aggregate::new("MAX", args)
}

pub fn stddev(args: impl AggregateArgs) -> Aggregate {
    Aggregate::new("STDDEV", args)
}

pub fn sum(args: impl AggregateArgs) -> Aggregate {
    Aggregate::new("SUM", args)
}

pub fn variance(args: impl AggregateArgs) -> Aggregate {
    Aggregate::new("VARIANCE", args)
}
