//! moquery - an immutable, dialect-aware SQL query builder.
//!
//! A [`QuerySet`] describes a SELECT over one entity. Every builder call
//! returns a new query set, so partial queries can be shared and extended
//! without affecting each other. SQL is composed only when the query set is
//! rendered or executed, using the [`Dialect`] of the connection it runs on:
//!
//! - PostgreSQL: `"ident"`, `$N` placeholders, `LIMIT ALL`
//! - MySQL: `` `ident` ``, `?` placeholders, key collection before deletes
//! - SQLite: `"ident"`, `?N` placeholders, `LIMIT -1`
//!
//! # Quick Start
//!
//! ```ignore
//! use moquery::prelude::*;
//! use moquery::sqlite::SqliteConnection;
//!
//! async fn cheap_fruit(cx: &Cx) -> Result<Vec<Row>> {
//!     let fruit = Entity::new("shop.FruitProduct", "fruit")
//!         .field("id", SqlType::Integer)
//!         .field("kind", SqlType::Text)
//!         .field("price", SqlType::Double);
//!
//!     let dbs = Databases::single(SqliteConnection::open_memory()?);
//!     let qs = QuerySet::new(fruit)
//!         .where_([("price <", 1.0)])?
//!         .order_by(["kind", "-price"])?
//!         .slice(..10)?;
//!
//!     match qs.fetch(cx, &dbs).await {
//!         Outcome::Ok(rows) => Ok(rows),
//!         Outcome::Err(e) => Err(e),
//!         _ => Err(Error::Custom("fetch did not complete".into())),
//!     }
//! }
//! ```
//!
//! # Crates
//!
//! - `moquery-core`: values, rows, entity metadata, connection traits, errors
//! - `moquery-query`: dialects, escaping, clauses and the query set
//! - `moquery-sqlite`: a bundled SQLite executor (feature `sqlite`, default)

pub use moquery_core::{
    AccessIntent, BuildError, BuildErrorKind, ColumnInfo, Connection, ConnectionRouter, Cx,
    Databases, Entity, EntityRegistry, EntityResolver, Error, FieldDef, FromValue, Outcome,
    Result, Row, RouterConfig, SqlType, Value,
};
pub use moquery_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};

pub use moquery_query::func;
pub use moquery_query::{
    Aggregate, Condition, DeletePlan, Dialect, Direction, Engine, Expression, Join, JoinTarget,
    JoinType, LiteralMode, Operand, Operator, OrderBy, QuerySet, QuerySpec, SelectItem,
    SqlWriter, compose_delete, compose_select, format_literal, quote_identifier,
    resolve_dialect,
};

/// The SQLite executor.
#[cfg(feature = "sqlite")]
pub mod sqlite {
    pub use moquery_sqlite::{SqliteConfig, SqliteConnection, sqlite_version};
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use moquery::prelude::*;
/// ```
pub mod prelude {
    pub use crate::func::{avg, count, max, min, stddev, sum, variance};
    pub use crate::{
        Connection, Cx, Databases, Dialect, Engine, Entity, EntityRegistry, Error, FromValue,
        Join, JoinTarget, JoinType, Operand, Outcome, QuerySet, Result, Row, SelectItem,
        SqlType, Value,
    };
}
