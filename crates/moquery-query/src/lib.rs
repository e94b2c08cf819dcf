//! Dialect-aware SQL composition for moquery.
//!
//! `moquery-query` is the **query construction layer**. It turns entity
//! metadata plus chained builder calls into SELECT and DELETE text for
//! PostgreSQL, MySQL and SQLite.
//!
//! # Role In The Architecture
//!
//! - **Dialects**: [`Dialect`] descriptors resolved from a connection's vendor
//!   name and passed explicitly to every compose call.
//! - **Escaping**: identifier quoting and literal formatting per dialect.
//! - **Clauses**: select items, conditions, ordering, joins and aggregates.
//! - **Builder**: [`QuerySet`], an immutable chainable query that composes on
//!   demand and executes through `moquery-core`'s `Connection` trait.

pub mod clause;
pub mod compose;
pub mod dialect;
pub mod escape;
pub mod func;
pub mod queryset;
pub mod spec;

pub use clause::{
    Condition, Direction, Expression, Join, JoinTarget, JoinType, Operand, Operator, OrderBy,
    SelectItem,
};
pub use compose::{compose_delete, compose_select};
pub use dialect::{Dialect, Engine, resolve_dialect};
pub use escape::{LiteralMode, SqlWriter, format_literal, quote_identifier};
pub use func::Aggregate;
pub use queryset::{DeletePlan, QuerySet};
pub use spec::QuerySpec;
