//! Core types and collaborator traits for moquery.
//!
//! This crate provides the pieces the query builder consumes but does not own:
//!
//! - `Value` and `Row` for literals and fetched rows
//! - `Entity` metadata and the `EntityResolver` registry seam
//! - `Connection` / `ConnectionRouter` for executing finished SQL
//! - `Error` shared by every crate in the workspace

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod row;
pub mod types;
pub mod value;

pub use config::RouterConfig;
pub use connection::{AccessIntent, Connection, ConnectionRouter, Databases};
pub use entity::{Entity, EntityRegistry, EntityResolver, FieldDef};
pub use error::{BuildError, BuildErrorKind, Error, Result};
pub use row::{ColumnInfo, FromValue, Row};
pub use types::SqlType;
pub use value::Value;
