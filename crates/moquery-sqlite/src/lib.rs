//! SQLite executor for moquery.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate runs the SQL that `moquery-query` composes against a SQLite
//! database through the bundled libsqlite3. It implements the `Connection`
//! trait from moquery-core and reports its vendor as `"sqlite"`, so query
//! sets bound to it render with the SQLite dialect (`?N` placeholders,
//! `LIMIT -1` for an unbounded limit).
//!
//! # Example
//!
//! ```rust,ignore
//! use moquery_sqlite::SqliteConnection;
//! use moquery_core::{Connection, Cx, Outcome, Value};
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE fruit (id INTEGER PRIMARY KEY, kind TEXT)")?;
//!
//! let cx = Cx::for_testing();
//! match conn.query(&cx, "SELECT kind FROM fruit WHERE id = ?1", &[Value::Int(1)]).await {
//!     Outcome::Ok(rows) => println!("{} rows", rows.len()),
//!     Outcome::Err(e) => eprintln!("Error: {}", e),
//!     _ => {}
//! }
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `TinyInt`, `SmallInt`, `Int`, `BigInt` | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Decimal`, `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Array` | TEXT (JSON) |
//! | `Null` | NULL |
//!
//! INTEGER columns read back as `Int` when they fit in 32 bits and as
//! `BigInt` otherwise.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{SqliteConfig, SqliteConnection};

/// The linked SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
