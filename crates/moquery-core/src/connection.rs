//! Executor and connection-routing collaborators.
//!
//! - [`Connection`] - executes finished SQL text and reports its engine vendor
//! - [`ConnectionRouter`] - picks a connection for a database alias and intent
//! - [`Databases`] - a map-backed router with optional read replicas
//!
//! Execution integrates with asupersync's structured concurrency via the `Cx`
//! context. The query core performs at most a couple of round trips per call
//! and leaves timeouts and retries to the executor.

use crate::config::RouterConfig;
use crate::error::{ConfigError, Error, Result};
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::collections::HashMap;

/// Whether a statement only reads or also writes.
///
/// Routers may send reads to a replica; writes always go to the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
}

/// A database connection capable of executing SQL.
///
/// Driver errors are returned unmodified; the query core never interprets
/// them.
pub trait Connection: Send + Sync {
    /// Engine vendor name, e.g. `"postgresql"`, `"mysql"` or `"sqlite"`.
    fn vendor(&self) -> &str;

    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a statement (UPDATE, DELETE, ...) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;
}

/// Resolves a logical database alias to a live connection.
pub trait ConnectionRouter: Send + Sync {
    /// The connection type handed out by this router.
    type Conn: Connection;

    /// Get the connection for `alias` (`None` means the default database).
    fn connection(&self, alias: Option<&str>, intent: AccessIntent) -> Result<&Self::Conn>;
}

/// A [`ConnectionRouter`] over a fixed set of named connections.
///
/// Unknown aliases fall back to the default alias. Reads are sent to the
/// replica configured for an alias when that replica is registered.
#[derive(Debug)]
pub struct Databases<C> {
    config: RouterConfig,
    connections: HashMap<String, C>,
}

impl<C: Connection> Databases<C> {
    /// Create an empty router with the given configuration.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            connections: HashMap::new(),
        }
    }

    /// Create a router holding one connection under the default alias.
    pub fn single(conn: C) -> Self {
        let config = RouterConfig::default();
        let alias = config.default_alias.clone();
        Self::new(config).with(alias, conn)
    }

    /// Register a connection under `alias`.
    pub fn with(mut self, alias: impl Into<String>, conn: C) -> Self {
        self.connections.insert(alias.into(), conn);
        self
    }

    /// The router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    fn primary_alias<'a>(&'a self, alias: Option<&'a str>) -> &'a str {
        let default = self.config.default_alias.as_str();
        match alias {
            Some(name) if self.connections.contains_key(name) => name,
            Some(name) => {
                tracing::warn!(
                    alias = name,
                    default = default,
                    "unknown database alias; using default"
                );
                default
            }
            None => default,
        }
    }
}

impl<C: Connection> ConnectionRouter for Databases<C> {
    type Conn = C;

    fn connection(&self, alias: Option<&str>, intent: AccessIntent) -> Result<&C> {
        let primary = self.primary_alias(alias);

        let chosen = match intent {
            AccessIntent::Read => match self.config.replicas.get(primary) {
                Some(replica) if self.connections.contains_key(replica) => replica.as_str(),
                _ => primary,
            },
            AccessIntent::Write => primary,
        };

        tracing::trace!(alias = chosen, ?intent, "routed connection");

        self.connections.get(chosen).ok_or_else(|| {
            Error::Config(ConfigError {
                message: format!("no connection registered for database alias '{}'", chosen),
                source: None,
            })
        })
    }
}
