//! The immutable description of one SELECT.

use crate::clause::{Condition, Expression, Join, OrderBy, SelectItem};
use indexmap::IndexMap;
use moquery_core::{BuildErrorKind, Entity, Error, Result};

/// Everything needed to compose a SELECT for an entity.
///
/// Built and copied by [`QuerySet`](crate::QuerySet); the composer only
/// reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub(crate) entity: Entity,
    pub(crate) alias: Option<String>,
    /// `None` keeps the default star (or grouped) list
    pub(crate) select: Option<Vec<SelectItem>>,
    pub(crate) extra: Vec<SelectItem>,
    /// Keyed by the caller's condition key, in first-insertion order
    pub(crate) conditions: IndexMap<String, Condition>,
    pub(crate) joins: Vec<Join>,
    pub(crate) group_by: Vec<Expression>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) offset: Option<u64>,
    pub(crate) limit: Option<u64>,
}

impl QuerySpec {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            alias: None,
            select: None,
            extra: Vec::new(),
            conditions: IndexMap::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.entity.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The name columns are qualified with: the alias, else the table.
    pub fn source_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.entity.table)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn group_by(&self) -> &[Expression] {
        &self.group_by
    }

    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// True when a DELETE can reuse the conditions directly: no alias,
    /// joins, grouping, ordering or window.
    pub fn is_plain_filter(&self) -> bool {
        self.alias.is_none()
            && self.joins.is_empty()
            && self.group_by.is_empty()
            && self.order_by.is_empty()
            && self.offset.is_none()
            && self.limit.is_none()
    }

    /// Narrow the row window by `[start, stop)` relative to the current one.
    ///
    /// Fails with `UnsupportedIndex` when the accumulated offset no longer
    /// fits in a `u64`; the spec is left untouched in that case.
    pub(crate) fn narrow(&mut self, start: u64, stop: Option<u64>) -> Result<()> {
        let offset = self.offset.unwrap_or(0).checked_add(start).ok_or_else(|| {
            Error::build(
                BuildErrorKind::UnsupportedIndex,
                format!("slice start {start} overflows the current offset"),
            )
        })?;
        if offset > 0 {
            self.offset = Some(offset);
        }

        let remaining = self.limit.map(|limit| limit.saturating_sub(start));
        let span = stop.map(|stop| stop.saturating_sub(start));
        self.limit = match (remaining, span) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Ok(())
    }
}
