//! The chainable query builder.
//!
//! Every transition returns a new [`QuerySet`] and leaves the receiver
//! untouched, so partially built queries can be shared and extended freely.
//!
//! # Example
//!
//! ```
//! use moquery_core::{Entity, SqlType};
//! use moquery_query::{Dialect, QuerySet};
//!
//! let fruit = Entity::new("shop.FruitProduct", "fruit")
//!     .field("id", SqlType::Integer)
//!     .field("kind", SqlType::Text);
//!
//! let qs = QuerySet::new(fruit).as_alias("f");
//! assert_eq!(
//!     qs.to_sql(&Dialect::MYSQL).unwrap(),
//!     "SELECT `f`.* FROM `fruit` AS `f`"
//! );
//! ```

use crate::clause::{
    Condition, Expression, Join, JoinTarget, JoinType, Operand, Operator, OrderBy, SelectItem,
};
use crate::compose::{compose_delete, compose_select};
use crate::dialect::{Dialect, resolve_dialect};
use crate::escape::{LiteralMode, SqlWriter, quote_identifier};
use crate::spec::QuerySpec;
use moquery_core::{
    AccessIntent, BuildErrorKind, Connection, ConnectionRouter, Cx, Entity, EntityResolver,
    Error, Outcome, Result, Row, Value,
};
use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

/// How a DELETE for a query set is carried out.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletePlan {
    /// A single statement removes the rows.
    Statement { sql: String, params: Vec<Value> },
    /// Run this SELECT to collect primary keys, then delete them by value.
    CollectKeys { sql: String, params: Vec<Value> },
}

/// A lazily composed query over one entity.
#[derive(Clone)]
pub struct QuerySet {
    spec: QuerySpec,
    db: Option<String>,
    registry: Option<Arc<dyn EntityResolver>>,
}

impl fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("spec", &self.spec)
            .field("db", &self.db)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

impl QuerySet {
    /// Create a query set selecting every row of `entity`.
    pub fn new(entity: Entity) -> Self {
        Self {
            spec: QuerySpec::new(entity),
            db: None,
            registry: None,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }

    /// Database alias this query runs against (`None` is the default).
    pub fn database(&self) -> Option<&str> {
        self.db.as_deref()
    }

    fn derive(&self, change: impl FnOnce(&mut QuerySpec)) -> Self {
        let mut next = self.clone();
        change(&mut next.spec);
        next
    }

    // ==================== Transitions ====================

    /// Append items after the default select list.
    pub fn select_extra<I, S>(&self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.derive(|spec| spec.extra.extend(items.into_iter().map(Into::into)))
    }

    /// Replace the whole select list, extras included.
    pub fn select_only<I, S>(&self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.derive(|spec| {
            spec.select = Some(items.into_iter().map(Into::into).collect());
            spec.extra.clear();
        })
    }

    /// Alias the main table (`FROM "t" AS "alias"`). Last call wins.
    pub fn as_alias(&self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.derive(|spec| spec.alias = Some(alias))
    }

    /// Merge conditions into the WHERE clause.
    ///
    /// Keys are `"<column>[ <operator>]"`. A key already present keeps its
    /// position and takes the new operand; other keys accumulate.
    ///
    /// # Errors
    ///
    /// `InvalidCondition` when a key names no column or an unsupported
    /// operator.
    pub fn where_<I, K, V>(&self, conditions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        let mut next = self.clone();
        for (key, operand) in conditions {
            let key = key.into();
            let condition = Condition::parse(&key, operand.into())?;
            next.spec.conditions.insert(key, condition);
        }
        Ok(next)
    }

    /// Append GROUP BY terms (columns or aggregates).
    pub fn group_by<I, E>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        self.derive(|spec| spec.group_by.extend(fields.into_iter().map(Into::into)))
    }

    /// Append ORDER BY terms: `name`, `name ASC`, `name DESC` or `-name`.
    ///
    /// # Errors
    ///
    /// `InvalidOrderBy` for any other token shape.
    pub fn order_by<I, S>(&self, tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = tokens
            .into_iter()
            .map(|t| OrderBy::parse(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.derive(|spec| spec.order_by.extend(terms)))
    }

    /// Join another table, entity or query.
    ///
    /// `on` pairs are identifiers on both sides. When both `on` and `using`
    /// are given, `on` is used. Without a type the join renders as a plain
    /// `JOIN` (or `NATURAL JOIN` when there is no condition at all).
    pub fn join(
        &self,
        target: impl Into<JoinTarget>,
        alias: &str,
        on: &[(&str, &str)],
        using: &[&str],
        join_type: Option<JoinType>,
    ) -> Result<Self> {
        let mut join = Join::new(target, alias).using(using.iter().copied());
        for (left, right) in on {
            join = join.on(*left, *right);
        }
        if let Some(join_type) = join_type {
            join = join.kind(join_type);
        }
        self.join_with(join)
    }

    /// Add a prepared [`Join`].
    pub fn join_with(&self, join: Join) -> Result<Self> {
        join.validate()?;
        Ok(self.derive(|spec| spec.joins.push(join)))
    }

    /// Restrict to the rows in `range`, relative to any earlier slice.
    ///
    /// ```
    /// # use moquery_core::Entity;
    /// # use moquery_query::{Dialect, QuerySet};
    /// let qs = QuerySet::new(Entity::new("t", "t"));
    /// let sql = qs.slice(1..7).unwrap().slice(2..4).unwrap().to_sql(&Dialect::SQLITE).unwrap();
    /// assert_eq!(sql, "SELECT \"t\".* FROM \"t\" LIMIT 2 OFFSET 3");
    /// ```
    ///
    /// # Errors
    ///
    /// `UnsupportedIndex` for negative bounds.
    pub fn slice<R: RangeBounds<i64>>(&self, range: R) -> Result<Self> {
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let stop = match range.end_bound() {
            Bound::Included(&e) => Some(e.saturating_add(1)),
            Bound::Excluded(&e) => Some(e),
            Bound::Unbounded => None,
        };

        let start = index_bound(start)?;
        let stop = stop.map(index_bound).transpose()?;
        let mut next = self.clone();
        next.spec.narrow(start, stop)?;
        Ok(next)
    }

    /// Run against the named database alias (`None` for the default).
    pub fn using(&self, alias: Option<&str>) -> Self {
        let mut next = self.clone();
        next.db = alias.map(str::to_string);
        next
    }

    /// Attach the resolver for entity join targets.
    pub fn with_registry(&self, registry: Arc<dyn EntityResolver>) -> Self {
        let mut next = self.clone();
        next.registry = Some(registry);
        next
    }

    // ==================== Finalization ====================

    fn writer(&self, dialect: &Dialect, mode: LiteralMode) -> SqlWriter<'_> {
        let writer = SqlWriter::new(*dialect, mode);
        match &self.registry {
            Some(registry) => writer.with_entities(registry.as_ref()),
            None => writer,
        }
    }

    /// The SELECT text with literals inlined.
    #[tracing::instrument(level = "trace", skip_all, fields(engine = %dialect.engine()))]
    pub fn to_sql(&self, dialect: &Dialect) -> Result<String> {
        compose_select(&self.spec, &mut self.writer(dialect, LiteralMode::Inline))
    }

    /// The SELECT text with placeholders, plus the bound values in order.
    #[tracing::instrument(level = "trace", skip_all, fields(engine = %dialect.engine()))]
    pub fn build(&self, dialect: &Dialect) -> Result<(String, Vec<Value>)> {
        let mut w = self.writer(dialect, LiteralMode::Bound);
        let sql = compose_select(&self.spec, &mut w)?;
        Ok((sql, w.into_params()))
    }

    /// How this query set would be deleted on `dialect`, literals inlined.
    pub fn delete_plan(&self, dialect: &Dialect) -> Result<DeletePlan> {
        self.plan_delete(dialect, LiteralMode::Inline)
    }

    /// The DELETE text with literals inlined.
    ///
    /// # Errors
    ///
    /// `Error::Custom` when the dialect needs the primary keys collected
    /// first; use [`delete_plan`](Self::delete_plan) or
    /// [`delete`](Self::delete) there.
    pub fn delete_sql(&self, dialect: &Dialect) -> Result<String> {
        match self.delete_plan(dialect)? {
            DeletePlan::Statement { sql, .. } => Ok(sql),
            DeletePlan::CollectKeys { .. } => Err(Error::Custom(format!(
                "{} cannot delete through a subquery on the same table; \
                 primary keys must be collected first",
                dialect.engine()
            ))),
        }
    }

    /// `SELECT "<source>"."<pk>" ...` with every other clause kept.
    fn primary_key_query(&self) -> QuerySpec {
        let mut spec = self.spec.clone();
        let pk = format!("{}.{}", spec.source_name(), spec.entity.primary_key);
        spec.select = Some(vec![SelectItem::from(pk)]);
        spec.extra.clear();
        spec
    }

    fn primary_key_in(&self, operand: Operand) -> Condition {
        Condition {
            column: self.spec.entity.primary_key.clone(),
            operator: Operator::In,
            operand,
        }
    }

    fn plan_delete(&self, dialect: &Dialect, mode: LiteralMode) -> Result<DeletePlan> {
        let table = self.spec.table();
        let mut w = self.writer(dialect, mode);

        if self.spec.is_plain_filter() {
            let sql = compose_delete(table, self.spec.conditions(), &mut w)?;
            tracing::debug!(table = table, strategy = "direct", "planned delete");
            return Ok(DeletePlan::Statement {
                sql,
                params: w.into_params(),
            });
        }

        let keys = self.primary_key_query();
        if dialect.allows_delete_subquery_on_target() {
            let condition = self.primary_key_in(Operand::Query(Box::new(keys)));
            let sql = compose_delete(table, [&condition], &mut w)?;
            tracing::debug!(table = table, strategy = "subquery", "planned delete");
            Ok(DeletePlan::Statement {
                sql,
                params: w.into_params(),
            })
        } else {
            let sql = compose_select(&keys, &mut w)?;
            tracing::debug!(table = table, strategy = "collect_keys", "planned delete");
            Ok(DeletePlan::CollectKeys {
                sql,
                params: w.into_params(),
            })
        }
    }

    /// `DELETE FROM <table> WHERE <pk> IN (<keys>)`.
    fn delete_keys(
        &self,
        dialect: &Dialect,
        mode: LiteralMode,
        keys: Vec<Value>,
    ) -> Result<(String, Vec<Value>)> {
        let mut w = self.writer(dialect, mode);
        let condition = self.primary_key_in(Operand::Value(Value::Array(keys)));
        let sql = compose_delete(self.spec.table(), [&condition], &mut w)?;
        Ok((sql, w.into_params()))
    }

    // ==================== Execution ====================

    /// Execute the query and return every row.
    #[tracing::instrument(level = "debug", skip_all, fields(table = %self.spec.table()))]
    pub async fn fetch<R: ConnectionRouter>(&self, cx: &Cx, router: &R) -> Outcome<Vec<Row>, Error> {
        let conn = match router.connection(self.database(), AccessIntent::Read) {
            Ok(conn) => conn,
            Err(e) => return Outcome::Err(e),
        };
        let dialect = resolve_dialect(conn.vendor());
        let (sql, params) = match self.build(&dialect) {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        tracing::trace!(sql = %sql, params = params.len(), "fetch");
        conn.query(cx, &sql, &params).await
    }

    /// Fetch the row at `index` within the current window.
    ///
    /// A missing row is an error.
    pub async fn get<R: ConnectionRouter>(
        &self,
        cx: &Cx,
        router: &R,
        index: i64,
    ) -> Outcome<Row, Error> {
        let window = match self.slice(index..index.saturating_add(1)) {
            Ok(window) => window,
            Err(e) => return Outcome::Err(e),
        };
        let rows = window.fetch(cx, router).await;
        rows.and_then(|rows| match rows.into_iter().next() {
            Some(row) => Outcome::Ok(row),
            None => Outcome::Err(Error::Custom(format!(
                "index {} out of range for {}",
                index,
                self.spec.table()
            ))),
        })
    }

    /// Number of rows, counted by fetching them.
    pub async fn count<R: ConnectionRouter>(&self, cx: &Cx, router: &R) -> Outcome<u64, Error> {
        self.fetch(cx, router).await.map(|rows| rows.len() as u64)
    }

    /// Number of rows, counted by the database:
    /// `SELECT COUNT(*) FROM (<query>) AS "moquery_count"`.
    #[tracing::instrument(level = "debug", skip_all, fields(table = %self.spec.table()))]
    pub async fn count_star<R: ConnectionRouter>(
        &self,
        cx: &Cx,
        router: &R,
    ) -> Outcome<u64, Error> {
        let conn = match router.connection(self.database(), AccessIntent::Read) {
            Ok(conn) => conn,
            Err(e) => return Outcome::Err(e),
        };
        let dialect = resolve_dialect(conn.vendor());
        let built = self.build(&dialect).and_then(|(inner, params)| {
            let alias = quote_identifier(&dialect, "moquery_count")?;
            Ok((format!("SELECT COUNT(*) FROM ({inner}) AS {alias}"), params))
        });
        let (sql, params) = match built {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        tracing::trace!(sql = %sql, "count");

        let rows = conn.query(cx, &sql, &params).await;
        rows.and_then(|rows| match rows.first() {
            Some(row) => match row.get_as::<i64>(0) {
                Ok(n) => Outcome::Ok(u64::try_from(n).unwrap_or(0)),
                Err(e) => Outcome::Err(e),
            },
            None => Outcome::Ok(0),
        })
    }

    /// Delete the selected rows and return how many were removed.
    ///
    /// Plain filters delete directly. Otherwise rows are matched by primary
    /// key through a subquery, or, where the engine refuses that, by a key
    /// list fetched first on the same connection.
    #[tracing::instrument(level = "debug", skip_all, fields(table = %self.spec.table()))]
    pub async fn delete<R: ConnectionRouter>(&self, cx: &Cx, router: &R) -> Outcome<u64, Error> {
        let conn = match router.connection(self.database(), AccessIntent::Write) {
            Ok(conn) => conn,
            Err(e) => return Outcome::Err(e),
        };
        let dialect = resolve_dialect(conn.vendor());

        let (sql, params) = match self.plan_delete(&dialect, LiteralMode::Bound) {
            Ok(DeletePlan::Statement { sql, params }) => (sql, params),
            Ok(DeletePlan::CollectKeys { sql, params }) => {
                let rows = match conn.query(cx, &sql, &params).await {
                    Outcome::Ok(rows) => rows,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                };
                let keys: Vec<Value> = rows
                    .into_iter()
                    .filter_map(|row| row.into_values().into_iter().next())
                    .collect();
                if keys.is_empty() {
                    tracing::debug!("no rows matched; nothing to delete");
                    return Outcome::Ok(0);
                }
                tracing::debug!(keys = keys.len(), "collected primary keys");
                match self.delete_keys(&dialect, LiteralMode::Bound, keys) {
                    Ok(built) => built,
                    Err(e) => return Outcome::Err(e),
                }
            }
            Err(e) => return Outcome::Err(e),
        };

        tracing::trace!(sql = %sql, params = params.len(), "delete");
        conn.execute(cx, &sql, &params).await
    }
}

fn index_bound(index: i64) -> Result<u64> {
    u64::try_from(index).map_err(|_| {
        Error::build(
            BuildErrorKind::UnsupportedIndex,
            format!("negative index {index} is not supported"),
        )
    })
}

impl From<QuerySet> for JoinTarget {
    fn from(qs: QuerySet) -> Self {
        JoinTarget::Query(Box::new(qs.spec))
    }
}

impl From<&QuerySet> for JoinTarget {
    fn from(qs: &QuerySet) -> Self {
        JoinTarget::Query(Box::new(qs.spec.clone()))
    }
}

impl From<QuerySet> for Operand {
    fn from(qs: QuerySet) -> Self {
        Operand::Query(Box::new(qs.spec))
    }
}

impl From<&QuerySet> for Operand {
    fn from(qs: &QuerySet) -> Self {
        Operand::Query(Box::new(qs.spec.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func;
    use asupersync::runtime::RuntimeBuilder;
    use moquery_core::{Databases, EntityRegistry, SqlType};
    use std::sync::Mutex;

    fn fruit() -> QuerySet {
        QuerySet::new(
            Entity::new("shop.FruitProduct", "fruit")
                .field("id", SqlType::Integer)
                .field("kind", SqlType::VarChar(20))
                .field("price", SqlType::Double),
        )
    }

    fn department() -> Entity {
        Entity::new("staff.Department", "staff_department")
            .field("id", SqlType::Integer)
            .field("name", SqlType::VarChar(50))
    }

    fn kind_of(err: &Error) -> Option<BuildErrorKind> {
        err.build_kind()
    }

    #[test]
    fn transitions_leave_receiver_unchanged() {
        let base = fruit();
        let before = base.to_sql(&Dialect::POSTGRESQL).unwrap();

        let _ = base.where_([("kind", "apple")]).unwrap();
        let _ = base.order_by(["-price"]).unwrap();
        let _ = base.as_alias("f");
        let _ = base.slice(1..3).unwrap();
        let _ = base.group_by(["kind"]);
        let _ = base.select_extra([("kind", "k")]);

        assert_eq!(base.to_sql(&Dialect::POSTGRESQL).unwrap(), before);
        assert_eq!(base.spec(), fruit().spec());
    }

    #[test]
    fn to_sql_is_idempotent() {
        let qs = fruit()
            .where_([("price >", 1)])
            .unwrap()
            .order_by(["kind"])
            .unwrap();
        for dialect in [Dialect::POSTGRESQL, Dialect::MYSQL, Dialect::SQLITE] {
            assert_eq!(qs.to_sql(&dialect).unwrap(), qs.to_sql(&dialect).unwrap());
        }
    }

    #[test]
    fn where_merges_and_overrides() {
        let qs = fruit()
            .where_([("kind", "apple")])
            .unwrap()
            .where_([("price <", 5)])
            .unwrap()
            .where_([("kind", "cherry")])
            .unwrap();
        assert_eq!(
            qs.to_sql(&Dialect::POSTGRESQL).unwrap(),
            "SELECT \"fruit\".* FROM \"fruit\" WHERE \"kind\" = 'cherry' AND \"price\" < 5"
        );
    }

    #[test]
    fn where_rejects_bad_operator_at_call() {
        let err = fruit().where_([("price =~", 1)]).unwrap_err();
        assert_eq!(kind_of(&err), Some(BuildErrorKind::InvalidCondition));
    }

    #[test]
    fn alias_last_write_wins() {
        let qs = fruit().as_alias("x").as_alias("f");
        assert_eq!(
            qs.to_sql(&Dialect::POSTGRESQL).unwrap(),
            "SELECT \"f\".* FROM \"fruit\" AS \"f\""
        );
    }

    #[test]
    fn order_by_is_additive_and_validated() {
        let qs = fruit()
            .order_by(["kind"])
            .unwrap()
            .order_by(["-price", "id DESC"])
            .unwrap();
        assert_eq!(
            qs.to_sql(&Dialect::SQLITE).unwrap(),
            "SELECT \"fruit\".* FROM \"fruit\" ORDER BY \"kind\" ASC, \"price\" DESC, \"id\" DESC"
        );

        let err = fruit().order_by(["price upward"]).unwrap_err();
        assert_eq!(kind_of(&err), Some(BuildErrorKind::InvalidOrderBy));
    }

    #[test]
    fn group_by_accepts_aggregates() {
        let qs = fruit()
            .select_only([SelectItem::from("kind"), (func::min("price"), "price").into()])
            .group_by([Expression::column("kind")]);
        assert_eq!(
            qs.to_sql(&Dialect::MYSQL).unwrap(),
            "SELECT `kind`, MIN(`price`) AS `price` FROM `fruit` GROUP BY `kind`"
        );
    }

    #[test]
    fn slicing_rules() {
        let qs = fruit().slice(1..).unwrap();
        assert_eq!(
            qs.to_sql(&Dialect::POSTGRESQL).unwrap(),
            "SELECT \"fruit\".* FROM \"fruit\" LIMIT ALL OFFSET 1"
        );

        let qs = fruit().slice(..5).unwrap();
        assert_eq!(
            qs.to_sql(&Dialect::POSTGRESQL).unwrap(),
            "SELECT \"fruit\".* FROM \"fruit\" LIMIT 5"
        );

        let err = fruit().slice(-1..).unwrap_err();
        assert_eq!(kind_of(&err), Some(BuildErrorKind::UnsupportedIndex));
        let err = fruit().slice(..-2).unwrap_err();
        assert_eq!(kind_of(&err), Some(BuildErrorKind::UnsupportedIndex));
    }

    #[test]
    fn repeated_large_slices_fail_instead_of_overflowing() {
        let base = fruit();
        let once = base.slice(i64::MAX..).unwrap();
        let twice = once.slice(i64::MAX..).unwrap();
        let err = twice.slice(i64::MAX..).unwrap_err();
        assert_eq!(kind_of(&err), Some(BuildErrorKind::UnsupportedIndex));
        // earlier query sets still render
        assert!(twice.to_sql(&Dialect::SQLITE).is_ok());
    }

    #[test]
    fn join_validation_and_rendering() {
        let err = fruit().join(JoinTarget::table(""), "d", &[], &[], None).unwrap_err();
        assert_eq!(kind_of(&err), Some(BuildErrorKind::InvalidJoinTarget));

        let qs = fruit()
            .as_alias("f")
            .join(
                JoinTarget::table("shop_supplier"),
                "s",
                &[("f.supplier_id", "s.id")],
                &[],
                Some(JoinType::Left),
            )
            .unwrap();
        assert_eq!(
            qs.to_sql(&Dialect::POSTGRESQL).unwrap(),
            "SELECT \"f\".* FROM \"fruit\" AS \"f\" \
             LEFT JOIN \"shop_supplier\" AS \"s\" ON \"f\".\"supplier_id\" = \"s\".\"id\""
        );
    }

    #[test]
    fn entity_join_resolves_at_composition() {
        let registry = EntityRegistry::shared();
        let employees = QuerySet::new(Entity::new("staff.Employee", "staff_employee"))
            .with_registry(registry.clone())
            .join(
                JoinTarget::entity("staff.Department"),
                "d",
                &[("department_id", "d.id")],
                &[],
                None,
            )
            .unwrap();

        let err = employees.to_sql(&Dialect::POSTGRESQL).unwrap_err();
        assert_eq!(kind_of(&err), Some(BuildErrorKind::InvalidJoinTarget));

        registry.register(department());
        assert_eq!(
            employees.to_sql(&Dialect::POSTGRESQL).unwrap(),
            "SELECT \"staff_employee\".* FROM \"staff_employee\" \
             JOIN \"staff_department\" AS \"d\" ON \"department_id\" = \"d\".\"id\""
        );
    }

    #[test]
    fn build_binds_parameters() {
        let qs = fruit()
            .where_([("kind", Operand::from("apple")), ("price <", Operand::from(2.5))])
            .unwrap();
        let (sql, params) = qs.build(&Dialect::POSTGRESQL).unwrap();
        assert_eq!(
            sql,
            "SELECT \"fruit\".* FROM \"fruit\" WHERE \"kind\" = $1 AND \"price\" < $2"
        );
        assert_eq!(params, vec![Value::Text("apple".into()), Value::Double(2.5)]);
    }

    #[test]
    fn delete_plans_per_dialect() {
        let plain = fruit().where_([("kind", "apple")]).unwrap();
        assert_eq!(
            plain.delete_sql(&Dialect::MYSQL).unwrap(),
            "DELETE FROM `fruit` WHERE `kind` = 'apple'"
        );

        let windowed = plain.order_by(["price"]).unwrap().slice(..2).unwrap();
        assert_eq!(
            windowed.delete_sql(&Dialect::POSTGRESQL).unwrap(),
            "DELETE FROM \"fruit\" WHERE \"id\" IN (SELECT \"fruit\".\"id\" FROM \"fruit\" \
             WHERE \"kind\" = 'apple' ORDER BY \"price\" ASC LIMIT 2)"
        );
        assert_eq!(
            windowed.delete_plan(&Dialect::MYSQL).unwrap(),
            DeletePlan::CollectKeys {
                sql: "SELECT `fruit`.`id` FROM `fruit` WHERE `kind` = 'apple' \
                      ORDER BY `price` ASC LIMIT 2"
                    .to_string(),
                params: Vec::new(),
            }
        );
        assert!(windowed.delete_sql(&Dialect::MYSQL).is_err());
    }

    #[test]
    fn aliased_delete_uses_subquery() {
        let qs = fruit().as_alias("f").where_([("f.kind", "apple")]).unwrap();
        assert_eq!(
            qs.delete_sql(&Dialect::SQLITE).unwrap(),
            "DELETE FROM \"fruit\" WHERE \"id\" IN (SELECT \"f\".\"id\" FROM \"fruit\" AS \"f\" \
             WHERE \"f\".\"kind\" = 'apple')"
        );
    }

    // ==================== Execution ====================

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    /// Records statements and answers queries with canned key rows.
    struct Recording {
        vendor: &'static str,
        keys: Vec<i64>,
        log: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl Recording {
        fn new(vendor: &'static str, keys: Vec<i64>) -> Self {
            Self {
                vendor,
                keys,
                log: Mutex::new(Vec::new()),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .map(|(sql, _)| sql.clone())
                .collect()
        }
    }

    impl Connection for Recording {
        fn vendor(&self) -> &str {
            self.vendor
        }

        fn query(
            &self,
            _cx: &Cx,
            sql: &str,
            params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            self.log
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            let rows = self
                .keys
                .iter()
                .map(|k| Row::new(vec!["id".to_string()], vec![Value::BigInt(*k)]))
                .collect();
            async move { Outcome::Ok(rows) }
        }

        fn execute(
            &self,
            _cx: &Cx,
            sql: &str,
            params: &[Value],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            self.log
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            let affected = self.keys.len() as u64;
            async move { Outcome::Ok(affected) }
        }
    }

    #[test]
    fn mysql_delete_collects_keys_first() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let dbs = Databases::single(Recording::new("mysql", vec![4, 9]));
            let qs = fruit()
                .where_([("kind", "apple")])
                .unwrap()
                .order_by(["-price"])
                .unwrap()
                .slice(..2)
                .unwrap();

            let deleted = unwrap_outcome(qs.delete(&cx, &dbs).await);
            assert_eq!(deleted, 2);

            let conn = dbs.connection(None, AccessIntent::Write).unwrap();
            assert_eq!(
                conn.statements(),
                vec![
                    "SELECT `fruit`.`id` FROM `fruit` WHERE `kind` = ? ORDER BY `price` DESC LIMIT 2"
                        .to_string(),
                    "DELETE FROM `fruit` WHERE `id` IN (?, ?)".to_string(),
                ]
            );
            assert_eq!(
                conn.log.lock().unwrap()[1].1,
                vec![Value::BigInt(4), Value::BigInt(9)]
            );
        });
    }

    #[test]
    fn mysql_delete_with_no_keys_skips_statement() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let dbs = Databases::single(Recording::new("mysql", Vec::new()));
            let qs = fruit().as_alias("f");

            let deleted = unwrap_outcome(qs.delete(&cx, &dbs).await);
            assert_eq!(deleted, 0);

            let conn = dbs.connection(None, AccessIntent::Write).unwrap();
            assert_eq!(conn.statements().len(), 1);
            assert!(conn.statements()[0].starts_with("SELECT"));
        });
    }

    #[test]
    fn fetch_uses_vendor_dialect_and_database_alias() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let dbs = Databases::single(Recording::new("postgresql", vec![1]))
                .with("legacy", Recording::new("mysql", vec![1]));
            let qs = fruit().where_([("kind", "apple")]).unwrap().using(Some("legacy"));

            let rows = unwrap_outcome(qs.fetch(&cx, &dbs).await);
            assert_eq!(rows.len(), 1);

            let legacy = dbs.connection(Some("legacy"), AccessIntent::Read).unwrap();
            assert_eq!(
                legacy.statements(),
                vec!["SELECT `fruit`.* FROM `fruit` WHERE `kind` = ?".to_string()]
            );
            let default = dbs.connection(None, AccessIntent::Read).unwrap();
            assert!(default.statements().is_empty());
        });
    }

    #[test]
    fn get_rejects_negative_index() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let dbs = Databases::single(Recording::new("sqlite", vec![1]));
            match fruit().get(&cx, &dbs, -1).await {
                Outcome::Err(e) => assert_eq!(kind_of(&e), Some(BuildErrorKind::UnsupportedIndex)),
                other => panic!("expected unsupported index, got {other:?}"),
            }
            let conn = dbs.connection(None, AccessIntent::Read).unwrap();
            assert!(conn.statements().is_empty());
        });
    }
}
