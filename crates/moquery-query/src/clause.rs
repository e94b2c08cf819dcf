//! Clause building blocks: select items, conditions, ordering and joins.

use crate::compose::compose_select;
use crate::escape::SqlWriter;
use crate::func::Aggregate;
use crate::spec::QuerySpec;
use moquery_core::{BuildErrorKind, Entity, Error, Result, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

// ==================== Expressions ====================

/// A column reference, aggregate call or raw SQL fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Possibly dotted column name, quoted on output
    Column(String),
    /// Aggregate resolved against the dialect on output
    Aggregate(Aggregate),
    /// Emitted verbatim
    Raw(String),
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(name.into())
    }

    /// Raw SQL, emitted without quoting or validation.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expression::Raw(sql.into())
    }

    pub fn to_sql(&self, w: &SqlWriter<'_>) -> Result<String> {
        match self {
            Expression::Column(name) => w.ident(name),
            Expression::Aggregate(agg) => agg.resolve(w.dialect()),
            Expression::Raw(sql) => Ok(sql.clone()),
        }
    }
}

impl From<&str> for Expression {
    fn from(name: &str) -> Self {
        Expression::Column(name.to_string())
    }
}

impl From<String> for Expression {
    fn from(name: String) -> Self {
        Expression::Column(name)
    }
}

impl From<Aggregate> for Expression {
    fn from(agg: Aggregate) -> Self {
        Expression::Aggregate(agg)
    }
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Expr(Expression),
    /// `<expr> AS <alias>`
    Aliased(Expression, String),
}

impl SelectItem {
    /// `"<source>".*`
    pub fn star(source: &str) -> Self {
        SelectItem::Expr(Expression::Column(format!("{source}.*")))
    }

    pub fn aliased(expr: impl Into<Expression>, alias: impl Into<String>) -> Self {
        SelectItem::Aliased(expr.into(), alias.into())
    }

    pub fn to_sql(&self, w: &SqlWriter<'_>) -> Result<String> {
        match self {
            SelectItem::Expr(expr) => expr.to_sql(w),
            SelectItem::Aliased(expr, alias) => {
                Ok(format!("{} AS {}", expr.to_sql(w)?, w.ident(alias)?))
            }
        }
    }
}

impl From<&str> for SelectItem {
    fn from(name: &str) -> Self {
        SelectItem::Expr(name.into())
    }
}

impl From<String> for SelectItem {
    fn from(name: String) -> Self {
        SelectItem::Expr(name.into())
    }
}

impl From<Aggregate> for SelectItem {
    fn from(agg: Aggregate) -> Self {
        SelectItem::Expr(agg.into())
    }
}

impl From<Expression> for SelectItem {
    fn from(expr: Expression) -> Self {
        SelectItem::Expr(expr)
    }
}

/// `(source, alias)`
impl From<(&str, &str)> for SelectItem {
    fn from((source, alias): (&str, &str)) -> Self {
        SelectItem::aliased(source, alias)
    }
}

impl From<(Aggregate, &str)> for SelectItem {
    fn from((agg, alias): (Aggregate, &str)) -> Self {
        SelectItem::aliased(agg, alias)
    }
}

// ==================== Conditions ====================

/// Comparison operators accepted in condition keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    LtGt,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    ILike,
    In,
    NotIn,
    Is,
    IsNot,
}

impl Operator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::LtGt => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        let op = match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Operator::Eq,
            "!=" => Operator::NotEq,
            "<>" => Operator::LtGt,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "ILIKE" => Operator::ILike,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "IS" => Operator::Is,
            "IS NOT" => Operator::IsNot,
            _ => {
                return Err(Error::build(
                    BuildErrorKind::InvalidCondition,
                    format!("unsupported operator {s:?}"),
                ));
            }
        };
        Ok(op)
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A literal; arrays render as `IN (...)` lists.
    Value(Value),
    /// A nested query rendered in parentheses.
    Query(Box<QuerySpec>),
}

macro_rules! operand_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Operand::Value(Value::from(v))
                }
            }
        )*
    };
}

operand_from_value!(bool, i8, i16, i32, i64, u32, f32, f64, String, &str, Vec<Value>);

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Operand::Value(v.map_or(Value::Null, Into::into))
    }
}

impl From<QuerySpec> for Operand {
    fn from(spec: QuerySpec) -> Self {
        Operand::Query(Box::new(spec))
    }
}

static CONDITION_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)(?:\s+(.*?))?\s*$").expect("compile condition key regex")
});

/// One `WHERE` term: `<column> <operator> <operand>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub operand: Operand,
}

impl Condition {
    /// Parse a condition key such as `"price"`, `"price >="` or
    /// `"name NOT LIKE"`. A bare column means `=`.
    pub fn parse(key: &str, operand: Operand) -> Result<Self> {
        let caps = CONDITION_KEY.captures(key).ok_or_else(|| {
            Error::build(
                BuildErrorKind::InvalidCondition,
                format!("condition key {key:?} names no column"),
            )
        })?;
        let column = caps[1].to_string();
        let operator = match caps.get(2) {
            Some(op) if !op.as_str().is_empty() => op.as_str().parse()?,
            _ => Operator::Eq,
        };
        Ok(Self {
            column,
            operator,
            operand,
        })
    }

    pub fn to_sql(&self, w: &mut SqlWriter<'_>) -> Result<String> {
        let column = w.ident(&self.column)?;
        let op = self.operator;

        match &self.operand {
            Operand::Value(Value::Null) => match op {
                Operator::Eq | Operator::Is => Ok(format!("{column} IS NULL")),
                Operator::NotEq | Operator::LtGt | Operator::IsNot => {
                    Ok(format!("{column} IS NOT NULL"))
                }
                _ => Ok(format!("{column} {} NULL", op.as_str())),
            },
            Operand::Value(Value::Array(items)) => {
                let negated = match op {
                    Operator::Eq | Operator::In => false,
                    Operator::NotEq | Operator::LtGt | Operator::NotIn => true,
                    _ => {
                        return Err(Error::build(
                            BuildErrorKind::InvalidCondition,
                            format!(
                                "operator {} cannot take a list ({})",
                                op.as_str(),
                                self.column
                            ),
                        ));
                    }
                };
                if items.is_empty() {
                    // Empty IN lists are a syntax error on most engines.
                    return Ok(if negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let list = w.literal(&Value::Array(items.clone()))?;
                let keyword = if negated { "NOT IN" } else { "IN" };
                Ok(format!("{column} {keyword} {list}"))
            }
            Operand::Value(value) => {
                let literal = w.literal(value)?;
                match op {
                    Operator::In | Operator::NotIn => {
                        Ok(format!("{column} {} ({literal})", op.as_str()))
                    }
                    _ => Ok(format!("{column} {} {literal}", op.as_str())),
                }
            }
            Operand::Query(spec) => {
                let sub = compose_select(spec, w)?;
                Ok(format!("{column} {} ({sub})", op.as_str()))
            }
        }
    }
}

// ==================== Ordering ====================

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: String,
    direction: Direction,
}

impl OrderBy {
    /// Create an ascending order by term.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    /// Create a descending order by term.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }

    /// Parse `name`, `name ASC`, `name DESC` or `-name`.
    ///
    /// The direction keyword is case-sensitive, and the `-` shorthand only
    /// applies to a bare column.
    pub fn parse(token: &str) -> Result<Self> {
        let invalid = || {
            Error::build(
                BuildErrorKind::InvalidOrderBy,
                format!("cannot order by {token:?}"),
            )
        };

        let parts: Vec<&str> = token.split_whitespace().collect();
        let (column, direction) = match parts.as_slice() {
            [single] => match single.strip_prefix('-') {
                Some(rest) if rest.is_empty() || rest.starts_with('-') => return Err(invalid()),
                Some(rest) => (rest, Direction::Desc),
                None => (*single, Direction::Asc),
            },
            // "-name DESC" orders by a column literally named "-name"
            [column, "ASC"] => (*column, Direction::Asc),
            [column, "DESC"] => (*column, Direction::Desc),
            _ => return Err(invalid()),
        };
        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Generate SQL for this ORDER BY term.
    pub fn to_sql(&self, w: &SqlWriter<'_>) -> Result<String> {
        Ok(format!("{} {}", w.ident(&self.column)?, self.direction.as_str()))
    }
}

// ==================== Joins ====================

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Natural,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
            JoinType::Natural => "NATURAL JOIN",
        }
    }
}

impl FromStr for JoinType {
    type Err = Error;

    /// Accepts `INNER`, `LEFT [OUTER]`, `RIGHT [OUTER]`, `FULL [OUTER]`,
    /// `CROSS` and `NATURAL`, in any case.
    fn from_str(s: &str) -> Result<Self> {
        let words: Vec<String> = s
            .split_whitespace()
            .map(str::to_ascii_uppercase)
            .collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["INNER"] => Ok(JoinType::Inner),
            ["LEFT"] | ["LEFT", "OUTER"] => Ok(JoinType::Left),
            ["RIGHT"] | ["RIGHT", "OUTER"] => Ok(JoinType::Right),
            ["FULL"] | ["FULL", "OUTER"] => Ok(JoinType::Full),
            ["CROSS"] => Ok(JoinType::Cross),
            ["NATURAL"] => Ok(JoinType::Natural),
            _ => Err(Error::build(
                BuildErrorKind::InvalidJoinTarget,
                format!("unknown join type {s:?}"),
            )),
        }
    }
}

/// What a join attaches.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    /// A plain table name
    Table(String),
    /// A nested query, rendered in parentheses
    Query(Box<QuerySpec>),
    /// An entity name looked up when the query is composed
    Entity(String),
}

impl JoinTarget {
    pub fn table(name: impl Into<String>) -> Self {
        JoinTarget::Table(name.into())
    }

    /// Reference an entity by registry name, e.g. `"staff.Department"`.
    pub fn entity(name: impl Into<String>) -> Self {
        JoinTarget::Entity(name.into())
    }

    fn validate(&self) -> Result<()> {
        match self {
            JoinTarget::Table(name) | JoinTarget::Entity(name)
                if name.trim().is_empty() || name.contains('\0') =>
            {
                Err(Error::build(
                    BuildErrorKind::InvalidJoinTarget,
                    format!("join target {name:?} is not a usable name"),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn to_sql(&self, w: &mut SqlWriter<'_>) -> Result<String> {
        match self {
            JoinTarget::Table(name) => w.ident(name),
            JoinTarget::Query(spec) => Ok(format!("({})", compose_select(spec, w)?)),
            JoinTarget::Entity(name) => {
                let resolver = w.entities().ok_or_else(|| {
                    Error::build(
                        BuildErrorKind::InvalidJoinTarget,
                        format!("cannot resolve entity {name:?}: no entity registry attached"),
                    )
                })?;
                let entity = resolver.resolve_entity(name).ok_or_else(|| {
                    Error::build(
                        BuildErrorKind::InvalidJoinTarget,
                        format!("unknown entity {name:?}"),
                    )
                })?;
                w.ident(&entity.table)
            }
        }
    }
}

impl From<&Entity> for JoinTarget {
    fn from(entity: &Entity) -> Self {
        JoinTarget::Table(entity.table.clone())
    }
}

impl From<QuerySpec> for JoinTarget {
    fn from(spec: QuerySpec) -> Self {
        JoinTarget::Query(Box::new(spec))
    }
}

/// A JOIN clause.
///
/// ```
/// use moquery_query::clause::{Join, JoinTarget, JoinType};
///
/// let join = Join::new(JoinTarget::entity("staff.Department"), "d")
///     .on("department_id", "d.id")
///     .kind(JoinType::Left);
/// assert_eq!(join.alias(), "d");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    target: JoinTarget,
    alias: String,
    on: Vec<(String, String)>,
    using: Vec<String>,
    join_type: Option<JoinType>,
}

impl Join {
    pub fn new(target: impl Into<JoinTarget>, alias: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            alias: alias.into(),
            on: Vec::new(),
            using: Vec::new(),
            join_type: None,
        }
    }

    /// Add an `ON left = right` pair. Both sides are identifiers.
    pub fn on(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.on.push((left.into(), right.into()));
        self
    }

    /// Add `USING` columns.
    pub fn using<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.using.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn kind(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn target(&self) -> &JoinTarget {
        &self.target
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn join_type(&self) -> Option<JoinType> {
        self.join_type
    }

    /// Check names that can be rejected before composition.
    pub(crate) fn validate(&self) -> Result<()> {
        self.target.validate()?;
        if self.alias.trim().is_empty() || self.alias.contains('\0') {
            return Err(Error::build(
                BuildErrorKind::InvalidJoinTarget,
                format!("join alias {:?} is not a usable name", self.alias),
            ));
        }
        Ok(())
    }

    /// Generate SQL for this join (with leading space).
    pub fn to_sql(&self, w: &mut SqlWriter<'_>) -> Result<String> {
        // Without a type or a condition, a bare JOIN is a syntax error on
        // PostgreSQL; join on same-named columns instead.
        let keyword = match self.join_type {
            Some(join_type) => join_type.as_str(),
            None if self.on.is_empty() && self.using.is_empty() => JoinType::Natural.as_str(),
            None => "JOIN",
        };

        let target = self.target.to_sql(w)?;
        let mut sql = format!(" {keyword} {target} AS {}", w.ident(&self.alias)?);

        if !self.on.is_empty() {
            if !self.using.is_empty() {
                tracing::warn!(
                    alias = %self.alias,
                    using = ?self.using,
                    "join has both ON and USING; USING is ignored"
                );
            }
            let pairs = self
                .on
                .iter()
                .map(|(left, right)| Ok(format!("{} = {}", w.ident(left)?, w.ident(right)?)))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ON ");
            sql.push_str(&pairs.join(" AND "));
        } else if !self.using.is_empty() {
            let columns = self
                .using
                .iter()
                .map(|c| w.ident(c))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" USING (");
            sql.push_str(&columns.join(", "));
            sql.push(')');
        }

        Ok(sql)
    }
}
