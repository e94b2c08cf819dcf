//! SELECT and DELETE composition.
//!
//! Clause order is fixed: select list, FROM, joins, WHERE, GROUP BY,
//! ORDER BY, LIMIT, OFFSET.

use crate::clause::{Condition, SelectItem};
use crate::escape::SqlWriter;
use crate::func;
use crate::spec::QuerySpec;
use moquery_core::Result;

/// Compose the SELECT described by `spec`.
#[tracing::instrument(level = "trace", skip_all, fields(table = %spec.table()))]
pub fn compose_select(spec: &QuerySpec, w: &mut SqlWriter<'_>) -> Result<String> {
    let mut columns = match &spec.select {
        Some(items) => items
            .iter()
            .map(|item| item.to_sql(w))
            .collect::<Result<Vec<_>>>()?,
        None => default_select_list(spec, w)?,
    };
    for item in &spec.extra {
        columns.push(item.to_sql(w)?);
    }

    let mut sql = String::from("SELECT ");
    sql.push_str(&columns.join(", "));

    // FROM
    sql.push_str(" FROM ");
    sql.push_str(&w.ident(spec.table())?);
    if let Some(alias) = spec.alias() {
        sql.push_str(" AS ");
        sql.push_str(&w.ident(alias)?);
    }

    // JOINs
    for join in spec.joins() {
        sql.push_str(&join.to_sql(w)?);
    }

    // WHERE
    if let Some(where_sql) = compose_where(spec.conditions(), w)? {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }

    // GROUP BY
    if !spec.group_by().is_empty() {
        let terms = spec
            .group_by()
            .iter()
            .map(|expr| expr.to_sql(w))
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(" GROUP BY ");
        sql.push_str(&terms.join(", "));
    }

    // ORDER BY
    if !spec.order_by().is_empty() {
        let terms = spec
            .order_by()
            .iter()
            .map(|o| o.to_sql(w))
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    // LIMIT
    match (spec.limit(), spec.offset()) {
        (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
        (None, Some(_)) => sql.push_str(&format!(" LIMIT {}", w.dialect().no_limit())),
        (None, None) => {}
    }

    // OFFSET
    if let Some(offset) = spec.offset() {
        sql.push_str(&format!(" OFFSET {}", offset));
    }

    Ok(sql)
}

/// Compose `DELETE FROM <table>[ WHERE ...]`.
pub fn compose_delete<'c>(
    table: &str,
    conditions: impl IntoIterator<Item = &'c Condition>,
    w: &mut SqlWriter<'_>,
) -> Result<String> {
    let mut sql = format!("DELETE FROM {}", w.ident(table)?);
    if let Some(where_sql) = compose_where(conditions, w)? {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    Ok(sql)
}

fn compose_where<'c>(
    conditions: impl IntoIterator<Item = &'c Condition>,
    w: &mut SqlWriter<'_>,
) -> Result<Option<String>> {
    let terms = conditions
        .into_iter()
        .map(|c| c.to_sql(w))
        .collect::<Result<Vec<_>>>()?;
    if terms.is_empty() {
        Ok(None)
    } else {
        Ok(Some(terms.join(" AND ")))
    }
}

/// `"<source>".*`, or one `MIN(col) AS col` per field for grouped queries on
/// engines that evaluate them per group.
fn default_select_list(spec: &QuerySpec, w: &SqlWriter<'_>) -> Result<Vec<String>> {
    let source = spec.source_name();

    if !spec.group_by().is_empty() && !spec.entity().fields.is_empty() {
        if w.dialect().supports_grouped_aggregate_columns() {
            return spec
                .entity()
                .columns()
                .map(|col| {
                    SelectItem::aliased(func::min(format!("{source}.{col}")), col).to_sql(w)
                })
                .collect();
        }
        tracing::debug!(
            engine = %w.dialect().engine(),
            table = spec.table(),
            "grouped aggregate columns unsupported; selecting all columns"
        );
    }

    Ok(vec![SelectItem::star(source).to_sql(w)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::{Expression, Join, JoinTarget, Operand, OrderBy};
    use crate::dialect::Dialect;
    use moquery_core::{Entity, SqlType, Value};

    fn fruit() -> QuerySpec {
        QuerySpec::new(
            Entity::new("shop.FruitProduct", "fruit")
                .field("id", SqlType::Integer)
                .field("kind", SqlType::VarChar(20))
                .field("price", SqlType::Double),
        )
    }

    fn inline(spec: &QuerySpec, dialect: Dialect) -> String {
        compose_select(spec, &mut SqlWriter::inline(dialect)).unwrap()
    }

    fn add_condition(spec: &mut QuerySpec, key: &str, operand: Operand) {
        spec.conditions
            .insert(key.to_string(), Condition::parse(key, operand).unwrap());
    }

    #[test]
    fn plain_select() {
        assert_eq!(
            inline(&fruit(), Dialect::POSTGRESQL),
            "SELECT \"fruit\".* FROM \"fruit\""
        );
    }

    #[test]
    fn aliased_select_per_dialect() {
        let mut spec = fruit();
        spec.alias = Some("f".into());
        assert_eq!(
            inline(&spec, Dialect::POSTGRESQL),
            "SELECT \"f\".* FROM \"fruit\" AS \"f\""
        );
        assert_eq!(
            inline(&spec, Dialect::MYSQL),
            "SELECT `f`.* FROM `fruit` AS `f`"
        );
    }

    #[test]
    fn grouped_select_uses_min_per_field() {
        let mut spec = fruit();
        spec.group_by.push(Expression::column("kind"));
        assert_eq!(
            inline(&spec, Dialect::POSTGRESQL),
            "SELECT MIN(\"fruit\".\"id\") AS \"id\", MIN(\"fruit\".\"kind\") AS \"kind\", \
             MIN(\"fruit\".\"price\") AS \"price\" FROM \"fruit\" GROUP BY \"kind\""
        );
    }

    #[test]
    fn grouped_select_falls_back_to_star_on_sqlite() {
        let mut spec = fruit();
        spec.group_by.push(Expression::column("kind"));
        assert_eq!(
            inline(&spec, Dialect::SQLITE),
            "SELECT \"fruit\".* FROM \"fruit\" GROUP BY \"kind\""
        );
    }

    #[test]
    fn extras_follow_default_list() {
        let mut spec = fruit();
        spec.extra.push(SelectItem::from((func::count("*"), "n")));
        assert_eq!(
            inline(&spec, Dialect::POSTGRESQL),
            "SELECT \"fruit\".*, COUNT(*) AS \"n\" FROM \"fruit\""
        );
    }

    #[test]
    fn full_clause_order() {
        let mut spec = fruit();
        spec.alias = Some("f".into());
        spec.joins.push(
            Join::new(JoinTarget::table("shop_supplier"), "s").on("f.supplier_id", "s.id"),
        );
        add_condition(&mut spec, "f.price >", 1.into());
        add_condition(&mut spec, "s.name", "Acme".into());
        spec.order_by.push(OrderBy::desc("f.price"));
        spec.limit = Some(10);
        spec.offset = Some(20);

        assert_eq!(
            inline(&spec, Dialect::POSTGRESQL),
            "SELECT \"f\".* FROM \"fruit\" AS \"f\" \
             JOIN \"shop_supplier\" AS \"s\" ON \"f\".\"supplier_id\" = \"s\".\"id\" \
             WHERE \"f\".\"price\" > 1 AND \"s\".\"name\" = 'Acme' \
             ORDER BY \"f\".\"price\" DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn offset_without_limit_uses_sentinel() {
        let mut spec = fruit();
        spec.offset = Some(3);
        assert_eq!(
            inline(&spec, Dialect::POSTGRESQL),
            "SELECT \"fruit\".* FROM \"fruit\" LIMIT ALL OFFSET 3"
        );
        assert_eq!(
            inline(&spec, Dialect::MYSQL),
            "SELECT `fruit`.* FROM `fruit` LIMIT 18446744073709551615 OFFSET 3"
        );
        assert_eq!(
            inline(&spec, Dialect::SQLITE),
            "SELECT \"fruit\".* FROM \"fruit\" LIMIT -1 OFFSET 3"
        );
    }

    #[test]
    fn subquery_join_and_condition() {
        let mut cheap = fruit();
        cheap.select = Some(vec![SelectItem::from("kind")]);
        add_condition(&mut cheap, "price <", Operand::Value(Value::Double(1.5)));

        let mut spec = fruit();
        spec.joins.push(
            Join::new(JoinTarget::from(cheap.clone()), "c").using(["kind"]),
        );
        add_condition(&mut spec, "kind IN", cheap.into());

        let mut w = SqlWriter::bound(Dialect::POSTGRESQL);
        let sql = compose_select(&spec, &mut w).unwrap();
        assert_eq!(
            sql,
            "SELECT \"fruit\".* FROM \"fruit\" \
             JOIN (SELECT \"kind\" FROM \"fruit\" WHERE \"price\" < $1) AS \"c\" USING (\"kind\") \
             WHERE \"kind\" IN (SELECT \"kind\" FROM \"fruit\" WHERE \"price\" < $2)"
        );
        assert_eq!(
            w.into_params(),
            vec![Value::Double(1.5), Value::Double(1.5)]
        );
    }

    #[test]
    fn delete_statements() {
        let mut spec = fruit();
        add_condition(&mut spec, "kind", "apple".into());

        let mut w = SqlWriter::inline(Dialect::MYSQL);
        assert_eq!(
            compose_delete(spec.table(), spec.conditions(), &mut w).unwrap(),
            "DELETE FROM `fruit` WHERE `kind` = 'apple'"
        );

        let mut w = SqlWriter::inline(Dialect::SQLITE);
        assert_eq!(
            compose_delete("fruit", std::iter::empty(), &mut w).unwrap(),
            "DELETE FROM \"fruit\""
        );
    }

    #[test]
    fn invalid_identifier_surfaces() {
        let mut spec = fruit();
        spec.group_by.push(Expression::column("a..b"));
        let err = compose_select(&spec, &mut SqlWriter::inline(Dialect::POSTGRESQL)).unwrap_err();
        assert_eq!(
            err.build_kind(),
            Some(moquery_core::BuildErrorKind::InvalidIdentifier)
        );
    }
}
