//! Identifier quoting, literal formatting and the SQL text accumulator.

use crate::dialect::Dialect;
use moquery_core::{BuildErrorKind, EntityResolver, Error, Result, Value};
use std::fmt::Write as _;

/// Quote an identifier for `dialect`.
///
/// Dotted names are quoted per segment (`t.col` -> `"t"."col"`), a `*`
/// segment stays bare, and embedded quote characters are doubled.
pub fn quote_identifier(dialect: &Dialect, name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::build(
            BuildErrorKind::InvalidIdentifier,
            "identifier must not be empty",
        ));
    }
    if name.contains('\0') {
        return Err(Error::build(
            BuildErrorKind::InvalidIdentifier,
            format!("identifier {name:?} contains a NUL byte"),
        ));
    }

    let quote = dialect.quote_char();
    let mut out = String::with_capacity(name.len() + 2);
    for (i, segment) in name.split('.').enumerate() {
        if segment.is_empty() {
            return Err(Error::build(
                BuildErrorKind::InvalidIdentifier,
                format!("identifier {name:?} has an empty segment"),
            ));
        }
        if i > 0 {
            out.push('.');
        }
        if segment == "*" {
            out.push('*');
            continue;
        }
        out.push(quote);
        for ch in segment.chars() {
            if ch == quote {
                out.push(quote);
            }
            out.push(ch);
        }
        out.push(quote);
    }
    Ok(out)
}

/// Render `value` as an inline SQL literal.
pub fn format_literal(dialect: &Dialect, value: &Value) -> Result<String> {
    let sql = match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Float(v) => {
            if !v.is_finite() {
                return Err(non_finite(f64::from(*v)));
            }
            v.to_string()
        }
        Value::Double(v) => {
            if !v.is_finite() {
                return Err(non_finite(*v));
            }
            v.to_string()
        }
        Value::Decimal(s) => {
            if !is_decimal_text(s) {
                return Err(Error::build(
                    BuildErrorKind::InvalidLiteral,
                    format!("{s:?} is not a decimal number"),
                ));
            }
            s.clone()
        }
        Value::Text(s) => format!("'{}'", dialect.escape_string(s)),
        Value::Bytes(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 3);
            hex.push_str("X'");
            for b in bytes {
                let _ = write!(hex, "{b:02X}");
            }
            hex.push('\'');
            hex
        }
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| format_literal(dialect, item))
                .collect::<Result<Vec<_>>>()?;
            format!("({})", parts.join(", "))
        }
    };
    Ok(sql)
}

fn non_finite(v: f64) -> Error {
    Error::build(
        BuildErrorKind::InvalidLiteral,
        format!("{v} cannot be written as a SQL literal"),
    )
}

fn is_decimal_text(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

/// How literal values end up in the composed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralMode {
    /// Formatted into the SQL text.
    Inline,
    /// Replaced by placeholders and collected as parameters.
    Bound,
}

/// State shared by one composition pass.
///
/// Carries the dialect, the literal mode, the bound parameters collected so
/// far and the resolver for deferred entity references. Nested queries are
/// composed with the same writer so placeholder numbering stays sequential.
pub struct SqlWriter<'a> {
    dialect: Dialect,
    mode: LiteralMode,
    params: Vec<Value>,
    entities: Option<&'a dyn EntityResolver>,
}

impl<'a> SqlWriter<'a> {
    pub fn new(dialect: Dialect, mode: LiteralMode) -> Self {
        Self {
            dialect,
            mode,
            params: Vec::new(),
            entities: None,
        }
    }

    /// Writer that formats literals inline.
    pub fn inline(dialect: Dialect) -> Self {
        Self::new(dialect, LiteralMode::Inline)
    }

    /// Writer that binds literals as parameters.
    pub fn bound(dialect: Dialect) -> Self {
        Self::new(dialect, LiteralMode::Bound)
    }

    /// Attach the resolver used for deferred join targets.
    pub fn with_entities<'b>(self, entities: &'b dyn EntityResolver) -> SqlWriter<'b> {
        SqlWriter {
            dialect: self.dialect,
            mode: self.mode,
            params: self.params,
            entities: Some(entities),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn mode(&self) -> LiteralMode {
        self.mode
    }

    pub fn entities(&self) -> Option<&'a dyn EntityResolver> {
        self.entities
    }

    /// Quote an identifier with the writer's dialect.
    pub fn ident(&self, name: &str) -> Result<String> {
        quote_identifier(&self.dialect, name)
    }

    /// Render a literal, binding it when in [`LiteralMode::Bound`].
    ///
    /// Arrays become a parenthesised list with one placeholder per element.
    pub fn literal(&mut self, value: &Value) -> Result<String> {
        match (self.mode, value) {
            (LiteralMode::Inline, _) => format_literal(&self.dialect, value),
            (LiteralMode::Bound, Value::Array(items)) => {
                let parts = items
                    .iter()
                    .map(|item| self.literal(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(", ")))
            }
            (LiteralMode::Bound, _) => {
                self.params.push(value.clone());
                Ok(self.dialect.placeholder(self.params.len()))
            }
        }
    }

    /// Parameters bound so far.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_and_dotted_identifiers() {
        let pg = Dialect::POSTGRESQL;
        assert_eq!(quote_identifier(&pg, "kind").unwrap(), "\"kind\"");
        assert_eq!(quote_identifier(&pg, "f.kind").unwrap(), "\"f\".\"kind\"");
        assert_eq!(quote_identifier(&pg, "f.*").unwrap(), "\"f\".*");
        assert_eq!(
            quote_identifier(&Dialect::MYSQL, "f.kind").unwrap(),
            "`f`.`kind`"
        );
    }

    #[test]
    fn doubles_embedded_quote_characters() {
        assert_eq!(
            quote_identifier(&Dialect::POSTGRESQL, "we\"ird").unwrap(),
            "\"we\"\"ird\""
        );
        assert_eq!(
            quote_identifier(&Dialect::MYSQL, "back`tick").unwrap(),
            "`back``tick`"
        );
        // The other engine's quote is not special.
        assert_eq!(
            quote_identifier(&Dialect::MYSQL, "we\"ird").unwrap(),
            "`we\"ird`"
        );
    }

    #[test]
    fn rejects_bad_identifiers() {
        for bad in ["", "a..b", ".a", "a.", "nul\0byte"] {
            let err = quote_identifier(&Dialect::POSTGRESQL, bad).unwrap_err();
            assert_eq!(err.build_kind(), Some(BuildErrorKind::InvalidIdentifier));
        }
    }

    #[test]
    fn literal_scalars() {
        let pg = Dialect::POSTGRESQL;
        assert_eq!(format_literal(&pg, &Value::Null).unwrap(), "NULL");
        assert_eq!(format_literal(&pg, &Value::Bool(true)).unwrap(), "TRUE");
        assert_eq!(format_literal(&pg, &Value::Int(-7)).unwrap(), "-7");
        assert_eq!(format_literal(&pg, &Value::Double(0.24)).unwrap(), "0.24");
        assert_eq!(format_literal(&pg, &Value::Double(2.0)).unwrap(), "2");
        assert_eq!(
            format_literal(&pg, &Value::Decimal("9.99".into())).unwrap(),
            "9.99"
        );
        assert_eq!(
            format_literal(&pg, &Value::Bytes(vec![0xde, 0xad, 0x01])).unwrap(),
            "X'DEAD01'"
        );
    }

    #[test]
    fn literal_strings_follow_dialect() {
        let text = Value::Text("it's".into());
        assert_eq!(
            format_literal(&Dialect::POSTGRESQL, &text).unwrap(),
            "'it''s'"
        );
        assert_eq!(format_literal(&Dialect::MYSQL, &text).unwrap(), "'it\\'s'");
    }

    #[test]
    fn literal_arrays() {
        let list = Value::Array(vec![Value::Int(1), Value::Text("a".into())]);
        assert_eq!(
            format_literal(&Dialect::SQLITE, &list).unwrap(),
            "(1, 'a')"
        );
    }

    #[test]
    fn rejects_bad_literals() {
        let nan = format_literal(&Dialect::POSTGRESQL, &Value::Double(f64::NAN)).unwrap_err();
        assert_eq!(nan.build_kind(), Some(BuildErrorKind::InvalidLiteral));

        let inf = format_literal(&Dialect::POSTGRESQL, &Value::Float(f32::INFINITY)).unwrap_err();
        assert_eq!(inf.build_kind(), Some(BuildErrorKind::InvalidLiteral));

        let injected =
            format_literal(&Dialect::POSTGRESQL, &Value::Decimal("1; DROP".into())).unwrap_err();
        assert_eq!(injected.build_kind(), Some(BuildErrorKind::InvalidLiteral));
    }

    #[test]
    fn bound_writer_numbers_placeholders() {
        let mut w = SqlWriter::bound(Dialect::POSTGRESQL);
        assert_eq!(w.literal(&Value::Int(1)).unwrap(), "$1");
        let list = Value::Array(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(w.literal(&list).unwrap(), "($2, $3)");
        assert_eq!(
            w.into_params(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn inline_writer_collects_nothing() {
        let mut w = SqlWriter::inline(Dialect::SQLITE);
        assert_eq!(w.literal(&Value::Text("x".into())).unwrap(), "'x'");
        assert!(w.params().is_empty());
    }
}
