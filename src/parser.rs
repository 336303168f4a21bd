//! Parse type-name expressions (`int64[]`, `uint8[4]`, `string{int32}`) using PEST.

use pest::Parser;
use pest_derive::Parser as PestParser;
use std::fmt;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct TypeExprParser;

/// Structure of a referenced type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// Intrinsic or declared type, possibly namespaced (`a/b/c`).
    Named(String),
    Vector(Box<TypeExpr>),
    Array(Box<TypeExpr>, usize),
    Map { key: Box<TypeExpr>, value: Box<TypeExpr> },
}

impl TypeExpr {
    /// Canonical type name for this expression. Parsing the result yields `self` again.
    pub fn canonical_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named(name) => f.write_str(name),
            TypeExpr::Vector(elem) => write!(f, "{}[]", elem),
            TypeExpr::Array(elem, n) => write!(f, "{}[{}]", elem, n),
            TypeExpr::Map { key, value } => write!(f, "{}{{{}}}", value, key),
        }
    }
}

/// Parse a type-name expression.
pub fn parse_type_expr(source: &str) -> Result<TypeExpr, String> {
    let pairs = TypeExprParser::parse(Rule::type_expr, source)
        .map_err(|e| format!("Invalid type expression {:?}: {}", source, e))?;
    let expr = pairs.into_iter().next().ok_or("Empty parse")?;
    let type_ref = expr
        .into_inner()
        .find(|p| p.as_rule() == Rule::type_ref)
        .ok_or("type_expr: missing type")?;
    build_ref(type_ref)
}

fn build_ref(pair: pest::iterators::Pair<Rule>) -> Result<TypeExpr, String> {
    let mut inner = pair.into_inner();
    let path = inner.next().ok_or("type: missing name")?;
    let mut expr = TypeExpr::Named(path.as_str().to_string());
    for suffix in inner {
        expr = match suffix.as_rule() {
            Rule::vector_suffix => TypeExpr::Vector(Box::new(expr)),
            Rule::array_suffix => {
                let len = suffix.into_inner().next().ok_or("array: missing length")?;
                let n: usize = len
                    .as_str()
                    .parse()
                    .map_err(|e| format!("array length {:?}: {}", len.as_str(), e))?;
                TypeExpr::Array(Box::new(expr), n)
            }
            Rule::map_suffix => {
                let key = suffix.into_inner().next().ok_or("map: missing key type")?;
                TypeExpr::Map {
                    key: Box::new(build_ref(key)?),
                    value: Box::new(expr),
                }
            }
            other => return Err(format!("Unhandled type suffix rule: {:?}", other)),
        };
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_namespaced_names() {
        assert_eq!(parse_type_expr("uint8").unwrap(), TypeExpr::Named("uint8".into()));
        assert_eq!(
            parse_type_expr("messgen/test/simple_struct").unwrap(),
            TypeExpr::Named("messgen/test/simple_struct".into())
        );
    }

    #[test]
    fn suffixes_apply_left_to_right() {
        let e = parse_type_expr("int32[4][]").unwrap();
        assert_eq!(
            e,
            TypeExpr::Vector(Box::new(TypeExpr::Array(Box::new(TypeExpr::Named("int32".into())), 4)))
        );
        assert_eq!(e.canonical_name(), "int32[4][]");
    }

    #[test]
    fn map_value_first_key_in_braces() {
        let e = parse_type_expr("string{int32}").unwrap();
        assert_eq!(
            e,
            TypeExpr::Map {
                key: Box::new(TypeExpr::Named("int32".into())),
                value: Box::new(TypeExpr::Named("string".into())),
            }
        );
        let nested = parse_type_expr("int8[]{uint8[2]}[]").unwrap();
        assert_eq!(nested.canonical_name(), "int8[]{uint8[2]}[]");
    }

    #[test]
    fn reject_malformed_expressions() {
        for bad in ["", "[]", "int8[", "int8[x]", "1abc", "a//b", "int8{}", "int8 []", "a{b{c}}"] {
            assert!(parse_type_expr(bad).is_err(), "{:?} should not parse", bad);
        }
    }
}
