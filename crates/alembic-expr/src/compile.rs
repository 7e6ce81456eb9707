//! Expression compiler
//!
//! Walks a condition or update tree once, assigning one name placeholder
//! per distinct referenced path segment and one value placeholder per
//! distinct literal, both drawn from the request's shared `Namespace`, and
//! emits a `WireExpression` fragment.
//!
//! Deduplication is per-fragment: a key condition and a filter compiled for
//! the same request each get their own placeholders even when they
//! reference the same field, so the merged placeholder maps never collide.

use crate::{CmpOp, Condition, Namespace, Path, SetValue, UpdateAction, UpdateExpr};
use alembic_core::{AlembicError, AttrValue, Result, WireExpression};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Accumulates one fragment's placeholder maps against a shared namespace.
pub struct ExprWriter<'ns> {
    ns: &'ns mut Namespace,
    names: BTreeMap<String, String>,
    segment_tokens: HashMap<String, String>,
    values: BTreeMap<String, AttrValue>,
    value_tokens: Vec<(AttrValue, String)>,
}

impl<'ns> ExprWriter<'ns> {
    pub fn new(ns: &'ns mut Namespace) -> Self {
        Self {
            ns,
            names: BTreeMap::new(),
            segment_tokens: HashMap::new(),
            values: BTreeMap::new(),
            value_tokens: Vec::new(),
        }
    }

    /// Placeholder form of a path: each segment mapped to a name token,
    /// joined with `.`.
    pub fn path_token(&mut self, path: &Path) -> String {
        path.segments()
            .iter()
            .map(|seg| self.segment_token(seg))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn segment_token(&mut self, segment: &str) -> String {
        if let Some(token) = self.segment_tokens.get(segment) {
            return token.clone();
        }
        let token = self.ns.next_name();
        self.segment_tokens
            .insert(segment.to_string(), token.clone());
        self.names.insert(token.clone(), segment.to_string());
        token
    }

    /// Placeholder for a literal, reused for repeated identical literals
    /// within this fragment.
    pub fn value_token(&mut self, value: &AttrValue) -> String {
        if let Some((_, token)) = self.value_tokens.iter().find(|(v, _)| v == value) {
            return token.clone();
        }
        let token = self.ns.next_value();
        self.value_tokens.push((value.clone(), token.clone()));
        self.values.insert(token.clone(), value.clone());
        token
    }

    /// Finish the fragment with its expression string.
    pub fn finish(self, expression: String) -> WireExpression {
        WireExpression {
            expression,
            names: self.names,
            values: self.values,
        }
    }
}

/// Compile a condition tree into a wire fragment.
pub fn compile_condition(condition: &Condition, ns: &mut Namespace) -> WireExpression {
    let mut writer = ExprWriter::new(ns);
    let expression = condition_fragment(condition, &mut writer);
    writer.finish(expression)
}

fn condition_fragment(condition: &Condition, w: &mut ExprWriter<'_>) -> String {
    match condition {
        Condition::Compare { path, op, value } => {
            let p = w.path_token(path);
            let v = w.value_token(value);
            format!("{} {} {}", p, op.symbol(), v)
        }
        Condition::Between { path, low, high } => {
            let p = w.path_token(path);
            let lo = w.value_token(low);
            let hi = w.value_token(high);
            format!("{} BETWEEN {} AND {}", p, lo, hi)
        }
        Condition::And(a, b) => format!(
            "({}) AND ({})",
            condition_fragment(a, w),
            condition_fragment(b, w)
        ),
        Condition::Or(a, b) => format!(
            "({}) OR ({})",
            condition_fragment(a, w),
            condition_fragment(b, w)
        ),
        Condition::Not(inner) => format!("NOT ({})", condition_fragment(inner, w)),
        Condition::Exists(path) => format!("attribute_exists({})", w.path_token(path)),
        Condition::NotExists(path) => format!("attribute_not_exists({})", w.path_token(path)),
        Condition::BeginsWith { path, prefix } => {
            let p = w.path_token(path);
            let v = w.value_token(&AttrValue::S(prefix.clone()));
            format!("begins_with({}, {})", p, v)
        }
        Condition::Contains { path, value } => {
            let p = w.path_token(path);
            let v = w.value_token(value);
            format!("contains({}, {})", p, v)
        }
    }
}

/// Compile an update tree into a wire fragment, grouped by verb.
pub fn compile_update(update: &UpdateExpr, ns: &mut Namespace) -> Result<WireExpression> {
    if update.is_empty() {
        return Err(AlembicError::Expression(
            "update expression has no actions".into(),
        ));
    }

    let mut writer = ExprWriter::new(ns);
    let mut sets = Vec::new();
    let mut removes = Vec::new();
    let mut adds = Vec::new();
    let mut deletes = Vec::new();

    for action in update.actions() {
        match action {
            UpdateAction::Set(path, rhs) => {
                let p = writer.path_token(path);
                let rhs = set_fragment(rhs, &mut writer);
                sets.push(format!("{} = {}", p, rhs));
            }
            UpdateAction::Remove(path) => {
                removes.push(writer.path_token(path));
            }
            UpdateAction::Add(path, value) => {
                let p = writer.path_token(path);
                let v = writer.value_token(value);
                adds.push(format!("{} {}", p, v));
            }
            UpdateAction::Delete(path, value) => {
                let p = writer.path_token(path);
                let v = writer.value_token(value);
                deletes.push(format!("{} {}", p, v));
            }
        }
    }

    let mut sections = Vec::new();
    if !sets.is_empty() {
        sections.push(format!("SET {}", sets.join(", ")));
    }
    if !removes.is_empty() {
        sections.push(format!("REMOVE {}", removes.join(", ")));
    }
    if !adds.is_empty() {
        sections.push(format!("ADD {}", adds.join(", ")));
    }
    if !deletes.is_empty() {
        sections.push(format!("DELETE {}", deletes.join(", ")));
    }

    Ok(writer.finish(sections.join(" ")))
}

fn set_fragment(rhs: &SetValue, w: &mut ExprWriter<'_>) -> String {
    match rhs {
        SetValue::Value(v) => w.value_token(v),
        SetValue::IfNotExists(path, default) => {
            let p = w.path_token(path);
            let d = w.value_token(default);
            format!("if_not_exists({}, {})", p, d)
        }
        SetValue::Plus(path, v) => {
            let p = w.path_token(path);
            let t = w.value_token(v);
            format!("{} + {}", p, t)
        }
        SetValue::Minus(path, v) => {
            let p = w.path_token(path);
            let t = w.value_token(v);
            format!("{} - {}", p, t)
        }
    }
}

/// Compile the mandatory hash-equality clause of a key condition, ANDed
/// with an optional range clause, as one fragment.
pub fn compile_key_condition(
    hash_field: &str,
    hash_value: &AttrValue,
    range: Option<&Condition>,
    ns: &mut Namespace,
) -> WireExpression {
    let hash_clause = Condition::Compare {
        path: Path::field(hash_field),
        op: CmpOp::Eq,
        value: hash_value.clone(),
    };
    let condition = match range {
        Some(range_clause) => hash_clause.and(range_clause.clone()),
        None => hash_clause,
    };
    compile_condition(&condition, ns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_fragment() {
        let mut ns = Namespace::new();
        let cond = Condition::compare(Path::field("age"), CmpOp::Ge, 21);
        let wire = compile_condition(&cond, &mut ns);

        assert_eq!(wire.expression, "#n0 >= :v0");
        assert_eq!(wire.names.get("#n0").map(String::as_str), Some("age"));
        assert_eq!(wire.values.get(":v0"), Some(&AttrValue::N("21".into())));
    }

    #[test]
    fn test_combinators_parenthesize() {
        let mut ns = Namespace::new();
        let cond = Condition::compare(Path::field("a"), CmpOp::Eq, 1)
            .and(Condition::compare(Path::field("b"), CmpOp::Eq, 2))
            .or(Condition::compare(Path::field("c"), CmpOp::Eq, 3).not());
        let wire = compile_condition(&cond, &mut ns);

        assert_eq!(
            wire.expression,
            "((#n0 = :v0) AND (#n1 = :v1)) OR (NOT (#n2 = :v2))"
        );
    }

    #[test]
    fn test_path_dedupe_within_fragment() {
        let mut ns = Namespace::new();
        let cond = Condition::compare(Path::field("x"), CmpOp::Gt, 1)
            .and(Condition::compare(Path::field("x"), CmpOp::Lt, 9));
        let wire = compile_condition(&cond, &mut ns);

        // Same path, one placeholder; distinct literals, two placeholders.
        assert_eq!(wire.expression, "(#n0 > :v0) AND (#n0 < :v1)");
        assert_eq!(wire.names.len(), 1);
        assert_eq!(wire.values.len(), 2);
    }

    #[test]
    fn test_literal_dedupe_within_fragment() {
        let mut ns = Namespace::new();
        let cond = Condition::compare(Path::field("a"), CmpOp::Eq, 5)
            .or(Condition::compare(Path::field("b"), CmpOp::Eq, 5));
        let wire = compile_condition(&cond, &mut ns);

        assert_eq!(wire.expression, "(#n0 = :v0) OR (#n1 = :v0)");
        assert_eq!(wire.values.len(), 1);
    }

    #[test]
    fn test_no_dedupe_across_fragments() {
        // Key condition and filter referencing the same field must get
        // distinct placeholders when compiled against one namespace.
        let mut ns = Namespace::new();
        let key = compile_key_condition("k", &AttrValue::from("a"), None, &mut ns);
        let filter =
            compile_condition(&Condition::compare(Path::field("k"), CmpOp::Ne, "b"), &mut ns);

        assert_eq!(key.expression, "#n0 = :v0");
        assert_eq!(filter.expression, "#n1 <> :v1");

        let mut merged = key.clone();
        merged.absorb_placeholders(&filter).unwrap();
        assert_eq!(merged.names.len(), 2);
        assert_eq!(merged.values.len(), 2);
    }

    #[test]
    fn test_nested_path_segments() {
        let mut ns = Namespace::new();
        let cond = Condition::Exists(Path::field("meta").child("owner"));
        let wire = compile_condition(&cond, &mut ns);

        assert_eq!(wire.expression, "attribute_exists(#n0.#n1)");
        assert_eq!(wire.names.get("#n0").map(String::as_str), Some("meta"));
        assert_eq!(wire.names.get("#n1").map(String::as_str), Some("owner"));
    }

    #[test]
    fn test_between_fragment() {
        let mut ns = Namespace::new();
        let cond = Condition::Between {
            path: Path::field("seq"),
            low: AttrValue::from(10),
            high: AttrValue::from(20),
        };
        let wire = compile_condition(&cond, &mut ns);
        assert_eq!(wire.expression, "#n0 BETWEEN :v0 AND :v1");
    }

    #[test]
    fn test_update_sections_grouped_by_verb() {
        let mut ns = Namespace::new();
        let update = UpdateExpr::new()
            .set(Path::field("title"), "hi")
            .increment(Path::field("views"), 1)
            .remove(Path::field("draft"))
            .add(Path::field("score"), 10);
        let wire = compile_update(&update, &mut ns).unwrap();

        assert_eq!(
            wire.expression,
            "SET #n0 = :v0, #n1 = #n1 + :v1 REMOVE #n2 ADD #n3 :v2"
        );
    }

    #[test]
    fn test_update_if_not_exists() {
        let mut ns = Namespace::new();
        let update = UpdateExpr::new().set_if_not_exists(Path::field("views"), 0);
        let wire = compile_update(&update, &mut ns).unwrap();
        assert_eq!(wire.expression, "SET #n0 = if_not_exists(#n0, :v0)");
    }

    #[test]
    fn test_empty_update_rejected() {
        let mut ns = Namespace::new();
        assert!(compile_update(&UpdateExpr::new(), &mut ns).is_err());
    }

    #[test]
    fn test_key_condition_with_range_clause() {
        let mut ns = Namespace::new();
        let range = Condition::BeginsWith {
            path: Path::field("sk"),
            prefix: "2024-".into(),
        };
        let wire = compile_key_condition("pk", &AttrValue::from("p1"), Some(&range), &mut ns);
        assert_eq!(wire.expression, "(#n0 = :v0) AND (begins_with(#n1, :v1))");
    }
}
