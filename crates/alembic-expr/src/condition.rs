//! Condition expression tree
//!
//! Conditions are immutable once built and are compiled exactly once per
//! request. Combinators always parenthesize their operands, so precedence
//! survives regardless of operand complexity.

use crate::Path;
use alembic_core::AttrValue;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Wire symbol for this operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A predicate over a record, built through the typed field DSL.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `path <op> value`
    Compare {
        path: Path,
        op: CmpOp,
        value: AttrValue,
    },
    /// `path BETWEEN low AND high` (inclusive)
    Between {
        path: Path,
        low: AttrValue,
        high: AttrValue,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    /// `attribute_exists(path)`
    Exists(Path),
    /// `attribute_not_exists(path)`
    NotExists(Path),
    /// `begins_with(path, prefix)`
    BeginsWith { path: Path, prefix: String },
    /// `contains(path, value)` — substring for strings, membership for
    /// lists and sets
    Contains { path: Path, value: AttrValue },
}

impl Condition {
    pub fn compare(path: impl Into<Path>, op: CmpOp, value: impl Into<AttrValue>) -> Self {
        Condition::Compare {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinators_build_trees() {
        let a = Condition::compare(Path::field("x"), CmpOp::Eq, 1);
        let b = Condition::compare(Path::field("y"), CmpOp::Gt, 2);
        let c = a.clone().and(b.clone()).or(a.clone().not());

        match c {
            Condition::Or(left, right) => {
                assert!(matches!(*left, Condition::And(_, _)));
                assert!(matches!(*right, Condition::Not(_)));
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }
}
