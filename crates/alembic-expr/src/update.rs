//! Update expression tree
//!
//! An `UpdateExpr` accumulates mutation actions through a builder and
//! compiles into one update fragment grouped by verb (`SET`, `REMOVE`,
//! `ADD`, `DELETE`).
//!
//! # Example
//!
//! ```
//! use alembic_expr::{Namespace, Path, UpdateExpr, compile_update};
//! use alembic_core::AttrValue;
//!
//! let update = UpdateExpr::new()
//!     .set(Path::field("title"), "hello")
//!     .increment(Path::field("views"), 1)
//!     .remove(Path::field("draft"));
//!
//! let mut ns = Namespace::new();
//! let wire = compile_update(&update, &mut ns).unwrap();
//! assert!(wire.expression.starts_with("SET "));
//! ```

use crate::Path;
use alembic_core::AttrValue;

/// Right-hand side of a `SET` action.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    /// Plain value assignment.
    Value(AttrValue),
    /// `if_not_exists(path, default)`
    IfNotExists(Path, AttrValue),
    /// `path + value`
    Plus(Path, AttrValue),
    /// `path - value`
    Minus(Path, AttrValue),
}

/// One mutation action.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set(Path, SetValue),
    Remove(Path),
    /// Numeric addition, or set union for set-typed attributes.
    Add(Path, AttrValue),
    /// Set-element removal.
    Delete(Path, AttrValue),
}

/// An ordered collection of mutation actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpr {
    actions: Vec<UpdateAction>,
}

impl UpdateExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SET path = value`
    pub fn set(mut self, path: Path, value: impl Into<AttrValue>) -> Self {
        self.actions
            .push(UpdateAction::Set(path, SetValue::Value(value.into())));
        self
    }

    /// `SET path = if_not_exists(path, default)`
    pub fn set_if_not_exists(mut self, path: Path, default: impl Into<AttrValue>) -> Self {
        let rhs = SetValue::IfNotExists(path.clone(), default.into());
        self.actions.push(UpdateAction::Set(path, rhs));
        self
    }

    /// `SET path = path + by`
    pub fn increment(mut self, path: Path, by: impl Into<AttrValue>) -> Self {
        let rhs = SetValue::Plus(path.clone(), by.into());
        self.actions.push(UpdateAction::Set(path, rhs));
        self
    }

    /// `SET path = path - by`
    pub fn decrement(mut self, path: Path, by: impl Into<AttrValue>) -> Self {
        let rhs = SetValue::Minus(path.clone(), by.into());
        self.actions.push(UpdateAction::Set(path, rhs));
        self
    }

    /// `REMOVE path`
    pub fn remove(mut self, path: Path) -> Self {
        self.actions.push(UpdateAction::Remove(path));
        self
    }

    /// `ADD path value`
    pub fn add(mut self, path: Path, value: impl Into<AttrValue>) -> Self {
        self.actions.push(UpdateAction::Add(path, value.into()));
        self
    }

    /// `DELETE path value`
    pub fn delete(mut self, path: Path, value: impl Into<AttrValue>) -> Self {
        self.actions.push(UpdateAction::Delete(path, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[UpdateAction] {
        &self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let u = UpdateExpr::new()
            .set(Path::field("a"), 1)
            .remove(Path::field("b"))
            .add(Path::field("c"), 2);

        assert_eq!(u.actions().len(), 3);
        assert!(matches!(u.actions()[0], UpdateAction::Set(_, _)));
        assert!(matches!(u.actions()[1], UpdateAction::Remove(_)));
        assert!(matches!(u.actions()[2], UpdateAction::Add(_, _)));
    }

    #[test]
    fn test_empty() {
        assert!(UpdateExpr::new().is_empty());
    }
}
