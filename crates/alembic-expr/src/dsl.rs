//! Typed field accessors
//!
//! Expression construction goes through `Field<T>` handles declared
//! alongside the record shape, so conditions can only reference fields that
//! exist and operators valid for each field's type. The `fields!` macro
//! declares a shape module of accessors.
//!
//! # Example
//!
//! ```
//! use alembic_expr::fields;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Post {
//!     key: String,
//!     views: u64,
//! }
//!
//! fields! {
//!     pub mod post {
//!         key: String,
//!         views: u64,
//!     }
//! }
//!
//! let cond = post::key().begins_with("2024-").and(post::views().gt(100u64));
//! ```

use crate::{CmpOp, Condition, Path, UpdateExpr};
use alembic_core::AttrValue;
use std::marker::PhantomData;

/// A typed handle to one field of a record shape.
#[derive(Debug, Clone)]
pub struct Field<T> {
    path: Path,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Field<T> {
    pub fn new(name: &str) -> Self {
        Self {
            path: Path::field(name),
            _marker: PhantomData,
        }
    }

    /// Descend into a nested attribute, keeping the child's type explicit
    /// at the call site.
    pub fn child<U>(&self, name: &str) -> Field<U> {
        Field {
            path: self.path.clone().child(name),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> Path {
        self.path.clone()
    }

    /// `attribute_exists(field)`
    pub fn exists(&self) -> Condition {
        Condition::Exists(self.path.clone())
    }

    /// `attribute_not_exists(field)`
    pub fn not_exists(&self) -> Condition {
        Condition::NotExists(self.path.clone())
    }

    /// `REMOVE field`
    pub fn unset(&self) -> UpdateExpr {
        UpdateExpr::new().remove(self.path.clone())
    }
}

impl<T: Into<AttrValue>> Field<T> {
    fn cmp(&self, op: CmpOp, value: impl Into<T>) -> Condition {
        Condition::Compare {
            path: self.path.clone(),
            op,
            value: value.into().into(),
        }
    }

    pub fn eq(&self, value: impl Into<T>) -> Condition {
        self.cmp(CmpOp::Eq, value)
    }

    pub fn ne(&self, value: impl Into<T>) -> Condition {
        self.cmp(CmpOp::Ne, value)
    }

    pub fn lt(&self, value: impl Into<T>) -> Condition {
        self.cmp(CmpOp::Lt, value)
    }

    pub fn le(&self, value: impl Into<T>) -> Condition {
        self.cmp(CmpOp::Le, value)
    }

    pub fn gt(&self, value: impl Into<T>) -> Condition {
        self.cmp(CmpOp::Gt, value)
    }

    pub fn ge(&self, value: impl Into<T>) -> Condition {
        self.cmp(CmpOp::Ge, value)
    }

    /// `field BETWEEN low AND high` (inclusive)
    pub fn between(&self, low: impl Into<T>, high: impl Into<T>) -> Condition {
        Condition::Between {
            path: self.path.clone(),
            low: low.into().into(),
            high: high.into().into(),
        }
    }

    /// `SET field = value`
    pub fn set(&self, value: impl Into<T>) -> UpdateExpr {
        UpdateExpr::new().set(self.path.clone(), value.into())
    }
}

impl Field<String> {
    /// `begins_with(field, prefix)`
    pub fn begins_with(&self, prefix: impl Into<String>) -> Condition {
        Condition::BeginsWith {
            path: self.path.clone(),
            prefix: prefix.into(),
        }
    }

    /// `contains(field, needle)` — substring test
    pub fn contains(&self, needle: impl Into<String>) -> Condition {
        Condition::Contains {
            path: self.path.clone(),
            value: AttrValue::S(needle.into()),
        }
    }
}

impl<T: Into<AttrValue>> Field<Vec<T>> {
    /// `contains(field, element)` — list membership
    pub fn has(&self, element: impl Into<T>) -> Condition {
        Condition::Contains {
            path: self.path.clone(),
            value: element.into().into(),
        }
    }
}

macro_rules! numeric_field {
    ($($t:ty),+) => {
        $(impl Field<$t> {
            /// `SET field = field + by`
            pub fn plus(&self, by: $t) -> UpdateExpr {
                UpdateExpr::new().increment(self.path.clone(), by)
            }

            /// `SET field = field - by`
            pub fn minus(&self, by: $t) -> UpdateExpr {
                UpdateExpr::new().decrement(self.path.clone(), by)
            }
        })+
    };
}

numeric_field!(i32, i64, u32, u64, f64);

/// Declare a module of typed field accessors for a record shape.
///
/// ```ignore
/// fields! {
///     pub mod user {
///         id: String,
///         age: u64,
///     }
/// }
/// ```
#[macro_export]
macro_rules! fields {
    ($vis:vis mod $name:ident { $($field:ident: $ty:ty),+ $(,)? }) => {
        $vis mod $name {
            $(
                pub fn $field() -> $crate::Field<$ty> {
                    $crate::Field::new(stringify!($field))
                }
            )+
        }
    };
}
