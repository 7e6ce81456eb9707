//! Alembic Expr: typed expression trees and the wire compiler
//!
//! Predicates and mutations are built as immutable trees through a typed
//! field DSL, then compiled into flat wire fragments. All fragments for one
//! request draw placeholders from a single shared `Namespace`, so a key
//! condition and an independently supplied filter never collide when their
//! placeholder maps are merged into one payload.
//!
//! # Quick Start
//!
//! ```
//! use alembic_expr::{compile_condition, fields, Namespace};
//!
//! fields! {
//!     pub mod post {
//!         key: String,
//!         views: u64,
//!     }
//! }
//!
//! let mut ns = Namespace::new();
//! let wire = compile_condition(&post::views().ge(10u64), &mut ns);
//! assert_eq!(wire.expression, "#n0 >= :v0");
//! ```

pub mod compile;
pub mod condition;
pub mod dsl;
pub mod namespace;
pub mod path;
pub mod update;

pub use compile::{compile_condition, compile_key_condition, compile_update, ExprWriter};
pub use condition::{CmpOp, Condition};
pub use dsl::Field;
pub use namespace::Namespace;
pub use path::Path;
pub use update::{SetValue, UpdateAction, UpdateExpr};
