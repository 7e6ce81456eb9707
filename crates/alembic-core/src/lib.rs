//! Alembic Core: wire types and boundaries for the data-access layer
//!
//! This crate defines the pieces shared by the expression compiler and the
//! pipeline engine:
//! - `AttrValue` / `WireItem` / `WireKey`: the store's native value model
//! - `WireExpression`: compiled expression fragments with placeholder maps
//! - `KeyDef` / `Key` and the key marshaling functions
//! - `Mapper`: the record encode/decode boundary, with a serde-backed
//!   default implementation
//! - `AlembicError` / `Result`: the crate-wide error taxonomy

pub mod attr;
pub mod error;
pub mod key;
pub mod mapper;

pub use attr::{add_numbers, cmp_values, AttrValue, WireExpression, WireItem, WireKey};
pub use error::{AlembicError, Result};
pub use key::{read_key, write_key, Key, KeyDef};
pub use mapper::{attr_from_json, json_from_attr, JsonMapper, Mapper};
