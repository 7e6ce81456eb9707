//! Record mapping boundary
//!
//! A `Mapper` converts typed records to and from the store's wire encoding.
//! `write` and `read` must be two-sided inverses for every valid record.
//! `JsonMapper` is the default serde-backed implementation; bespoke mappers
//! implement the trait directly.
//!
//! # Example
//!
//! ```
//! use alembic_core::{JsonMapper, Mapper};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Post {
//!     key: String,
//!     tags: Vec<String>,
//! }
//!
//! let mapper = JsonMapper::<Post>::new();
//! let post = Post { key: "a".into(), tags: vec![] };
//! let item = mapper.write(&post).unwrap();
//! assert_eq!(mapper.read(&item).unwrap(), post);
//! ```

use crate::{AlembicError, AttrValue, Result, WireItem};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Converts a typed record to/from the wire encoding.
pub trait Mapper: Send + Sync + 'static {
    type Record: Send + Sync;

    /// Encode a record into a wire item.
    fn write(&self, record: &Self::Record) -> Result<WireItem>;

    /// Decode a wire item back into a record.
    fn read(&self, item: &WireItem) -> Result<Self::Record>;
}

/// Serde-backed mapper: records go through `serde_json::Value` and then
/// into the attribute model (strings to `S`, numbers to `N`, arrays to `L`,
/// objects to `M`).
pub struct JsonMapper<R> {
    _record: PhantomData<fn() -> R>,
}

impl<R> JsonMapper<R> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<R> Default for JsonMapper<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Mapper for JsonMapper<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Record = R;

    fn write(&self, record: &R) -> Result<WireItem> {
        let value = serde_json::to_value(record)?;
        match attr_from_json(value) {
            AttrValue::M(m) => Ok(m),
            other => Err(AlembicError::Mapping(format!(
                "record must encode as a map, got {:?}",
                other
            ))),
        }
    }

    fn read(&self, item: &WireItem) -> Result<R> {
        let value = json_from_attr(&AttrValue::M(item.clone()))?;
        serde_json::from_value(value).map_err(|e| AlembicError::Mapping(e.to_string()))
    }
}

/// Convert a JSON value into the attribute model.
pub fn attr_from_json(value: serde_json::Value) -> AttrValue {
    use serde_json::Value;
    match value {
        Value::Null => AttrValue::Null,
        Value::Bool(b) => AttrValue::Bool(b),
        Value::Number(n) => AttrValue::N(n.to_string()),
        Value::String(s) => AttrValue::S(s),
        Value::Array(items) => AttrValue::L(items.into_iter().map(attr_from_json).collect()),
        Value::Object(fields) => AttrValue::M(
            fields
                .into_iter()
                .map(|(k, v)| (k, attr_from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

/// Convert an attribute value back into JSON.
///
/// Binary and set values have no JSON-native form and are rejected; records
/// carrying those need a bespoke `Mapper`.
pub fn json_from_attr(value: &AttrValue) -> Result<serde_json::Value> {
    use serde_json::Value;
    Ok(match value {
        AttrValue::Null => Value::Null,
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::S(s) => Value::String(s.clone()),
        AttrValue::N(n) => {
            let parsed: serde_json::Number = n.parse().map_err(|_| {
                AlembicError::Mapping(format!("number '{}' is not JSON-representable", n))
            })?;
            Value::Number(parsed)
        }
        AttrValue::L(items) => Value::Array(
            items
                .iter()
                .map(json_from_attr)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttrValue::M(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), json_from_attr(v)?)))
                .collect::<Result<serde_json::Map<_, _>>>()?,
        ),
        AttrValue::B(_) | AttrValue::Ss(_) | AttrValue::Ns(_) => {
            return Err(AlembicError::Mapping(
                "binary and set values require a bespoke Mapper".into(),
            ));
        }
    })
}
