//! Key definitions and structured key values
//!
//! A table is keyed either by a single hash field or by a (hash, range)
//! pair; the shape is fixed when the client is constructed. `write_key` and
//! `read_key` marshal between structured keys and the wire encoding, and
//! are exact inverses for every valid key.

use crate::{AlembicError, AttrValue, Result, WireKey};
use serde::{Deserialize, Serialize};

/// Which fields of the record form the table key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyDef {
    /// Single hash field.
    Hash { field: String },
    /// Hash field plus range (sort) field.
    Composite { hash: String, range: String },
}

impl KeyDef {
    pub fn hash(field: impl Into<String>) -> Self {
        KeyDef::Hash {
            field: field.into(),
        }
    }

    pub fn composite(hash: impl Into<String>, range: impl Into<String>) -> Self {
        KeyDef::Composite {
            hash: hash.into(),
            range: range.into(),
        }
    }

    /// Name of the hash field.
    pub fn hash_field(&self) -> &str {
        match self {
            KeyDef::Hash { field } => field,
            KeyDef::Composite { hash, .. } => hash,
        }
    }

    /// Name of the range field, if the key is composite.
    pub fn range_field(&self) -> Option<&str> {
        match self {
            KeyDef::Hash { .. } => None,
            KeyDef::Composite { range, .. } => Some(range),
        }
    }
}

/// A structured key value, matching the table's `KeyDef` arity.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Hash(AttrValue),
    Composite(AttrValue, AttrValue),
}

impl Key {
    pub fn hash(v: impl Into<AttrValue>) -> Self {
        Key::Hash(v.into())
    }

    pub fn composite(h: impl Into<AttrValue>, r: impl Into<AttrValue>) -> Self {
        Key::Composite(h.into(), r.into())
    }

    /// The hash component.
    pub fn hash_value(&self) -> &AttrValue {
        match self {
            Key::Hash(h) => h,
            Key::Composite(h, _) => h,
        }
    }

    /// The range component, if present.
    pub fn range_value(&self) -> Option<&AttrValue> {
        match self {
            Key::Hash(_) => None,
            Key::Composite(_, r) => Some(r),
        }
    }
}

/// Marshal a structured key into its wire encoding.
///
/// Fails if the key's arity does not match the definition or a component
/// is not a scalar.
pub fn write_key(def: &KeyDef, key: &Key) -> Result<WireKey> {
    let mut wire = WireKey::new();
    match (def, key) {
        (KeyDef::Hash { field }, Key::Hash(h)) => {
            require_scalar(field, h)?;
            wire.insert(field.clone(), h.clone());
        }
        (KeyDef::Composite { hash, range }, Key::Composite(h, r)) => {
            require_scalar(hash, h)?;
            require_scalar(range, r)?;
            wire.insert(hash.clone(), h.clone());
            wire.insert(range.clone(), r.clone());
        }
        (def, key) => {
            return Err(AlembicError::KeyShape(format!(
                "key arity does not match table definition ({:?} vs {:?})",
                def, key
            )));
        }
    }
    Ok(wire)
}

/// Unmarshal a wire key back into its structured form.
pub fn read_key(def: &KeyDef, wire: &WireKey) -> Result<Key> {
    let fetch = |field: &str| {
        wire.get(field).cloned().ok_or_else(|| {
            AlembicError::KeyShape(format!("wire key missing field '{}'", field))
        })
    };
    match def {
        KeyDef::Hash { field } => Ok(Key::Hash(fetch(field)?)),
        KeyDef::Composite { hash, range } => Ok(Key::Composite(fetch(hash)?, fetch(range)?)),
    }
}

fn require_scalar(field: &str, v: &AttrValue) -> Result<()> {
    if v.is_key_scalar() {
        Ok(())
    } else {
        Err(AlembicError::KeyShape(format!(
            "key field '{}' must be a string, number, or binary scalar",
            field
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_roundtrip() {
        let def = KeyDef::hash("id");
        let key = Key::hash("user-1");

        let wire = write_key(&def, &key).unwrap();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire.get("id"), Some(&AttrValue::from("user-1")));

        let back = read_key(&def, &wire).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_composite_key_roundtrip() {
        let def = KeyDef::composite("tenant", "seq");
        let key = Key::composite("acme", 42);

        let wire = write_key(&def, &key).unwrap();
        assert_eq!(wire.len(), 2);

        let back = read_key(&def, &wire).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let def = KeyDef::hash("id");
        let key = Key::composite("a", "b");
        assert!(write_key(&def, &key).is_err());

        let def = KeyDef::composite("h", "r");
        let key = Key::hash("a");
        assert!(write_key(&def, &key).is_err());
    }

    #[test]
    fn test_non_scalar_key_rejected() {
        let def = KeyDef::hash("id");
        let key = Key::Hash(AttrValue::L(vec![]));
        assert!(write_key(&def, &key).is_err());
    }

    #[test]
    fn test_read_key_missing_field() {
        let def = KeyDef::composite("h", "r");
        let mut wire = WireKey::new();
        wire.insert("h".into(), AttrValue::from("x"));
        assert!(read_key(&def, &wire).is_err());
    }
}
