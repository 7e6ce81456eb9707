//! Wire-level value model for the key-value store
//!
//! `AttrValue` is the store's native attribute representation. Records cross
//! the wire as `WireItem` maps (field name to attribute value); compiled
//! expressions cross as `WireExpression` fragments whose placeholder maps
//! share one namespace per request.

use crate::{AlembicError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A record encoded for the wire: field name to attribute value.
pub type WireItem = BTreeMap<String, AttrValue>;

/// A key encoded for the wire: one entry for hash-only keys, two for
/// composite keys.
pub type WireKey = BTreeMap<String, AttrValue>;

/// Store-native attribute value
///
/// Numbers travel as canonical decimal strings (`N`), matching the wire
/// protocol; sets are kept sorted so wire encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    /// String
    S(String),
    /// Number, canonical decimal string
    N(String),
    /// Binary
    B(Vec<u8>),
    /// Boolean
    Bool(bool),
    /// Null
    Null,
    /// List
    L(Vec<AttrValue>),
    /// Map
    M(BTreeMap<String, AttrValue>),
    /// String set
    Ss(BTreeSet<String>),
    /// Number set
    Ns(BTreeSet<String>),
}

impl AttrValue {
    /// Build a binary value (a `From<Vec<u8>>` impl would shadow the list
    /// conversion, so this is a named constructor).
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        AttrValue::B(bytes.into())
    }

    /// Build a number value from anything displayable as a decimal.
    pub fn number(n: impl ToString) -> Self {
        AttrValue::N(n.to_string())
    }

    /// Keys may only be scalars: strings, numbers, or binary.
    pub fn is_key_scalar(&self) -> bool {
        matches!(self, AttrValue::S(_) | AttrValue::N(_) | AttrValue::B(_))
    }

    /// Extract as &str
    pub fn as_str(&self) -> Result<&str> {
        match self {
            AttrValue::S(s) => Ok(s),
            _ => Err(AlembicError::InvalidState("Not a string value".into())),
        }
    }

    /// Extract as i64
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            AttrValue::N(n) => n
                .parse()
                .map_err(|_| AlembicError::InvalidState(format!("Not an integer: {}", n))),
            _ => Err(AlembicError::InvalidState("Not a number value".into())),
        }
    }

    /// Extract as f64
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            AttrValue::N(n) => n
                .parse()
                .map_err(|_| AlembicError::InvalidState(format!("Not a number: {}", n))),
            _ => Err(AlembicError::InvalidState("Not a number value".into())),
        }
    }

    /// Extract as bool
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            AttrValue::Bool(b) => Ok(*b),
            _ => Err(AlembicError::InvalidState("Not a boolean value".into())),
        }
    }

    /// Extract as list
    pub fn as_list(&self) -> Result<&[AttrValue]> {
        match self {
            AttrValue::L(l) => Ok(l),
            _ => Err(AlembicError::InvalidState("Not a list value".into())),
        }
    }

    /// Extract as map
    pub fn as_map(&self) -> Result<&BTreeMap<String, AttrValue>> {
        match self {
            AttrValue::M(m) => Ok(m),
            _ => Err(AlembicError::InvalidState("Not a map value".into())),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::S(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::S(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(l: Vec<AttrValue>) -> Self {
        AttrValue::L(l)
    }
}

macro_rules! attr_from_number {
    ($($t:ty),+) => {
        $(impl From<$t> for AttrValue {
            fn from(n: $t) -> Self {
                AttrValue::N(n.to_string())
            }
        })+
    };
}

attr_from_number!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// Total order over attribute values.
///
/// Same-variant values compare naturally (numbers numerically, strings
/// lexically, binary bytewise); mixed variants order by variant rank. This
/// is the order the store uses for range keys and pagination.
pub fn cmp_values(a: &AttrValue, b: &AttrValue) -> Ordering {
    fn rank(v: &AttrValue) -> u8 {
        match v {
            AttrValue::S(_) => 0,
            AttrValue::N(_) => 1,
            AttrValue::B(_) => 2,
            AttrValue::Bool(_) => 3,
            AttrValue::Null => 4,
            AttrValue::L(_) => 5,
            AttrValue::M(_) => 6,
            AttrValue::Ss(_) => 7,
            AttrValue::Ns(_) => 8,
        }
    }

    match (a, b) {
        (AttrValue::S(x), AttrValue::S(y)) => x.cmp(y),
        (AttrValue::N(x), AttrValue::N(y)) => cmp_numbers(x, y),
        (AttrValue::B(x), AttrValue::B(y)) => x.cmp(y),
        (AttrValue::Bool(x), AttrValue::Bool(y)) => x.cmp(y),
        (AttrValue::Null, AttrValue::Null) => Ordering::Equal,
        (AttrValue::L(x), AttrValue::L(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                match cmp_values(xi, yi) {
                    Ordering::Equal => continue,
                    ord => return ord,
                }
            }
            x.len().cmp(&y.len())
        }
        (AttrValue::M(x), AttrValue::M(y)) => {
            for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
                match xk.cmp(yk).then_with(|| cmp_values(xv, yv)) {
                    Ordering::Equal => continue,
                    ord => return ord,
                }
            }
            x.len().cmp(&y.len())
        }
        (AttrValue::Ss(x), AttrValue::Ss(y)) => x.cmp(y),
        (AttrValue::Ns(x), AttrValue::Ns(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare two canonical decimal strings numerically, falling back to
/// lexical order when either side fails to parse.
fn cmp_numbers(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Numeric addition on `N` values, used by `ADD` update actions.
pub fn add_numbers(a: &AttrValue, b: &AttrValue) -> Result<AttrValue> {
    // Prefer integer arithmetic so counters never pick up a fraction.
    if let (Ok(x), Ok(y)) = (a.as_i64(), b.as_i64()) {
        return Ok(AttrValue::N((x + y).to_string()));
    }
    let sum = a.as_f64()? + b.as_f64()?;
    Ok(AttrValue::N(sum.to_string()))
}

/// A compiled expression fragment: the expression string plus the
/// name-placeholder and value-placeholder maps it references.
///
/// Condition, filter, key-condition, and update fragments all share this
/// shape so a client can merge several fragments (compiled against one
/// namespace) into a single request payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireExpression {
    /// Expression string referencing `#n` and `:v` placeholders.
    pub expression: String,
    /// Name placeholder to field name.
    pub names: BTreeMap<String, String>,
    /// Value placeholder to wire value.
    pub values: BTreeMap<String, AttrValue>,
}

impl WireExpression {
    /// Merge another fragment's placeholder maps into this one's.
    ///
    /// Fragments compiled against a shared namespace never collide; a
    /// collision here means two fragments were compiled against separate
    /// namespaces, which is a caller bug.
    pub fn absorb_placeholders(&mut self, other: &WireExpression) -> Result<()> {
        for (k, v) in &other.names {
            if self.names.insert(k.clone(), v.clone()).is_some() {
                return Err(AlembicError::Expression(format!(
                    "Placeholder collision on '{}': fragments must share one namespace",
                    k
                )));
            }
        }
        for (k, v) in &other.values {
            if self.values.insert(k.clone(), v.clone()).is_some() {
                return Err(AlembicError::Expression(format!(
                    "Placeholder collision on '{}': fragments must share one namespace",
                    k
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_ordering_is_numeric() {
        let a = AttrValue::from(9);
        let b = AttrValue::from(10);
        assert_eq!(cmp_values(&a, &b), Ordering::Less);
        // Lexically "9" > "10"; numeric order must win.
        assert_eq!(cmp_values(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_string_ordering() {
        let a = AttrValue::from("apple");
        let b = AttrValue::from("banana");
        assert_eq!(cmp_values(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_add_numbers_integer() {
        let sum = add_numbers(&AttrValue::from(40), &AttrValue::from(2)).unwrap();
        assert_eq!(sum, AttrValue::N("42".into()));
    }

    #[test]
    fn test_key_scalar_check() {
        assert!(AttrValue::from("a").is_key_scalar());
        assert!(AttrValue::from(1).is_key_scalar());
        assert!(AttrValue::binary(vec![1u8, 2]).is_key_scalar());
        assert!(!AttrValue::Bool(true).is_key_scalar());
        assert!(!AttrValue::L(vec![]).is_key_scalar());
    }

    #[test]
    fn test_absorb_placeholders_rejects_collision() {
        let mut a = WireExpression {
            expression: "#n0 = :v0".into(),
            names: [("#n0".to_string(), "key".to_string())].into(),
            values: [(":v0".to_string(), AttrValue::from("a"))].into(),
        };
        let b = WireExpression {
            expression: "#n0 > :v1".into(),
            names: [("#n0".to_string(), "other".to_string())].into(),
            values: [(":v1".to_string(), AttrValue::from(1))].into(),
        };
        assert!(a.absorb_placeholders(&b).is_err());
    }
}
