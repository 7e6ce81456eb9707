//! Wire-level store boundary
//!
//! The data-access layer talks to the physical store through `StoreBackend`,
//! a trait over the wire protocol: items, keys, and compiled expression
//! fragments. `KeyValueClient` sits on top and owns key marshaling, record
//! mapping, and expression compilation.

use alembic_core::{AttrValue, Result, WireExpression, WireItem, WireKey};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A query payload: the key-condition clause, an optional independent
/// filter clause, and their merged placeholder maps.
///
/// Both clauses must have been compiled against one shared namespace; the
/// maps are merged here and a collision is rejected as a caller bug.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub key_condition: String,
    pub filter: Option<String>,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, AttrValue>,
    pub exclusive_start_key: Option<WireKey>,
}

impl QueryRequest {
    /// Merge a key-condition fragment and an optional filter fragment into
    /// one payload.
    pub fn from_fragments(
        key_condition: WireExpression,
        filter: Option<WireExpression>,
        exclusive_start_key: Option<WireKey>,
    ) -> Result<Self> {
        let mut merged = key_condition.clone();
        let mut filter_expr = None;
        if let Some(f) = &filter {
            merged.absorb_placeholders(f)?;
            filter_expr = Some(f.expression.clone());
        }
        Ok(Self {
            key_condition: key_condition.expression,
            filter: filter_expr,
            names: merged.names,
            values: merged.values,
            exclusive_start_key,
        })
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub items: Vec<WireItem>,
    /// Wire key of the last item returned, present when more pages remain.
    pub last_evaluated_key: Option<WireKey>,
}

/// The store's wire protocol.
///
/// Implementations are live connection handles; they perform no internal
/// retries, and batch operations report partial failure through their
/// return values rather than by raising.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Fetch one item, `None` when the store reports no item.
    async fn get_item(&self, table: &str, key: WireKey) -> Result<Option<WireItem>>;

    /// Fetch a batch of items. `None` means the store returned no response
    /// section for the table at all, which is distinct from an empty
    /// result.
    async fn batch_get_items(
        &self,
        table: &str,
        keys: Vec<WireKey>,
    ) -> Result<Option<Vec<WireItem>>>;

    /// Unconditional overwrite, or a conditional write when a compiled
    /// precondition is supplied.
    async fn put_item(
        &self,
        table: &str,
        item: WireItem,
        condition: Option<WireExpression>,
    ) -> Result<()>;

    /// Write a batch of items; returns the subset the store did not
    /// persist, for caller-driven resubmission.
    async fn batch_write(&self, table: &str, items: Vec<WireItem>) -> Result<Vec<WireItem>>;

    /// Apply a compiled update fragment to the item at `key`.
    async fn update_item(&self, table: &str, key: WireKey, update: WireExpression) -> Result<()>;

    /// Unpaginated full-table read.
    async fn scan(&self, table: &str) -> Result<Vec<WireItem>>;

    /// Key-condition query with optional filter and pagination.
    async fn query(&self, table: &str, request: QueryRequest) -> Result<QueryOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fragments_merges_maps() {
        let key = WireExpression {
            expression: "#n0 = :v0".into(),
            names: [("#n0".to_string(), "k".to_string())].into(),
            values: [(":v0".to_string(), AttrValue::from("a"))].into(),
        };
        let filter = WireExpression {
            expression: "#n1 > :v1".into(),
            names: [("#n1".to_string(), "views".to_string())].into(),
            values: [(":v1".to_string(), AttrValue::from(10))].into(),
        };

        let req = QueryRequest::from_fragments(key, Some(filter), None).unwrap();
        assert_eq!(req.key_condition, "#n0 = :v0");
        assert_eq!(req.filter.as_deref(), Some("#n1 > :v1"));
        assert_eq!(req.names.len(), 2);
        assert_eq!(req.values.len(), 2);
    }

    #[test]
    fn test_from_fragments_rejects_collision() {
        let key = WireExpression {
            expression: "#n0 = :v0".into(),
            names: [("#n0".to_string(), "k".to_string())].into(),
            values: [(":v0".to_string(), AttrValue::from("a"))].into(),
        };
        // Filter compiled against its own namespace reuses #n0.
        let filter = WireExpression {
            expression: "#n0 > :v0".into(),
            names: [("#n0".to_string(), "views".to_string())].into(),
            values: [(":v0".to_string(), AttrValue::from(10))].into(),
        };
        assert!(QueryRequest::from_fragments(key, Some(filter), None).is_err());
    }
}
