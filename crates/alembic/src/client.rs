//! Typed key-value data access
//!
//! `KeyValueClient` binds a record type, a table, and a key shape together
//! and exposes the store's operations over typed records. Every request
//! compiles its condition and update trees against one fresh `Namespace`,
//! so the fragments it sends can always be merged without placeholder
//! collisions.
//!
//! # Example
//!
//! ```no_run
//! use alembic::prelude::*;
//! use alembic_core::KeyDef;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Post {
//!     key: String,
//!     views: u64,
//! }
//!
//! # async fn demo(backend: std::sync::Arc<dyn alembic::StoreBackend>) -> alembic_core::Result<()> {
//! let posts = KeyValueClient::json(backend, "posts", KeyDef::hash("key"));
//! posts.put(&Post { key: "a".into(), views: 0 }).await?;
//! let post: Option<Post> = posts.get(&Key::hash("a")).await?;
//! # Ok(())
//! # }
//! ```

use crate::store::{QueryRequest, StoreBackend};
use alembic_core::{
    read_key, write_key, AlembicError, AttrValue, JsonMapper, Key, KeyDef, Mapper, Result,
};
use alembic_expr::{
    compile_condition, compile_key_condition, compile_update, Condition, Namespace, UpdateExpr,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Optional clauses of a `query` call.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Condition on the range field, ANDed into the key condition.
    pub range: Option<Condition>,
    /// Filter applied to matched items, compiled as its own fragment.
    pub filter: Option<Condition>,
    /// Resume point from a previous page's `last_evaluated_key`.
    pub exclusive_start_key: Option<Key>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, range: Condition) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn starting_after(mut self, key: Key) -> Self {
        self.exclusive_start_key = Some(key);
        self
    }
}

/// One page of decoded query results.
#[derive(Debug)]
pub struct QueryPage<R> {
    pub items: Vec<R>,
    /// Present when more pages remain; feed it back through
    /// `QueryOptions::starting_after`.
    pub last_evaluated_key: Option<Key>,
}

/// Typed client for one table.
pub struct KeyValueClient<M: Mapper> {
    backend: Arc<dyn StoreBackend>,
    table: String,
    key_def: KeyDef,
    mapper: M,
}

impl<R> KeyValueClient<JsonMapper<R>>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Client with the default serde-backed mapper.
    pub fn json(
        backend: Arc<dyn StoreBackend>,
        table: impl Into<String>,
        key_def: KeyDef,
    ) -> Self {
        Self::new(backend, table, key_def, JsonMapper::new())
    }
}

impl<M: Mapper> KeyValueClient<M> {
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        table: impl Into<String>,
        key_def: KeyDef,
        mapper: M,
    ) -> Self {
        Self {
            backend,
            table: table.into(),
            key_def,
            mapper,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_def(&self) -> &KeyDef {
        &self.key_def
    }

    /// Fetch one record by key.
    pub async fn get(&self, key: &Key) -> Result<Option<M::Record>> {
        let wire_key = write_key(&self.key_def, key)?;
        match self.backend.get_item(&self.table, wire_key).await? {
            Some(item) => Ok(Some(self.mapper.read(&item)?)),
            None => Ok(None),
        }
    }

    /// Fetch a batch of records. A store response with no section for this
    /// table is an error; an empty result set is not.
    pub async fn batch_get(&self, keys: &[Key]) -> Result<Vec<M::Record>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let wire_keys = keys
            .iter()
            .map(|k| write_key(&self.key_def, k))
            .collect::<Result<Vec<_>>>()?;
        let items = self
            .backend
            .batch_get_items(&self.table, wire_keys)
            .await?
            .ok_or_else(|| AlembicError::BatchResponseMissing {
                table: self.table.clone(),
            })?;
        items.iter().map(|item| self.mapper.read(item)).collect()
    }

    /// Unconditional overwrite.
    pub async fn put(&self, record: &M::Record) -> Result<()> {
        let item = self.mapper.write(record)?;
        self.backend.put_item(&self.table, item, None).await
    }

    /// Conditional write: the precondition is evaluated against the stored
    /// item (or its absence) and a false outcome rejects the write.
    pub async fn put_if(&self, record: &M::Record, condition: &Condition) -> Result<()> {
        let item = self.mapper.write(record)?;
        let mut ns = Namespace::new();
        let compiled = compile_condition(condition, &mut ns);
        self.backend
            .put_item(&self.table, item, Some(compiled))
            .await
    }

    /// Write a batch of records; returns the records the store did not
    /// persist, decoded back, for caller-driven resubmission.
    pub async fn batch_put(&self, records: &[M::Record]) -> Result<Vec<M::Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let items = records
            .iter()
            .map(|r| self.mapper.write(r))
            .collect::<Result<Vec<_>>>()?;
        let unprocessed = self.backend.batch_write(&self.table, items).await?;
        if !unprocessed.is_empty() {
            tracing::warn!(
                table = %self.table,
                count = unprocessed.len(),
                "batch write left unprocessed items"
            );
        }
        unprocessed
            .iter()
            .map(|item| self.mapper.read(item))
            .collect()
    }

    /// Apply an update expression to the record at `key`.
    pub async fn update(&self, key: &Key, update: &UpdateExpr) -> Result<()> {
        let wire_key = write_key(&self.key_def, key)?;
        let mut ns = Namespace::new();
        let compiled = compile_update(update, &mut ns)?;
        self.backend.update_item(&self.table, wire_key, compiled).await
    }

    /// Unpaginated full-table read.
    pub async fn scan(&self) -> Result<Vec<M::Record>> {
        let items = self.backend.scan(&self.table).await?;
        items.iter().map(|item| self.mapper.read(item)).collect()
    }

    /// Key-condition query: hash equality, optional range clause, optional
    /// filter, one page per call.
    pub async fn query(
        &self,
        hash: impl Into<AttrValue>,
        options: QueryOptions,
    ) -> Result<QueryPage<M::Record>> {
        let mut ns = Namespace::new();
        let key_condition = compile_key_condition(
            self.key_def.hash_field(),
            &hash.into(),
            options.range.as_ref(),
            &mut ns,
        );
        let filter = options
            .filter
            .as_ref()
            .map(|f| compile_condition(f, &mut ns));
        let exclusive_start_key = options
            .exclusive_start_key
            .as_ref()
            .map(|k| write_key(&self.key_def, k))
            .transpose()?;

        let request = QueryRequest::from_fragments(key_condition, filter, exclusive_start_key)?;
        let output = self.backend.query(&self.table, request).await?;

        let items = output
            .items
            .iter()
            .map(|item| self.mapper.read(item))
            .collect::<Result<Vec<_>>>()?;
        let last_evaluated_key = output
            .last_evaluated_key
            .as_ref()
            .map(|wire| read_key(&self.key_def, wire))
            .transpose()?;

        Ok(QueryPage {
            items,
            last_evaluated_key,
        })
    }
}
