//! In-memory store and messaging backends
//!
//! `MemoryStore` implements the full wire protocol against process-local
//! tables, including condition evaluation, update application, and
//! pagination, so pipelines and data-access code run unchanged in local
//! hosting and tests. `MemoryQueue` and `MemoryTopic` are the matching
//! capability stand-ins.

mod eval;

use crate::dependency::{QueueClient, TopicClient};
use crate::store::{QueryOutput, QueryRequest, StoreBackend};
use alembic_core::{cmp_values, AlembicError, AttrValue, KeyDef, Result, WireExpression, WireItem, WireKey};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Table-ordering key: hash component, then range component.
#[derive(Clone, PartialEq, Eq)]
struct ItemKey {
    hash: AttrValue,
    range: Option<AttrValue>,
}

impl Ord for ItemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_values(&self.hash, &other.hash).then_with(|| match (&self.range, &other.range) {
            (Some(a), Some(b)) => cmp_values(a, b),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        })
    }
}

impl PartialOrd for ItemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Table {
    key_def: KeyDef,
    items: BTreeMap<ItemKey, WireItem>,
}

type RejectFn = Box<dyn Fn(&WireItem) -> bool + Send>;

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, Table>,
    /// Batch writes matching this predicate are reported unprocessed.
    reject: Option<RejectFn>,
}

/// Process-local store backend.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: usize::MAX,
        }
    }

    /// Cap query pages at `page_size` items, forcing pagination.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: page_size.max(1),
        }
    }

    pub fn create_table(&self, name: impl Into<String>, key_def: KeyDef) {
        self.inner.lock().tables.insert(
            name.into(),
            Table {
                key_def,
                items: BTreeMap::new(),
            },
        );
    }

    /// Make `batch_write` report every item matching `predicate` as
    /// unprocessed, for exercising caller-driven resubmission.
    pub fn reject_writes_where(&self, predicate: impl Fn(&WireItem) -> bool + Send + 'static) {
        self.inner.lock().reject = Some(Box::new(predicate));
    }

    fn item_key(key_def: &KeyDef, fields: &BTreeMap<String, AttrValue>) -> Result<ItemKey> {
        let fetch = |field: &str| {
            fields.get(field).cloned().ok_or_else(|| {
                AlembicError::KeyShape(format!("item is missing key field '{}'", field))
            })
        };
        Ok(ItemKey {
            hash: fetch(key_def.hash_field())?,
            range: key_def.range_field().map(fetch).transpose()?,
        })
    }

    fn wire_key(key_def: &KeyDef, item_key: &ItemKey) -> WireKey {
        let mut wire = WireKey::new();
        wire.insert(key_def.hash_field().to_string(), item_key.hash.clone());
        if let (Some(field), Some(range)) = (key_def.range_field(), &item_key.range) {
            wire.insert(field.to_string(), range.clone());
        }
        wire
    }
}

fn unknown_table(name: &str) -> AlembicError {
    AlembicError::Store(format!("unknown table '{}'", name))
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn get_item(&self, table: &str, key: WireKey) -> Result<Option<WireItem>> {
        let inner = self.inner.lock();
        let table = inner.tables.get(table).ok_or_else(|| unknown_table(table))?;
        let item_key = Self::item_key(&table.key_def, &key)?;
        Ok(table.items.get(&item_key).cloned())
    }

    /// An unknown table yields `None`, mirroring a store response with no
    /// section for the table.
    async fn batch_get_items(
        &self,
        table: &str,
        keys: Vec<WireKey>,
    ) -> Result<Option<Vec<WireItem>>> {
        let inner = self.inner.lock();
        let Some(table) = inner.tables.get(table) else {
            return Ok(None);
        };
        let mut found = Vec::new();
        for key in keys {
            let item_key = Self::item_key(&table.key_def, &key)?;
            if let Some(item) = table.items.get(&item_key) {
                found.push(item.clone());
            }
        }
        Ok(Some(found))
    }

    async fn put_item(
        &self,
        table: &str,
        item: WireItem,
        condition: Option<WireExpression>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let name = table;
        let table = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| unknown_table(table))?;
        let item_key = Self::item_key(&table.key_def, &item)?;

        if let Some(condition) = condition {
            let parsed =
                eval::parse_condition(&condition.expression, &condition.names, &condition.values)?;
            // Absent items evaluate against an empty map, so
            // attribute_not_exists preconditions pass on first write.
            let existing = table.items.get(&item_key).cloned().unwrap_or_default();
            if !eval::eval_condition(&parsed, &existing) {
                return Err(AlembicError::ConditionFailed(name.to_string()));
            }
        }

        table.items.insert(item_key, item);
        Ok(())
    }

    async fn batch_write(&self, table: &str, items: Vec<WireItem>) -> Result<Vec<WireItem>> {
        let mut inner = self.inner.lock();
        let Inner { tables, reject } = &mut *inner;
        let table = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;

        let mut unprocessed = Vec::new();
        for item in items {
            if reject.as_ref().is_some_and(|r| r(&item)) {
                unprocessed.push(item);
                continue;
            }
            let item_key = Self::item_key(&table.key_def, &item)?;
            table.items.insert(item_key, item);
        }
        Ok(unprocessed)
    }

    async fn update_item(&self, table: &str, key: WireKey, update: WireExpression) -> Result<()> {
        let mut inner = self.inner.lock();
        let table = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| unknown_table(table))?;
        let item_key = Self::item_key(&table.key_def, &key)?;

        let ops = eval::parse_update(&update.expression, &update.names, &update.values)?;
        // Upsert: an absent item starts from its key attributes.
        let mut item = table.items.get(&item_key).cloned().unwrap_or(key);
        eval::apply_update(&mut item, &ops)?;
        table.items.insert(item_key, item);
        Ok(())
    }

    async fn scan(&self, table: &str) -> Result<Vec<WireItem>> {
        let inner = self.inner.lock();
        let table = inner.tables.get(table).ok_or_else(|| unknown_table(table))?;
        Ok(table.items.values().cloned().collect())
    }

    async fn query(&self, table: &str, request: QueryRequest) -> Result<QueryOutput> {
        let inner = self.inner.lock();
        let table = inner.tables.get(table).ok_or_else(|| unknown_table(table))?;

        let key_condition =
            eval::parse_condition(&request.key_condition, &request.names, &request.values)?;
        let filter = request
            .filter
            .as_deref()
            .map(|f| eval::parse_condition(f, &request.names, &request.values))
            .transpose()?;
        let start = request
            .exclusive_start_key
            .as_ref()
            .map(|k| Self::item_key(&table.key_def, k))
            .transpose()?;

        // Key condition selects the page in key order; the filter applies
        // within the page, after pagination.
        let mut matched = table
            .items
            .iter()
            .filter(|(item_key, _)| {
                start.as_ref().map_or(true, |s| (*item_key).cmp(s) == Ordering::Greater)
            })
            .filter(|(_, item)| eval::eval_condition(&key_condition, item))
            .peekable();

        let mut page: Vec<(&ItemKey, &WireItem)> = Vec::new();
        while page.len() < self.page_size {
            match matched.next() {
                Some(entry) => page.push(entry),
                None => break,
            }
        }
        let more_remain = matched.peek().is_some();

        let last_evaluated_key = if more_remain {
            page.last()
                .map(|(item_key, _)| Self::wire_key(&table.key_def, item_key))
        } else {
            None
        };

        let items = page
            .into_iter()
            .map(|(_, item)| item)
            .filter(|item| filter.as_ref().map_or(true, |f| eval::eval_condition(f, item)))
            .cloned()
            .collect();

        Ok(QueryOutput {
            items,
            last_evaluated_key,
        })
    }
}

/// Queue stand-in that buffers sent messages.
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<Vec<serde_json::Value>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn send(&self, message: serde_json::Value) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

/// Topic stand-in that buffers published messages.
#[derive(Default)]
pub struct MemoryTopic {
    published: Mutex<Vec<serde_json::Value>>,
}

impl MemoryTopic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<serde_json::Value> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl TopicClient for MemoryTopic {
    async fn publish(&self, message: serde_json::Value) -> Result<()> {
        self.published.lock().push(message);
        Ok(())
    }
}
