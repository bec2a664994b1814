//! In-process storage engine
//!
//! Each collection lives behind its own map entry, so operations on the
//! same collection are serialized while different collections proceed
//! independently. Data outlives `close()`: reopening the same backend sees
//! the previous rows, much like reopening a database file.

use super::StorageBackend;
use crate::error::StorageError;
use crate::schema::{Collection, CollectionSchema, Direction, IndexKey, IndexSpec, KeyRange};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

type IndexTree = BTreeMap<IndexKey, BTreeSet<String>>;

/// One collection: rows plus their secondary indexes
#[derive(Debug)]
struct MemoryCollection {
    specs: Vec<IndexSpec>,
    rows: BTreeMap<String, Value>,
    indexes: HashMap<&'static str, IndexTree>,
}

impl MemoryCollection {
    fn new(schema: &CollectionSchema) -> Self {
        Self {
            specs: schema.indexes.clone(),
            rows: BTreeMap::new(),
            indexes: schema.indexes.iter().map(|s| (s.name, IndexTree::new())).collect(),
        }
    }

    /// Add indexes declared by a newer schema and backfill them
    fn extend_schema(&mut self, schema: &CollectionSchema) {
        for spec in &schema.indexes {
            if self.specs.iter().any(|s| s.name == spec.name) {
                continue;
            }
            let mut tree = IndexTree::new();
            for (id, row) in &self.rows {
                for key in spec.keys_for(row) {
                    tree.entry(key).or_default().insert(id.clone());
                }
            }
            self.indexes.insert(spec.name, tree);
            self.specs.push(*spec);
        }
    }

    fn unindex(&mut self, id: &str, row: &Value) {
        for spec in &self.specs {
            let Some(tree) = self.indexes.get_mut(spec.name) else {
                continue;
            };
            for key in spec.keys_for(row) {
                if let Some(ids) = tree.get_mut(&key) {
                    ids.remove(id);
                    if ids.is_empty() {
                        tree.remove(&key);
                    }
                }
            }
        }
    }

    fn put(&mut self, id: &str, record: Value) {
        if let Some(old) = self.rows.remove(id) {
            self.unindex(id, &old);
        }
        for spec in &self.specs {
            if let Some(tree) = self.indexes.get_mut(spec.name) {
                for key in spec.keys_for(&record) {
                    tree.entry(key).or_default().insert(id.to_string());
                }
            }
        }
        self.rows.insert(id.to_string(), record);
    }

    fn delete(&mut self, id: &str) -> bool {
        match self.rows.remove(id) {
            Some(old) => {
                self.unindex(id, &old);
                true
            }
            None => false,
        }
    }

    /// Ids matching `range` in index order, each at most once
    fn scan(
        &self,
        collection: Collection,
        index: &str,
        range: &KeyRange,
        direction: Direction,
    ) -> Result<Vec<String>, StorageError> {
        let tree = self.indexes.get(index).ok_or_else(|| StorageError::UnknownIndex {
            collection,
            index: index.to_string(),
        })?;
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let entries = tree.range((range.lower.clone(), range.upper.clone()));
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut push = |set: &BTreeSet<String>, reverse: bool| {
            let iter: Box<dyn Iterator<Item = &String>> = if reverse {
                Box::new(set.iter().rev())
            } else {
                Box::new(set.iter())
            };
            for id in iter {
                if seen.insert(id.clone()) {
                    ids.push(id.clone());
                }
            }
        };
        match direction {
            Direction::Ascending => entries.for_each(|(_, set)| push(set, false)),
            Direction::Descending => entries.rev().for_each(|(_, set)| push(set, true)),
        }
        Ok(ids)
    }
}

/// Storage engine backed by process memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: DashMap<Collection, MemoryCollection>,
    open: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty, unopened backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }

    fn read<T>(
        &self,
        collection: Collection,
        f: impl FnOnce(&MemoryCollection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.ensure_open()?;
        let entry = self
            .collections
            .get(&collection)
            .ok_or(StorageError::UnknownCollection(collection))?;
        f(&entry)
    }

    fn write<T>(
        &self,
        collection: Collection,
        f: impl FnOnce(&mut MemoryCollection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.ensure_open()?;
        let mut entry = self
            .collections
            .get_mut(&collection)
            .ok_or(StorageError::UnknownCollection(collection))?;
        f(&mut entry)
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn open(&self, schema: &[CollectionSchema]) -> Result<(), StorageError> {
        for decl in schema {
            self.collections
                .entry(decl.collection)
                .and_modify(|c| c.extend_schema(decl))
                .or_insert_with(|| MemoryCollection::new(decl));
        }
        self.open.store(true, Ordering::Release);
        tracing::debug!(collections = schema.len(), "memory backend opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        self.read(collection, |c| Ok(c.rows.get(id).cloned()))
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, StorageError> {
        self.read(collection, |c| Ok(c.rows.values().cloned().collect()))
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<(), StorageError> {
        self.write(collection, |c| {
            c.put(id, record);
            Ok(())
        })
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StorageError> {
        self.write(collection, |c| Ok(c.delete(id)))
    }

    async fn clear(&self, collection: Collection) -> Result<usize, StorageError> {
        self.write(collection, |c| {
            let removed = c.rows.len();
            c.rows.clear();
            c.indexes.values_mut().for_each(BTreeMap::clear);
            Ok(removed)
        })
    }

    async fn count(&self, collection: Collection) -> Result<usize, StorageError> {
        self.read(collection, |c| Ok(c.rows.len()))
    }

    async fn query_index(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StorageError> {
        self.read(collection, |c| {
            let ids = c.scan(collection, index, &range, direction)?;
            Ok(ids
                .iter()
                .filter_map(|id| c.rows.get(id).cloned())
                .take(limit.unwrap_or(usize::MAX))
                .collect())
        })
    }

    async fn delete_index_range(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
    ) -> Result<usize, StorageError> {
        self.write(collection, |c| {
            let ids = c.scan(collection, index, &range, Direction::Ascending)?;
            Ok(ids.iter().filter(|id| c.delete(id)).count())
        })
    }
}
