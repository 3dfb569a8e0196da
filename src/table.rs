//! Primary-key document table.
//!
//! Owns the documents and the primary index (an ordered map keyed by `id`),
//! and keeps the secondary index manager transactionally consistent with it:
//! a write either lands in the primary index and every covering secondary
//! index, or in none of them.

use crate::index::{IndexDescriptor, IndexManager};
use crate::plan::Bounds;
use crate::types::{Document, OrderedValue, Result, StoreError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Default)]
pub struct DocumentTable {
    docs: BTreeMap<OrderedValue, Document>,
    indexes: IndexManager,
}

impl DocumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document under its `id`.
    ///
    /// Fails with `KeyMissing` when the document has no id and `KeyDuplicate`
    /// when the id is taken. A unique-index violation rolls the whole put
    /// back (document and all index entries) and surfaces the conflict.
    pub fn put(&mut self, doc: Document) -> Result<Value> {
        let id = doc.id().cloned().ok_or(StoreError::KeyMissing)?;
        let key = OrderedValue(id.clone());
        if self.docs.contains_key(&key) {
            return Err(StoreError::KeyDuplicate(id));
        }
        if let Err(err) = self.indexes.index_document(&doc, &id) {
            // index_document already undid its partial entries.
            return Err(err);
        }
        self.docs.insert(key, doc);
        Ok(id)
    }

    /// Remove a document and all its index entries. `None` if absent.
    pub fn remove(&mut self, id: &Value) -> Option<Document> {
        let doc = self.docs.remove(&OrderedValue(id.clone()))?;
        self.indexes.unindex_document(&doc, id);
        Some(doc)
    }

    pub fn get(&self, id: &Value) -> Option<&Document> {
        self.docs.get(&OrderedValue(id.clone()))
    }

    pub fn contains(&self, id: &Value) -> bool {
        self.docs.contains_key(&OrderedValue(id.clone()))
    }

    /// Ordered scan over the primary index. Absent bounds are unbounded;
    /// both present bounds are inclusive.
    pub fn range(&self, min: Option<&Value>, max: Option<&Value>) -> Vec<Document> {
        if let (Some(lo), Some(hi)) = (min, max) {
            // Inverted bounds mean an empty range; BTreeMap::range panics on them.
            if crate::types::value::compare_values(lo, hi) == std::cmp::Ordering::Greater {
                return Vec::new();
            }
        }
        let lower = min
            .map(|v| Bound::Included(OrderedValue(v.clone())))
            .unwrap_or(Bound::Unbounded);
        let upper = max
            .map(|v| Bound::Included(OrderedValue(v.clone())))
            .unwrap_or(Bound::Unbounded);
        self.docs
            .range((lower, upper))
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    /// Clear all storage and index structures, returning what was removed
    /// so the caller can emit delete events.
    pub fn clear(&mut self) -> Vec<Document> {
        let removed = std::mem::take(&mut self.docs)
            .into_values()
            .collect();
        self.indexes.clear_structures();
        removed
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Declare a secondary index, re-indexing every stored document.
    pub fn add_index(&mut self, descriptor: IndexDescriptor) -> Result<()> {
        self.indexes.add_index(descriptor, self.docs.values())
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        self.indexes.drop_index(name)
    }

    pub fn descriptors(&self) -> Vec<IndexDescriptor> {
        self.indexes.descriptors()
    }

    /// Candidate ids for a plan over the named secondary index.
    pub fn collect_ids(&self, index: &str, bounds: &[Bounds]) -> Vec<OrderedValue> {
        self.indexes.collect_ids(index, bounds)
    }
}
