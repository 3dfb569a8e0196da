//! Store façade: the public insert/update/delete/find/watch/index surface.
//!
//! Composes the document table, index manager, planner, matcher, and change
//! stream multiplexer. Mutations take an exclusive lock over the table (and
//! its indexes) for their duration; reads take a shared lock. Events are
//! published per affected document while the exclusive lock is still held,
//! after the mutation is visible to subsequent reads; publish itself never
//! blocks on subscribers.

use crate::config::StoreConfig;
use crate::cursor::Cursor;
use crate::filter::{matcher, Filter};
use crate::index::{IndexDescriptor, PRIMARY_INDEX};
use crate::patch::apply_patch;
use crate::plan::{self, SelectedPlan};
use crate::stream::{ChangeStreams, Subscription};
use crate::table::DocumentTable;
use crate::types::value::{compare_values, lookup_path};
use crate::types::{ChangeEvent, Document, Operation, Result, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sort direction for [`FindOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Options for [`Store::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Documents to skip before collecting results.
    pub skip: usize,
    /// Dotted field paths with direction, applied in order.
    pub sort: Vec<(String, SortOrder)>,
}

impl FindOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn sort_by(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((path.into(), order));
        self
    }
}

/// Options for [`Store::update`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Insert a document synthesized from the filter's equality constraints
    /// plus the patch when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Contract shared by this engine and network-backed adapters, so external
/// code can substitute one for the other.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, docs: Vec<Value>) -> Result<Vec<Value>>;
    async fn update(&self, filter: Option<Filter>, patch: Value, options: UpdateOptions)
        -> Result<u64>;
    async fn delete(&self, filter: Option<Filter>) -> Result<u64>;
    async fn find(&self, filter: Option<Filter>, options: FindOptions) -> Result<Cursor>;
    async fn watch(&self, filter: Option<Filter>) -> Result<Subscription>;
    async fn indexes(&self) -> Result<Vec<IndexDescriptor>>;
    async fn index(&self, descriptor: IndexDescriptor) -> Result<()>;
    async fn unindex(&self, name: &str) -> Result<bool>;
}

/// Embedded in-process document store.
///
/// Cheap to clone; clones share storage and subscriptions.
#[derive(Clone, Default)]
pub struct Store {
    table: Arc<RwLock<DocumentTable>>,
    streams: ChangeStreams,
    config: StoreConfig,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            table: Arc::new(RwLock::new(DocumentTable::new())),
            streams: ChangeStreams::new(),
            config,
        }
    }

    /// Insert one document. Returns its primary key.
    pub async fn insert(&self, doc: Value) -> Result<Value> {
        let doc = Document::new(doc)?;
        let mut table = self.table.write().await;
        let id = table.put(doc.clone())?;
        tracing::debug!(id = %id, "document inserted");
        self.streams
            .publish(&ChangeEvent::new(Operation::Insert, doc));
        Ok(id)
    }

    /// Insert several documents, each atomic on its own. A failure part-way
    /// commits nothing further and surfaces as a partial write; the
    /// documents already inserted stay visible.
    pub async fn insert_many(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        let mut table = self.table.write().await;
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc = match Document::new(doc) {
                Ok(doc) => doc,
                Err(err) => return Err(StoreError::partial(ids.len() as u64, err)),
            };
            match table.put(doc.clone()) {
                Ok(id) => {
                    self.streams
                        .publish(&ChangeEvent::new(Operation::Insert, doc));
                    ids.push(id);
                }
                Err(err) => return Err(StoreError::partial(ids.len() as u64, err)),
            }
        }
        tracing::debug!(count = ids.len(), "documents inserted");
        Ok(ids)
    }

    /// Apply a `$set`/`$unset` patch to every matching document; with
    /// `upsert`, insert a synthesized document when nothing matches.
    /// Returns the number of documents written.
    pub async fn update(
        &self,
        filter: Option<Filter>,
        patch: Value,
        options: UpdateOptions,
    ) -> Result<u64> {
        let mut table = self.table.write().await;
        let matched = run_query(&table, filter.as_ref());

        if matched.is_empty() {
            if !options.upsert {
                return Ok(0);
            }
            let equalities = plan::extract_equalities(filter.as_ref())?;
            let seed = Document::new(plan::seed_document(&equalities))?;
            let doc = apply_patch(&seed, &patch)?;
            if doc.id().is_none() {
                return Err(StoreError::KeyMissing);
            }
            table.put(doc.clone())?;
            tracing::debug!(id = ?doc.id(), "document upserted");
            self.streams
                .publish(&ChangeEvent::new(Operation::Insert, doc));
            return Ok(1);
        }

        let mut updated: u64 = 0;
        for old in matched {
            let new_doc = match apply_patch(&old, &patch) {
                Ok(doc) => doc,
                Err(err) => return Err(StoreError::partial(updated, err)),
            };
            let id = old.id().cloned().ok_or(StoreError::KeyMissing)?;
            let removed = table
                .remove(&id)
                .ok_or_else(|| StoreError::partial(updated, StoreError::KeyMissing))?;
            if let Err(err) = table.put(new_doc.clone()) {
                // Replacement failed (duplicate new id or index conflict);
                // restore the original document before surfacing the error.
                if let Err(restore) = table.put(removed) {
                    tracing::warn!(id = %id, error = %restore, "failed to restore document after rejected update");
                }
                return Err(StoreError::partial(updated, err));
            }
            updated += 1;
            self.streams
                .publish(&ChangeEvent::new(Operation::Update, new_doc));
        }
        tracing::debug!(count = updated, "documents updated");
        Ok(updated)
    }

    /// Delete every matching document. Returns the number removed.
    pub async fn delete(&self, filter: Option<Filter>) -> Result<u64> {
        let mut table = self.table.write().await;
        let matched = run_query(&table, filter.as_ref());
        let mut deleted: u64 = 0;
        for doc in matched {
            let Some(id) = doc.id().cloned() else { continue };
            if let Some(removed) = table.remove(&id) {
                deleted += 1;
                self.streams
                    .publish(&ChangeEvent::new(Operation::Delete, removed));
            }
        }
        tracing::debug!(count = deleted, "documents deleted");
        Ok(deleted)
    }

    /// Remove everything, emitting a delete event per document.
    pub async fn clear(&self) -> Result<u64> {
        let mut table = self.table.write().await;
        let removed = table.clear();
        let count = removed.len() as u64;
        for doc in removed {
            self.streams
                .publish(&ChangeEvent::new(Operation::Delete, doc));
        }
        tracing::debug!(count, "store cleared");
        Ok(count)
    }

    /// Query matching documents. Uses the best single-index range plan the
    /// filter allows, falling back to a full primary scan; every candidate is
    /// re-confirmed by the predicate matcher.
    pub async fn find(&self, filter: Option<Filter>, options: FindOptions) -> Result<Cursor> {
        let table = self.table.read().await;
        let mut docs = run_query(&table, filter.as_ref());
        drop(table);

        if !options.sort.is_empty() {
            docs.sort_by(|a, b| {
                for (path, order) in &options.sort {
                    let left = lookup_path(a.as_value(), path).unwrap_or(&Value::Null);
                    let right = lookup_path(b.as_value(), path).unwrap_or(&Value::Null);
                    let mut ord = compare_values(left, right);
                    if *order == SortOrder::Desc {
                        ord = ord.reverse();
                    }
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let docs: Vec<Document> = docs
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(Cursor::new(docs))
    }

    /// Subscribe to change events matching a filter. Events for every
    /// subsequent committed mutation arrive in commit order; a slow consumer
    /// never stalls writers or other subscribers.
    pub async fn watch(&self, filter: Option<Filter>) -> Subscription {
        self.streams
            .subscribe(filter, self.config.watch_queue_capacity)
    }

    /// Declare a secondary index over already-stored and future documents.
    pub async fn index(&self, descriptor: IndexDescriptor) -> Result<()> {
        let mut table = self.table.write().await;
        let name = descriptor.name.clone();
        table.add_index(descriptor)?;
        tracing::debug!(index = %name, "index declared");
        Ok(())
    }

    /// Drop a secondary index by name.
    pub async fn unindex(&self, name: &str) -> bool {
        let mut table = self.table.write().await;
        let dropped = table.drop_index(name);
        if dropped {
            tracing::debug!(index = %name, "index dropped");
        }
        dropped
    }

    /// Declared secondary indexes, in declaration order.
    pub async fn indexes(&self) -> Vec<IndexDescriptor> {
        self.table.read().await.descriptors()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }
}

/// Plan-or-scan, then confirm each candidate with the matcher. Holding at
/// least a shared lock is the caller's responsibility (it passes the guard's
/// target in).
fn run_query(table: &DocumentTable, filter: Option<&Filter>) -> Vec<Document> {
    let mut descriptors = vec![IndexDescriptor::primary()];
    descriptors.extend(table.descriptors());

    let candidates = match plan::select_plan(&descriptors, filter) {
        Some(SelectedPlan { index, bounds }) if index == PRIMARY_INDEX => {
            table.range(bounds[0].min.as_ref(), bounds[0].max.as_ref())
        }
        Some(SelectedPlan { index, bounds }) => table
            .collect_ids(&index, &bounds)
            .into_iter()
            .filter_map(|id| table.get(&id.0).cloned())
            .collect(),
        None => table.range(None, None),
    };

    candidates
        .into_iter()
        .filter(|doc| matcher::matches(filter, doc))
        .collect()
}

#[async_trait]
impl DocumentStore for Store {
    async fn insert(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        Store::insert_many(self, docs).await
    }

    async fn update(
        &self,
        filter: Option<Filter>,
        patch: Value,
        options: UpdateOptions,
    ) -> Result<u64> {
        Store::update(self, filter, patch, options).await
    }

    async fn delete(&self, filter: Option<Filter>) -> Result<u64> {
        Store::delete(self, filter).await
    }

    async fn find(&self, filter: Option<Filter>, options: FindOptions) -> Result<Cursor> {
        Store::find(self, filter, options).await
    }

    async fn watch(&self, filter: Option<Filter>) -> Result<Subscription> {
        Ok(Store::watch(self, filter).await)
    }

    async fn indexes(&self) -> Result<Vec<IndexDescriptor>> {
        Ok(Store::indexes(self).await)
    }

    async fn index(&self, descriptor: IndexDescriptor) -> Result<()> {
        Store::index(self, descriptor).await
    }

    async fn unindex(&self, name: &str) -> Result<bool> {
        Ok(Store::unindex(self, name).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_docs(docs: Vec<Value>) -> Store {
        let store = Store::new();
        store.insert_many(docs).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let store = Store::new();
        let doc = json!({"id": "d1", "name": "ann", "age": 30});
        store.insert(doc.clone()).await.unwrap();

        let mut cursor = store
            .find(Some(Filter::field("id").eq(json!("d1"))), FindOptions::default())
            .await
            .unwrap();
        assert!(cursor.next());
        let found: Value = cursor.decode().unwrap();
        assert_eq!(found, doc);
        assert!(!cursor.next());
    }

    #[tokio::test]
    async fn test_insert_many_partial_failure() {
        let store = Store::new();
        let err = store
            .insert_many(vec![
                json!({"id": 1}),
                json!({"id": 2}),
                json!({"id": 1}),
                json!({"id": 3}),
            ])
            .await
            .unwrap_err();
        match err {
            StoreError::PartialWrite { applied, source } => {
                assert_eq!(applied, 2);
                assert!(matches!(*source, StoreError::KeyDuplicate(_)));
            }
            other => panic!("expected PartialWrite, got {other:?}"),
        }
        // First two documents stayed committed.
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let store = store_with_docs(vec![
            json!({"id": 1, "status": "new"}),
            json!({"id": 2, "status": "new"}),
            json!({"id": 3, "status": "done"}),
        ])
        .await;

        let count = store
            .update(
                Some(Filter::field("status").eq(json!("new"))),
                json!({"$set": {"status": "done"}}),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(count, 2);

        let mut cursor = store
            .find(Some(Filter::field("status").eq(json!("done"))), FindOptions::default())
            .await
            .unwrap();
        let rows: Vec<Value> = cursor.all().unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_update_without_match_is_noop_without_upsert() {
        let store = Store::new();
        let count = store
            .update(
                Some(Filter::field("id").eq(json!(1))),
                json!({"$set": {"name": "a"}}),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_upsert_synthesizes_from_equalities() {
        let store = Store::new();
        let count = store
            .update(
                Some(Filter::field("id").eq(json!("X"))),
                json!({"$set": {"name": "a"}}),
                UpdateOptions::upsert(),
            )
            .await
            .unwrap();
        assert_eq!(count, 1);

        let mut cursor = store.find(None, FindOptions::default()).await.unwrap();
        let rows: Vec<Value> = cursor.all().unwrap();
        assert_eq!(rows, vec![json!({"id": "X", "name": "a"})]);
    }

    #[tokio::test]
    async fn test_upsert_rejects_inexpressible_filter() {
        let store = Store::new();
        let err = store
            .update(
                Some(Filter::field("age").gt(json!(3))),
                json!({"$set": {"name": "a"}}),
                UpdateOptions::upsert(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_upsert_without_id_fails() {
        let store = Store::new();
        let err = store
            .update(
                Some(Filter::field("name").eq(json!("a"))),
                json!({"$set": {"age": 3}}),
                UpdateOptions::upsert(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyMissing));
    }

    #[tokio::test]
    async fn test_update_restores_document_when_replacement_rejected() {
        let store = store_with_docs(vec![
            json!({"id": 1, "name": "a"}),
            json!({"id": 2, "name": "b"}),
        ])
        .await;

        // Patching id 1 to id 2 collides with the existing document.
        let err = store
            .update(
                Some(Filter::field("id").eq(json!(1))),
                json!({"$set": {"id": 2}}),
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PartialWrite { applied: 0, .. }));

        // Original document restored untouched.
        let mut cursor = store
            .find(Some(Filter::field("id").eq(json!(1))), FindOptions::default())
            .await
            .unwrap();
        assert!(cursor.next());
        let doc: Value = cursor.decode().unwrap();
        assert_eq!(doc, json!({"id": 1, "name": "a"}));
    }

    #[tokio::test]
    async fn test_delete_by_filter() {
        let store = store_with_docs(vec![
            json!({"id": 1, "kind": "x"}),
            json!({"id": 2, "kind": "y"}),
            json!({"id": 3, "kind": "x"}),
        ])
        .await;

        let deleted = store
            .delete(Some(Filter::field("kind").eq(json!("x"))))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_sort_skip_limit() {
        let store = store_with_docs(vec![
            json!({"id": 1, "age": 30}),
            json!({"id": 2, "age": 10}),
            json!({"id": 3, "age": 20}),
            json!({"id": 4}),
        ])
        .await;

        let mut cursor = store
            .find(
                None,
                FindOptions::default()
                    .sort_by("age", SortOrder::Desc)
                    .skip(1)
                    .limit(2),
            )
            .await
            .unwrap();
        let rows: Vec<Value> = cursor.all().unwrap();
        // Descending by age: 30, 20, 10, missing(null). Skip 1, take 2.
        assert_eq!(rows[0]["id"], json!(3));
        assert_eq!(rows[1]["id"], json!(2));
    }

    #[tokio::test]
    async fn test_range_query_over_secondary_index() {
        let store = Store::new();
        store
            .index(IndexDescriptor::new("by_version", vec!["version".into()]))
            .await
            .unwrap();
        for version in 1..=10 {
            store
                .insert(json!({"id": version, "version": version}))
                .await
                .unwrap();
        }

        let mut cursor = store
            .find(
                Some(Filter::field("version").gte(json!(5))),
                FindOptions::default(),
            )
            .await
            .unwrap();
        let rows: Vec<Value> = cursor.all().unwrap();
        assert_eq!(rows.len(), 6);
        let versions: Vec<u64> = rows.iter().map(|r| r["version"].as_u64().unwrap()).collect();
        assert_eq!(versions, vec![5, 6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_primary_index_serves_id_queries() {
        let store = store_with_docs(vec![
            json!({"id": 1}),
            json!({"id": 2}),
            json!({"id": 3}),
        ])
        .await;

        let mut cursor = store
            .find(
                Some(Filter::field("id").gte(json!(2))),
                FindOptions::default(),
            )
            .await
            .unwrap();
        let rows: Vec<Value> = cursor.all().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_index_listing_and_drop() {
        let store = Store::new();
        store
            .index(IndexDescriptor::new("by_name", vec!["name".into()]).unique())
            .await
            .unwrap();

        let indexes = store.indexes().await;
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "by_name");
        assert!(indexes[0].unique);

        assert!(store.unindex("by_name").await);
        assert!(!store.unindex("by_name").await);
        assert!(store.indexes().await.is_empty());
    }

    #[tokio::test]
    async fn test_unique_index_conflict_keeps_count() {
        let store = Store::new();
        store
            .index(IndexDescriptor::new("by_name", vec!["name".into()]).unique())
            .await
            .unwrap();
        store.insert(json!({"id": 1, "name": "same"})).await.unwrap();

        let before = store.len().await;
        let err = store.insert(json!({"id": 2, "name": "same"})).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexConflict { .. }));
        assert_eq!(store.len().await, before);
    }

    #[tokio::test]
    async fn test_clear_emits_delete_events() {
        let store = store_with_docs(vec![json!({"id": 1}), json!({"id": 2})]).await;
        let mut sub = store.watch(None).await;

        let removed = store.clear().await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty().await);

        for _ in 0..2 {
            let event = sub.recv().await.unwrap();
            assert_eq!(event.operation, Operation::Delete);
        }
    }
}
