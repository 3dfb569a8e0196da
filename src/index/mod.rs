//! Secondary index descriptors and the index manager.
//!
//! The manager maintains zero or more composite, optionally unique,
//! optionally partial indexes as nested ordered structures mirroring each
//! descriptor's declared key order. It stores document ids only; document
//! storage belongs to the table.

mod node;

pub use node::IndexNode;

use crate::filter::{matcher, Filter};
use crate::plan::Bounds;
use crate::types::{Document, OrderedValue, Result, StoreError};
use serde_json::Value;

/// Name of the implicit primary index over `id`.
pub const PRIMARY_INDEX: &str = "primary";

/// Declaration of a composite key, uniqueness, and optional partial
/// predicate. At most one descriptor exists per name; keys are non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    pub name: String,
    /// Dotted field paths, in index order.
    pub keys: Vec<String>,
    pub unique: bool,
    /// When present, only documents matching this predicate are indexed.
    pub partial: Option<Filter>,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            name: name.into(),
            keys,
            unique: false,
            partial: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn partial(mut self, predicate: Filter) -> Self {
        self.partial = Some(predicate);
        self
    }

    /// The implicit descriptor backing the primary index.
    pub fn primary() -> Self {
        IndexDescriptor::new(PRIMARY_INDEX, vec![crate::types::ID_FIELD.to_string()]).unique()
    }
}

/// One declared index: its descriptor plus the nested structure.
#[derive(Debug, Clone)]
struct SecondaryIndex {
    descriptor: IndexDescriptor,
    root: IndexNode,
}

impl SecondaryIndex {
    fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            root: IndexNode::root(),
        }
    }

    /// Whether the document belongs in this index at all.
    fn covers(&self, doc: &Document) -> bool {
        match &self.descriptor.partial {
            Some(predicate) => matcher::filter_matches(predicate, doc),
            None => true,
        }
    }

    /// Key chain for a document: one value per declared key, missing fields
    /// indexed as null so they still participate in ordering and uniqueness.
    fn key_chain(&self, doc: &Document) -> Vec<OrderedValue> {
        self.descriptor
            .keys
            .iter()
            .map(|key| OrderedValue(doc.get_path(key).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    fn insert(&mut self, doc: &Document, id: &Value) -> Result<()> {
        if !self.covers(doc) {
            return Ok(());
        }
        let chain = self.key_chain(doc);
        let leaf_len = self.root.insert(&chain, OrderedValue(id.clone()));
        if self.descriptor.unique && leaf_len > 1 {
            // Undo the entry before reporting so no partial state survives.
            self.root.remove(&chain, &OrderedValue(id.clone()));
            return Err(StoreError::IndexConflict {
                index: self.descriptor.name.clone(),
            });
        }
        Ok(())
    }

    fn remove(&mut self, doc: &Document, id: &Value) {
        if !self.covers(doc) {
            return;
        }
        let chain = self.key_chain(doc);
        self.root.remove(&chain, &OrderedValue(id.clone()));
    }
}

/// Maintains every declared secondary index, transactionally consistent with
/// the document table.
#[derive(Debug, Default)]
pub struct IndexManager {
    // Declaration order is the planner's tie-break order.
    indexes: Vec<SecondaryIndex>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an index, replacing any existing descriptor of the same name.
    ///
    /// The new structure is built over `docs` before anything is swapped in;
    /// a unique violation during the rebuild aborts and leaves the previous
    /// index set untouched.
    pub fn add_index<'a>(
        &mut self,
        descriptor: IndexDescriptor,
        docs: impl Iterator<Item = &'a Document>,
    ) -> Result<()> {
        if descriptor.keys.is_empty() {
            return Err(StoreError::UnsupportedOperation(format!(
                "index '{}' declares no keys",
                descriptor.name
            )));
        }
        if descriptor.name == PRIMARY_INDEX {
            return Err(StoreError::UnsupportedOperation(format!(
                "'{PRIMARY_INDEX}' is reserved for the primary index"
            )));
        }
        let mut index = SecondaryIndex::new(descriptor);
        for doc in docs {
            // Stored documents always carry an id; tolerate its absence here
            // rather than panic, the entry is simply skipped.
            if let Some(id) = doc.id().cloned() {
                index.insert(doc, &id)?;
            }
        }
        match self
            .indexes
            .iter()
            .position(|i| i.descriptor.name == index.descriptor.name)
        {
            Some(existing) => self.indexes[existing] = index,
            None => self.indexes.push(index),
        }
        Ok(())
    }

    /// Remove a descriptor and discard its structure.
    pub fn drop_index(&mut self, name: &str) -> bool {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.descriptor.name != name);
        self.indexes.len() < before
    }

    /// Add a document to every covering index. On a unique violation the
    /// entries already written are removed and the conflict is returned; the
    /// caller rolls back its own storage.
    pub fn index_document(&mut self, doc: &Document, id: &Value) -> Result<()> {
        for position in 0..self.indexes.len() {
            if let Err(err) = self.indexes[position].insert(doc, id) {
                for earlier in &mut self.indexes[..position] {
                    earlier.remove(doc, id);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Remove a document from every covering index, pruning empty levels.
    pub fn unindex_document(&mut self, doc: &Document, id: &Value) {
        for index in &mut self.indexes {
            index.remove(doc, id);
        }
    }

    /// Declared descriptors, in declaration order.
    pub fn descriptors(&self) -> Vec<IndexDescriptor> {
        self.indexes.iter().map(|i| i.descriptor.clone()).collect()
    }

    /// Candidate ids for a bounds chain over the named index, in key order.
    pub fn collect_ids(&self, name: &str, bounds: &[Bounds]) -> Vec<OrderedValue> {
        let mut out = Vec::new();
        if let Some(index) = self.indexes.iter().find(|i| i.descriptor.name == name) {
            index.root.collect(bounds, &mut out);
        }
        out
    }

    /// Discard every index structure but keep the descriptors.
    pub fn clear_structures(&mut self) {
        for index in &mut self.indexes {
            index.root = IndexNode::root();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::new(value).unwrap()
    }

    fn indexed(manager: &IndexManager, name: &str) -> Vec<serde_json::Value> {
        manager
            .collect_ids(name, &[])
            .into_iter()
            .map(|v| v.0)
            .collect()
    }

    #[test]
    fn test_add_index_rebuilds_existing_documents() {
        let docs = vec![
            doc(json!({"id": 1, "name": "b"})),
            doc(json!({"id": 2, "name": "a"})),
        ];
        let mut manager = IndexManager::new();
        manager
            .add_index(IndexDescriptor::new("by_name", vec!["name".into()]), docs.iter())
            .unwrap();

        // Ordered by name, not by id.
        assert_eq!(indexed(&manager, "by_name"), vec![json!(2), json!(1)]);
    }

    #[test]
    fn test_unique_violation_during_rebuild_keeps_previous_indexes() {
        let docs = vec![
            doc(json!({"id": 1, "name": "same"})),
            doc(json!({"id": 2, "name": "same"})),
        ];
        let mut manager = IndexManager::new();
        manager
            .add_index(IndexDescriptor::new("by_id", vec!["id".into()]), docs.iter())
            .unwrap();

        let err = manager
            .add_index(
                IndexDescriptor::new("by_name", vec!["name".into()]).unique(),
                docs.iter(),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexConflict { .. }));

        assert_eq!(manager.descriptors().len(), 1);
        assert_eq!(indexed(&manager, "by_id").len(), 2);
    }

    #[test]
    fn test_unique_conflict_rolls_back_all_entries() {
        let mut manager = IndexManager::new();
        manager
            .add_index(
                IndexDescriptor::new("by_name", vec!["name".into()]),
                std::iter::empty(),
            )
            .unwrap();
        manager
            .add_index(
                IndexDescriptor::new("unique_email", vec!["email".into()]).unique(),
                std::iter::empty(),
            )
            .unwrap();

        let first = doc(json!({"id": 1, "name": "a", "email": "x@y"}));
        manager.index_document(&first, &json!(1)).unwrap();

        let second = doc(json!({"id": 2, "name": "b", "email": "x@y"}));
        let err = manager.index_document(&second, &json!(2)).unwrap_err();
        assert!(matches!(err, StoreError::IndexConflict { index } if index == "unique_email"));

        // The non-unique index written before the conflict was undone too.
        assert_eq!(indexed(&manager, "by_name"), vec![json!(1)]);
        assert_eq!(indexed(&manager, "unique_email"), vec![json!(1)]);
    }

    #[test]
    fn test_partial_index_skips_non_matching_documents() {
        let mut manager = IndexManager::new();
        manager
            .add_index(
                IndexDescriptor::new("active_names", vec!["name".into()])
                    .partial(Filter::field("status").eq(json!("active"))),
                std::iter::empty(),
            )
            .unwrap();

        let active = doc(json!({"id": 1, "name": "a", "status": "active"}));
        let idle = doc(json!({"id": 2, "name": "b", "status": "idle"}));
        manager.index_document(&active, &json!(1)).unwrap();
        manager.index_document(&idle, &json!(2)).unwrap();

        assert_eq!(indexed(&manager, "active_names"), vec![json!(1)]);
    }

    #[test]
    fn test_replace_descriptor_same_name() {
        let docs = vec![doc(json!({"id": 1, "name": "a", "age": 9}))];
        let mut manager = IndexManager::new();
        manager
            .add_index(IndexDescriptor::new("idx", vec!["name".into()]), docs.iter())
            .unwrap();
        manager
            .add_index(IndexDescriptor::new("idx", vec!["age".into()]), docs.iter())
            .unwrap();

        let descriptors = manager.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].keys, vec!["age".to_string()]);
    }

    #[test]
    fn test_missing_key_indexes_as_null() {
        let mut manager = IndexManager::new();
        manager
            .add_index(
                IndexDescriptor::new("by_name", vec!["name".into()]),
                std::iter::empty(),
            )
            .unwrap();
        let nameless = doc(json!({"id": 1}));
        manager.index_document(&nameless, &json!(1)).unwrap();
        assert_eq!(indexed(&manager, "by_name"), vec![json!(1)]);
    }

    #[test]
    fn test_reserved_and_empty_descriptors_rejected() {
        let mut manager = IndexManager::new();
        assert!(matches!(
            manager.add_index(IndexDescriptor::new("idx", vec![]), std::iter::empty()),
            Err(StoreError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            manager.add_index(
                IndexDescriptor::new(PRIMARY_INDEX, vec!["id".into()]),
                std::iter::empty()
            ),
            Err(StoreError::UnsupportedOperation(_))
        ));
    }
}
