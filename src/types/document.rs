//! Document and change-event data structures.

use crate::types::error::{Result, StoreError};
use crate::types::value::lookup_path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding a document's primary key.
pub const ID_FIELD: &str = "id";

/// A stored record: an object with a mandatory unique `id` field plus
/// arbitrary caller-defined fields, possibly nested.
///
/// Documents are immutable once stored; a mutation replaces the stored
/// document with a new value sharing no state with the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    /// Wrap a JSON value as a document. Fails unless the value is an object.
    pub fn new(value: Value) -> Result<Self> {
        if value.is_object() {
            Ok(Document(value))
        } else {
            Err(StoreError::UnsupportedType(format!(
                "document must be an object, got {value}"
            )))
        }
    }

    /// The primary key, if present.
    pub fn id(&self) -> Option<&Value> {
        self.0.get(ID_FIELD)
    }

    /// Value at a dotted field path.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.0, path)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl TryFrom<Value> for Document {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self> {
        Document::new(value)
    }
}

/// Mutation kind carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// Produced exactly once per committed mutation and delivered to every
/// subscriber whose filter matches the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub operation: Operation,
    pub document: Document,
}

impl ChangeEvent {
    pub fn new(operation: Operation, document: Document) -> Self {
        Self {
            operation,
            document,
        }
    }
}
