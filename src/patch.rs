//! Patch documents consumed by `update`.
//!
//! Grammar: `{"$set": {field: value, ...}}` assigns dotted paths, creating
//! intermediate maps; `{"$unset": {field: null, ...}}` removes them. Unknown
//! top-level keys are an unsupported-operation error.

use crate::types::value::{insert_path, remove_path};
use crate::types::{Document, Result, StoreError};
use serde_json::Value;

/// Apply a patch to a document, producing a new document. The input document
/// is never mutated.
pub fn apply_patch(doc: &Document, patch: &Value) -> Result<Document> {
    let operations = patch.as_object().ok_or_else(|| {
        StoreError::UnsupportedType(format!("patch must be an object, got {patch}"))
    })?;

    let mut next = doc.as_value().clone();
    for (op, fields) in operations {
        let fields = fields.as_object().ok_or_else(|| {
            StoreError::UnsupportedType(format!("{op} expects an object of fields"))
        })?;
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    insert_path(&mut next, path, value.clone());
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    remove_path(&mut next, path);
                }
            }
            other => {
                return Err(StoreError::UnsupportedOperation(format!(
                    "unknown patch operator: {other}"
                )));
            }
        }
    }
    Document::new(next)
}
