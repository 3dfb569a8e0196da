//! Cursor over query results.
//!
//! A cursor owns its result set, detached from the store's locks: iterating
//! or decoding never touches live storage, and decode failures stay local to
//! the cursor.

use crate::types::{Document, Result, StoreError};
use serde::de::DeserializeOwned;

pub struct Cursor {
    remaining: std::vec::IntoIter<Document>,
    current: Option<Document>,
}

impl Cursor {
    pub(crate) fn new(docs: Vec<Document>) -> Self {
        Self {
            remaining: docs.into_iter(),
            current: None,
        }
    }

    /// Advance to the next document. `false` once exhausted.
    pub fn next(&mut self) -> bool {
        self.current = self.remaining.next();
        self.current.is_some()
    }

    /// Deserialize the current document into a caller type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let doc = self.current.as_ref().ok_or_else(|| {
            StoreError::UnsupportedOperation(
                "cursor is not positioned on a document".to_string(),
            )
        })?;
        Ok(serde_json::from_value(doc.as_value().clone())?)
    }

    /// The current document without deserializing.
    pub fn document(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    /// Drain every remaining document (including the current one, if any)
    /// into a caller type.
    pub fn all<T: DeserializeOwned>(&mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        if let Some(doc) = self.current.take() {
            out.push(serde_json::from_value(doc.into_value())?);
        }
        for doc in self.remaining.by_ref() {
            out.push(serde_json::from_value(doc.into_value())?);
        }
        Ok(out)
    }

    /// Documents not yet visited.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Release the result set.
    pub fn close(self) {}
}
