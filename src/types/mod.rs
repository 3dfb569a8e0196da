//! Core data types: documents, change events, errors, and the value order.

mod document;
mod error;
pub mod value;

pub use document::{ChangeEvent, Document, Operation, ID_FIELD};
pub use error::{Result, StoreError};
pub use value::OrderedValue;
