//! Error types for the document store.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A write could not determine the document's primary key.
    ///
    /// Raised when an inserted document has no `id` field, or when an upsert
    /// could not synthesize one from the filter's equality constraints.
    #[error("document is missing a primary key")]
    KeyMissing,

    /// Insert of a primary key that already exists.
    #[error("duplicate primary key: {0}")]
    KeyDuplicate(serde_json::Value),

    /// A unique secondary index would hold more than one document id after
    /// the write. The write has been fully rolled back.
    #[error("unique index conflict on '{index}'")]
    IndexConflict { index: String },

    /// Unrecognized filter or patch operator.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A value that cannot be compared or navigated as required.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A multi-document write stopped part-way through. The first `applied`
    /// documents committed and are visible; the rest were not attempted.
    #[error("partial write: {applied} document(s) applied before failure: {source}")]
    PartialWrite {
        applied: u64,
        #[source]
        source: Box<StoreError>,
    },

    /// Cursor decode failure; local to the cursor, never affects the store.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// Wrap an error as a partial-write failure after `applied` commits.
    pub fn partial(applied: u64, source: StoreError) -> Self {
        StoreError::PartialWrite {
            applied,
            source: Box::new(source),
        }
    }
}
