//! Per-sample variant index: entries, their builder, the query planner, and
//! the entry evaluator.

pub mod builder;
pub mod cli;
pub mod entry;
pub mod filter;
pub mod metadata;
pub mod parser;
pub mod query;
pub mod store;

/// Errors of the sample index layer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Entry stream that could not be decoded.
    #[error("corrupt sample index of {sample} at {cursor}")]
    CorruptIndex {
        sample: String,
        cursor: String,
        #[source]
        source: crate::index::Error,
    },
    /// Sample not known to the study.
    #[error("unknown sample {sample} in study {study}")]
    UnknownSample { study: String, sample: String },
    /// Study not known to the metadata.
    #[error("unknown study: {0}")]
    UnknownStudy(String),
    /// No study given and no default study to fall back to.
    #[error("no study given and the metadata holds {0} studies")]
    MissingStudy(usize),
    /// Query that the sample index cannot answer.
    #[error("query can not be answered by the sample index: {0}")]
    NotIndexable(String),
    /// Problem with index fields or buffers.
    #[error(transparent)]
    Index(#[from] crate::index::Error),
    /// Problem with the query.
    #[error(transparent)]
    Query(#[from] crate::query::Error),
}
