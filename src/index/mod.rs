//! Index fields, their filters, and the sample index schema.

pub mod annotation;
pub mod bits;
pub mod codec;
pub mod config;
pub mod field;
pub mod filter;
pub mod schema;

pub use bits::BitBuffer;
pub use config::SampleIndexConfiguration;
pub use field::IndexField;
pub use filter::IndexFieldFilter;
pub use schema::SampleIndexSchema;

/// Errors of the index layer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Read or write beyond the end of a bit buffer.
    #[error("bit range {offset}+{length} out of bounds for buffer of {bits} bits")]
    OutOfBounds {
        offset: usize,
        length: usize,
        bits: usize,
    },
    /// Field configuration that cannot be laid out.
    #[error("invalid index field configuration for {key}: {reason}")]
    InvalidField { key: String, reason: String },
    /// Operand that the field cannot interpret.
    #[error("invalid operand for index field {key}: {value}")]
    InvalidOperand { key: String, value: String },
    /// Stream that ends early or holds invalid data.
    #[error("malformed index stream: {0}")]
    Malformed(String),
    /// Problem with the query vocabulary.
    #[error(transparent)]
    Query(#[from] crate::query::Error),
}
