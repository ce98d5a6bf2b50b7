//! Declarative variant query: parameter vocabulary, value grammar, and the
//! variant model the queries are evaluated against.

pub mod genotype;
pub mod local_filter;
pub mod ops;
pub mod param;
pub mod region;
pub mod variant;

pub use ops::{KeyOpValue, KeyValues, ParsedKeyValues, QueryOperation, Values};
pub use param::{QueryParam, VariantQuery};
pub use region::Region;
pub use variant::{Variant, VariantType};

/// Errors raised while parsing declarative queries.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Query parameter name that is not part of the vocabulary.
    #[error("unknown query parameter: {0}")]
    UnknownParam(String),
    /// Both `,` and `;` used at the same nesting level.
    #[error("value of {param} mixes AND (;) and OR (,) operators: {value}")]
    MixedOperators { param: String, value: String },
    /// Malformed `key<op>value` expression.
    #[error("invalid key-op-value expression: {0}")]
    InvalidKeyOpValue(String),
    /// Malformed region string.
    #[error("invalid region: {0}")]
    InvalidRegion(String),
    /// Malformed genotype filter.
    #[error("invalid genotype filter: {0}")]
    InvalidGenotype(String),
    /// Variant type name that is not known.
    #[error("unknown variant type: {0}")]
    UnknownVariantType(String),
    /// Numeric operand that cannot be parsed.
    #[error("invalid number in {param}: {value}")]
    InvalidNumber { param: String, value: String },
    /// Malformed file or sample data filter.
    #[error("invalid key-values filter: {0}")]
    InvalidKeyValues(String),
}
