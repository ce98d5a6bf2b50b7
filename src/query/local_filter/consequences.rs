use crate::query::variant::ConsequenceType;
use crate::query::{Values, Variant};

use super::{values_match, LocalFilter};

/// One dimension of the per-transcript consequence filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    ConsequenceType,
    Biotype,
    TranscriptFlag,
}

const DIMENSIONS: [Dimension; 3] = [
    Dimension::ConsequenceType,
    Dimension::Biotype,
    Dimension::TranscriptFlag,
];

fn has_value(dimension: Dimension, ct: &ConsequenceType, value: &str) -> bool {
    match dimension {
        Dimension::ConsequenceType => ct.so_terms.iter().any(|t| t == value),
        Dimension::Biotype => ct.biotype.as_deref() == Some(value),
        Dimension::TranscriptFlag => ct.flags.iter().any(|f| f == value),
    }
}

fn values_of(filter: &LocalFilter, dimension: Dimension) -> &Values<String> {
    match dimension {
        Dimension::ConsequenceType => &filter.consequence_types,
        Dimension::Biotype => &filter.biotypes,
        Dimension::TranscriptFlag => &filter.transcript_flags,
    }
}

/// Determine whether the `Variant` passes the consequence type, biotype, and
/// transcript flag filters.
///
/// The dimensions must hold on the same transcript: each queried dimension is
/// tested against the transcripts that match any value of every other queried
/// dimension. Records without annotation are not tested.
pub fn passes(filter: &LocalFilter, variant: &Variant) -> bool {
    let annotation = match &variant.annotation {
        Some(annotation) => annotation,
        None => return true,
    };
    if filter.protein_substitution && !annotation.protein_substitution {
        tracing::trace!("variant {} has no protein substitution score", variant);
        return false;
    }
    for dimension in DIMENSIONS {
        let values = values_of(filter, dimension);
        if values.is_empty() {
            continue;
        }
        let transcripts = annotation
            .consequence_types
            .iter()
            .filter(|ct| {
                DIMENSIONS.iter().all(|other| {
                    let other_values = values_of(filter, *other);
                    *other == dimension
                        || other_values.is_empty()
                        || other_values.iter().any(|v| has_value(*other, ct, v))
                })
            })
            .collect::<Vec<_>>();
        if !values_match(values, &transcripts, |ct, v| has_value(dimension, ct, v)) {
            tracing::trace!(
                "variant {} fails {:?} filter {:?}",
                variant,
                dimension,
                values
            );
            return false;
        }
    }
    true
}
