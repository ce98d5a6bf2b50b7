use crate::query::{QueryOperation, Variant};

use super::{compare_numbers, LocalFilter};

/// Determine whether the `Variant` passes the population frequency filter.
///
/// Populations missing from the annotation have frequency 0. Records without
/// annotation are not tested.
pub fn passes(filter: &LocalFilter, variant: &Variant) -> bool {
    let annotation = match &variant.annotation {
        Some(annotation) => annotation,
        None => return true,
    };
    if filter.population_frequencies.is_empty() {
        return true;
    }
    let mut results = filter.population_frequencies.iter().map(|kov| {
        let expected = match kov.value.parse::<f64>() {
            Ok(value) => value,
            Err(_) => return false,
        };
        let actual = annotation
            .population_frequencies
            .get(&kov.key)
            .copied()
            .unwrap_or(0.0);
        compare_numbers(kov.op, actual, expected)
    });
    let pass = match filter.population_frequencies.operation {
        Some(QueryOperation::Or) => results.any(|r| r),
        _ => results.all(|r| r),
    };
    if !pass {
        tracing::trace!(
            "variant {} fails population frequency filter {:?}",
            variant,
            &filter.population_frequencies
        );
    }
    pass
}
