use crate::query::variant::ClinicalAssertion;
use crate::query::Variant;

use super::{values_match, LocalFilter};

/// Determine whether the `Variant` passes the clinical filters.
///
/// Source, significance, and confirmed status must hold on the same
/// assertion. Records without annotation are not tested.
pub fn passes(filter: &LocalFilter, variant: &Variant) -> bool {
    let annotation = match &variant.annotation {
        Some(annotation) => annotation,
        None => return true,
    };
    if filter.clinical_sources.is_empty()
        && filter.clinical_significances.is_empty()
        && !filter.clinical_confirmed
    {
        return true;
    }
    let assertions = annotation
        .clinical
        .iter()
        .filter(|a| !filter.clinical_confirmed || a.confirmed)
        .collect::<Vec<_>>();
    let by_significance = assertions
        .iter()
        .copied()
        .filter(|a| matches_any(&filter.clinical_significances, |v| is_significance(a, v)))
        .collect::<Vec<_>>();
    let by_source = assertions
        .iter()
        .copied()
        .filter(|a| matches_any(&filter.clinical_sources, |v| a.source == v))
        .collect::<Vec<_>>();
    let pass = !assertions.is_empty()
        && values_match(&filter.clinical_sources, &by_significance, |a, v| a.source == v)
        && values_match(&filter.clinical_significances, &by_source, |a, v| {
            is_significance(a, v)
        });
    if !pass {
        tracing::trace!("variant {} fails clinical filter", variant);
    }
    pass
}

fn is_significance(assertion: &ClinicalAssertion, value: &str) -> bool {
    assertion.significance.as_deref() == Some(value)
}

/// Whether any value of a list matches; an empty list matches.
fn matches_any<F: Fn(&str) -> bool>(values: &crate::query::Values<String>, f: F) -> bool {
    values.is_empty() || values.iter().any(|v| f(v))
}
