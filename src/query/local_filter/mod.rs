//! Apply a `VariantQuery` to single decoded `Variant` records.
//!
//! This is the plain re-implementation of the query semantics that results of
//! the sample index are checked against, and the local predicate of the
//! breakend executor. Parameters that need data outside of the variant record
//! (`sampleMendelianError`, `sampleDeNovo`) and projections are not evaluated.

mod clinical;
mod consequences;
mod frequency;
mod genotype;
mod quality;
mod regions;

use super::genotype::{parse_genotype_filter, GenotypeFilter};
use super::ops::{self, parse_key_op_value, parse_key_values, FilterOp, KeyOpValue};
use super::param::SKIP_GENE_REGIONS;
use super::{Error, ParsedKeyValues, QueryOperation, QueryParam, Region, Values, Variant};
use super::{VariantQuery, VariantType};

/// Compiled form of one `VariantQuery` for record-by-record evaluation.
#[derive(Debug, Clone, Default)]
pub struct LocalFilter {
    regions: Vec<Region>,
    gene_regions: Vec<Region>,
    genes: Vec<String>,
    ids: Vec<String>,
    types: Vec<VariantType>,
    genotypes: Option<GenotypeFilter>,
    samples: Values<String>,
    sample_data: ParsedKeyValues,
    files: Values<String>,
    file_data: ParsedKeyValues,
    filter: Values<String>,
    qual: Option<(FilterOp, String)>,
    consequence_types: Values<String>,
    biotypes: Values<String>,
    transcript_flags: Values<String>,
    population_frequencies: Values<KeyOpValue>,
    clinical_sources: Values<String>,
    clinical_significances: Values<String>,
    clinical_confirmed: bool,
    protein_substitution: bool,
}

impl LocalFilter {
    /// Compile `query`.
    ///
    /// # Errors
    ///
    /// Fails on values that do not follow the query grammar.
    pub fn new(query: &VariantQuery) -> Result<Self, Error> {
        let mut result = LocalFilter::default();
        if let Some(value) = query.get(QueryParam::Region) {
            result.regions = Region::parse_regions(value)?;
        }
        match query.get(QueryParam::GeneRegions) {
            Some(SKIP_GENE_REGIONS) | None => (),
            Some(value) => result.gene_regions = Region::parse_regions(value)?,
        }
        result.genes = query.as_string_list(QueryParam::Gene);
        result.ids = query.as_string_list(QueryParam::Id);
        result.ids.extend(query.as_string_list(QueryParam::Xref));
        result.types = query
            .as_string_list(QueryParam::Type)
            .iter()
            .map(|t| {
                t.parse::<VariantType>()
                    .map_err(|_| Error::UnknownVariantType(t.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(value) = query.get(QueryParam::Genotype).filter(|v| !v.is_empty()) {
            result.genotypes = Some(parse_genotype_filter(value)?);
        }
        result.samples = query.split_values(QueryParam::Sample)?;
        if let Some(value) = query.get(QueryParam::SampleData) {
            result.sample_data = parse_key_values(QueryParam::SampleData.as_ref(), value)?;
        }
        result.files = query.split_values(QueryParam::File)?;
        if let Some(value) = query.get(QueryParam::FileData) {
            result.file_data = parse_key_values(QueryParam::FileData.as_ref(), value)?;
        }
        result.filter = query.split_values(QueryParam::Filter)?;
        if let Some(value) = query.get(QueryParam::Qual).filter(|v| !v.is_empty()) {
            result.qual = Some(ops::parse_op_value(value)?);
        }
        result.consequence_types = query.split_values(QueryParam::ConsequenceType)?;
        result.biotypes = query.split_values(QueryParam::Biotype)?;
        result.transcript_flags = query.split_values(QueryParam::TranscriptFlag)?;
        let frequencies = query.split_values(QueryParam::PopulationFrequencyAlt)?;
        result.population_frequencies = Values::new(
            frequencies.operation,
            frequencies
                .iter()
                .map(|v| parse_key_op_value(v))
                .collect::<Result<Vec<_>, _>>()?,
        );
        result.clinical_sources = query.split_values(QueryParam::Clinical)?;
        result.clinical_significances = query.split_values(QueryParam::ClinicalSignificance)?;
        result.clinical_confirmed = query
            .get(QueryParam::ClinicalConfirmedStatus)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        result.protein_substitution = query.is_valid(QueryParam::ProteinSubstitution);
        Ok(result)
    }

    /// Determine whether `variant` passes all criteria.
    pub fn passes(&self, variant: &Variant) -> bool {
        let pass_all = regions::passes(self, variant)
            && genotype::passes(self, variant)
            && quality::passes(self, variant)
            && consequences::passes(self, variant)
            && frequency::passes(self, variant)
            && clinical::passes(self, variant);
        if !pass_all {
            tracing::trace!("variant {} fails local filter", variant);
        }
        pass_all
    }
}

/// Test the query values against a set of items.
///
/// With AND every value must be found on some item; otherwise any value on
/// any item is enough. Negated values (`!x`) must not be found on any item.
fn values_match<T, F>(values: &Values<String>, items: &[T], has: F) -> bool
where
    F: Fn(&T, &str) -> bool,
{
    let (negated, plain): (Vec<&String>, Vec<&String>) =
        values.iter().partition(|v| ops::is_negated(v));
    let found = |value: &str| items.iter().any(|item| has(item, value));
    if negated
        .iter()
        .any(|v| found(ops::remove_negation(v.as_str())))
    {
        return false;
    }
    if plain.is_empty() {
        return true;
    }
    match values.operation {
        Some(QueryOperation::And) => plain.iter().all(|v| found(v)),
        _ => plain.iter().any(|v| found(v)),
    }
}

/// Compare an optional record value against a query operand.
///
/// Values are compared as numbers when both sides parse, as strings
/// otherwise. Missing values only pass the `<<` and `>>` operators.
fn compare(op: FilterOp, actual: Option<&str>, expected: &str) -> bool {
    let actual = match actual {
        Some(a) if !a.is_empty() && a != "." => a,
        _ => return matches!(op, FilterOp::LtLt | FilterOp::GtGt),
    };
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(e)) => compare_numbers(op, a, e),
        _ => match op {
            FilterOp::Eq => actual == expected,
            FilterOp::NotEq => actual != expected,
            _ => false,
        },
    }
}

fn compare_numbers(op: FilterOp, actual: f64, expected: f64) -> bool {
    match op {
        FilterOp::Eq => actual == expected,
        FilterOp::NotEq => actual != expected,
        FilterOp::Lt | FilterOp::LtLt => actual < expected,
        FilterOp::Le => actual <= expected,
        FilterOp::Gt | FilterOp::GtGt => actual > expected,
        FilterOp::Ge => actual >= expected,
    }
}
