//! Annotation conditions translated into summary bits and annotation index
//! filters.

use std::collections::BTreeSet;

use crate::index::config::CONFIRMED_SUFFIX;
use crate::index::schema::{
    summary, AnnotationIndexSchema, CUSTOM_LOF, CUSTOM_LOFE_EXTRA, INTERGENIC_VARIANT, MISSENSE,
    NON_GENIC_TERMS, PROTEIN_CODING,
};
use crate::index::IndexFieldFilter;
use crate::query::ops::{is_negated, parse_key_op_value, FilterOp, KeyOpValue};
use crate::query::param::SKIP_GENE_REGIONS;
use crate::query::{self, QueryOperation, QueryParam, Values, VariantQuery};
use crate::sample_index::query::{
    CombinationFilter, PopulationFrequencyFilter, QueryCoverage, SampleAnnotationIndexQuery,
};
use crate::sample_index::Error;

/// Upper bound of the `POP_FREQ_ANY_001` summary bit.
const POP_FREQ_001: f64 = 0.01;

fn is_set(values: &Values<String>, terms: &[&str]) -> bool {
    let values = values.iter().map(String::as_str).collect::<BTreeSet<_>>();
    let terms = terms.iter().copied().collect::<BTreeSet<_>>();
    values == terms
}

fn custom_lofe() -> Vec<&'static str> {
    CUSTOM_LOF.iter().chain(CUSTOM_LOFE_EXTRA).copied().collect()
}

fn is_single(values: &Values<String>, term: &str) -> bool {
    values.len() == 1 && values.values[0] == term
}

/// Plans the annotation part of a query.
pub(super) struct AnnotationPlanner<'a> {
    schema: &'a AnnotationIndexSchema,
    /// Whether all queried samples carry annotation streams, so that filters
    /// over them may replace query conditions.
    complete: bool,
}

impl<'a> AnnotationPlanner<'a> {
    pub fn new(schema: &'a AnnotationIndexSchema, complete: bool) -> Self {
        Self { schema, complete }
    }

    /// Annotation query for `input` and the conditions it answers.
    pub fn plan(
        &self,
        input: &VariantQuery,
    ) -> Result<(SampleAnnotationIndexQuery, QueryCoverage), Error> {
        let mut result = SampleAnnotationIndexQuery::empty(self.schema);
        let mut coverage = QueryCoverage::default();
        self.plan_consequences(input, &mut coverage, &mut result)?;
        self.plan_clinical(input, &mut coverage, &mut result)?;
        self.plan_population_frequency(input, &mut coverage, &mut result)?;
        tracing::debug!(
            "annotation summary mask={:#010b} value={:#010b}",
            result.summary_mask,
            result.summary_value
        );
        Ok((result, coverage))
    }

    fn plan_consequences(
        &self,
        input: &VariantQuery,
        coverage: &mut QueryCoverage,
        result: &mut SampleAnnotationIndexQuery,
    ) -> Result<(), Error> {
        let has_gene = input.is_valid(QueryParam::Gene);
        let has_regions = input.is_valid(QueryParam::Region)
            || input
                .get(QueryParam::GeneRegions)
                .map_or(false, |v| !v.is_empty() && v != SKIP_GENE_REGIONS);
        let cts = input.split_values(QueryParam::ConsequenceType)?;
        let bts = input.split_values(QueryParam::Biotype)?;
        let tfs = input.split_values(QueryParam::TranscriptFlag)?;
        let negated = [&cts, &bts, &tfs]
            .iter()
            .any(|values| values.iter().any(|v| is_negated(v)));

        let mut intergenic = (has_gene && !has_regions).then_some(false);
        let mut summary_bits = 0u8;
        if !negated {
            if !cts.is_empty() {
                if cts.iter().all(|ct| !NON_GENIC_TERMS.contains(&ct.as_str())) {
                    intergenic = Some(false);
                } else if is_single(&cts, INTERGENIC_VARIANT) && intergenic.is_none() {
                    intergenic = Some(true);
                }
                if cts.iter().all(|ct| CUSTOM_LOF.contains(&ct.as_str())) {
                    summary_bits |= summary::CUSTOM_LOF;
                } else if cts.iter().all(|ct| {
                    CUSTOM_LOF.contains(&ct.as_str()) || CUSTOM_LOFE_EXTRA.contains(&ct.as_str())
                }) {
                    summary_bits |= summary::CUSTOM_LOFE;
                    if is_single(&bts, PROTEIN_CODING) {
                        summary_bits |= summary::CUSTOM_LOFE_PROTEIN_CODING;
                    }
                }
                if is_single(&cts, MISSENSE) {
                    summary_bits |= summary::MISSENSE;
                }
            }
            if !bts.is_empty() || !tfs.is_empty() {
                intergenic = Some(false);
            }
            if is_single(&bts, PROTEIN_CODING) {
                summary_bits |= summary::PROTEIN_CODING;
            }
        }
        if let Some(value) = input.get(QueryParam::ProteinSubstitution) {
            if !value.is_empty() && !value.contains("<<") && !value.contains(">>") {
                summary_bits |= summary::CUSTOM_LOFE;
            }
        }
        result.summary_mask |= summary_bits;
        result.summary_value |= summary_bits;
        if let Some(intergenic) = intergenic {
            result.summary_mask |= summary::INTERGENIC;
            if intergenic {
                result.summary_value |= summary::INTERGENIC;
            }
        }

        if negated || intergenic != Some(false) {
            return Ok(());
        }
        let dimensions = [&cts, &bts, &tfs].iter().filter(|v| !v.is_empty()).count();
        let coverable = self.complete && !has_gene;

        if coverable && dimensions == 1 && cts.operation != Some(QueryOperation::And) {
            if is_set(&cts, CUSTOM_LOF)
                || is_set(&cts, &custom_lofe())
                || is_single(&cts, MISSENSE)
            {
                coverage.remove(QueryParam::ConsequenceType);
            }
            if is_single(&bts, PROTEIN_CODING) {
                coverage.remove(QueryParam::Biotype);
            }
        }
        if coverable && tfs.is_empty() && is_single(&bts, PROTEIN_CODING) {
            if cts.operation != Some(QueryOperation::And) && is_set(&cts, &custom_lofe()) {
                coverage.remove(QueryParam::ConsequenceType);
                coverage.remove(QueryParam::Biotype);
            }
        }

        let build = |field: &crate::index::IndexField, values: &Values<String>| {
            if values.is_empty() {
                Ok(field.no_op_filter(false))
            } else {
                field.build_filter_values(FilterOp::Eq, values)
            }
        };
        result.consequence_type = build(self.schema.consequence_type(), &cts)?;
        result.biotype = build(self.schema.biotype(), &bts)?;
        result.transcript_flag = build(self.schema.transcript_flag(), &tfs)?;

        if coverable && dimensions == 1 {
            for (param, filter) in [
                (QueryParam::ConsequenceType, &result.consequence_type),
                (QueryParam::Biotype, &result.biotype),
                (QueryParam::TranscriptFlag, &result.transcript_flag),
            ] {
                if !filter.is_no_op() && filter.is_exact() {
                    coverage.remove(param);
                }
            }
        }

        let no_and = [&cts, &bts, &tfs]
            .iter()
            .all(|v| v.operation != Some(QueryOperation::And));
        if self.schema.transcript_combination()
            && !result.consequence_type.is_no_op()
            && no_and
            && (!bts.is_empty() || !tfs.is_empty())
        {
            let combination = CombinationFilter {
                consequence_type: result.consequence_type.clone(),
                biotype: (!bts.is_empty()).then(|| result.biotype.clone()),
                transcript_flag: (!tfs.is_empty()).then(|| result.transcript_flag.clone()),
            };
            let other = match (&combination.biotype, &combination.transcript_flag) {
                (Some(bt), None) => Some((QueryParam::Biotype, bt)),
                (None, Some(tf)) => Some((QueryParam::TranscriptFlag, tf)),
                _ => None,
            };
            if let Some((param, filter)) = other {
                if coverable && combination.consequence_type.is_exact() && filter.is_exact() {
                    coverage.remove(QueryParam::ConsequenceType);
                    coverage.remove(param);
                }
            }
            result.combination = Some(combination);
        }
        Ok(())
    }

    fn plan_clinical(
        &self,
        input: &VariantQuery,
        coverage: &mut QueryCoverage,
        result: &mut SampleAnnotationIndexQuery,
    ) -> Result<(), Error> {
        let sources = input.split_values(QueryParam::Clinical)?;
        let significances = input.split_values(QueryParam::ClinicalSignificance)?;
        let confirmed = input
            .get(QueryParam::ClinicalConfirmedStatus)
            .map_or(false, |v| v.eq_ignore_ascii_case("true"));
        if sources.is_empty() && significances.is_empty() && !confirmed {
            return Ok(());
        }
        result.summary_mask |= summary::CLINICAL;
        result.summary_value |= summary::CLINICAL;

        if sources.iter().chain(significances.iter()).any(|v| is_negated(v))
            || significances.iter().any(|v| v.ends_with(CONFIRMED_SUFFIX))
        {
            return Ok(());
        }
        let filter = if !sources.is_empty() && significances.is_empty() && !confirmed {
            self.schema
                .clinical_source()
                .build_filter_values(FilterOp::Eq, &sources)?
        } else if sources.is_empty() && !significances.is_empty() {
            let values = if confirmed {
                significances.map(|s| format!("{}{}", s, CONFIRMED_SUFFIX))
            } else {
                significances
            };
            self.schema
                .clinical_significance()
                .build_filter_values(FilterOp::Eq, &values)?
        } else {
            return Ok(());
        };
        if filter.is_no_op() || !filter.is_exact() {
            return Ok(());
        }
        if self.complete {
            coverage.remove(QueryParam::Clinical);
            coverage.remove(QueryParam::ClinicalSignificance);
            coverage.remove(QueryParam::ClinicalConfirmedStatus);
        }
        result.clinical.push(filter);
        Ok(())
    }

    fn plan_population_frequency(
        &self,
        input: &VariantQuery,
        coverage: &mut QueryCoverage,
        result: &mut SampleAnnotationIndexQuery,
    ) -> Result<(), Error> {
        let values = input.split_values(QueryParam::PopulationFrequencyAlt)?;
        if values.is_empty() {
            return Ok(());
        }
        let mut kovs = Vec::with_capacity(values.len());
        for value in values.iter() {
            let kov = parse_key_op_value(value)?;
            let number = kov.value.parse::<f64>().map_err(|_| query::Error::InvalidNumber {
                param: QueryParam::PopulationFrequencyAlt.to_string(),
                value: value.clone(),
            })?;
            kovs.push((kov, number));
        }
        let any_below_001 = self.schema.any_below_001();
        let below = |kov: &KeyOpValue| matches!(kov.op, FilterOp::Lt | FilterOp::LtLt);
        let qualifies = |(kov, number): &(KeyOpValue, f64)| {
            any_below_001.contains(&kov.key) && below(kov) && *number <= POP_FREQ_001
        };

        if values.operation == Some(QueryOperation::Or) {
            if kovs.iter().all(qualifies) {
                result.summary_mask |= summary::POP_FREQ_ANY_001;
                result.summary_value |= summary::POP_FREQ_ANY_001;
                let keys = kovs.iter().map(|(kov, _)| kov.key.as_str()).collect::<BTreeSet<_>>();
                let summary_keys = any_below_001.iter().map(String::as_str).collect::<BTreeSet<_>>();
                if keys == summary_keys
                    && kovs
                        .iter()
                        .all(|(_, number)| (number - POP_FREQ_001).abs() < f64::EPSILON)
                {
                    if self.complete {
                        coverage.remove(QueryParam::PopulationFrequencyAlt);
                    }
                    return Ok(());
                }
            }
            let mut filters = Vec::new();
            let mut partial = false;
            let mut exact = true;
            for (kov, _) in &kovs {
                match self.schema.population_frequency(&kov.key) {
                    Some(field) => {
                        let filter = field.build_filter(kov.op, &kov.value)?;
                        exact &= filter.is_exact();
                        filters.push(filter);
                    }
                    None => partial = true,
                }
            }
            if exact && !partial && self.complete {
                coverage.remove(QueryParam::PopulationFrequencyAlt);
            }
            result.population_frequency = PopulationFrequencyFilter::Or { filters, partial };
        } else {
            if kovs.iter().any(qualifies) {
                result.summary_mask |= summary::POP_FREQ_ANY_001;
                result.summary_value |= summary::POP_FREQ_ANY_001;
            }
            let mut filters: Vec<IndexFieldFilter> = Vec::new();
            let mut uncovered = Vec::new();
            for (value, (kov, _)) in values.iter().zip(&kovs) {
                match self.schema.population_frequency(&kov.key) {
                    Some(field) => {
                        let filter = field.build_filter(kov.op, &kov.value)?;
                        if !filter.is_exact() {
                            uncovered.push(value.clone());
                        }
                        filters.push(filter);
                    }
                    None => uncovered.push(value.clone()),
                }
            }
            if self.complete && uncovered.len() < kovs.len() {
                if uncovered.is_empty() {
                    coverage.remove(QueryParam::PopulationFrequencyAlt);
                } else {
                    let operation = (uncovered.len() > 1).then_some(QueryOperation::And);
                    coverage.replace(
                        QueryParam::PopulationFrequencyAlt,
                        Values::new(operation, uncovered).to_query_string(),
                    );
                }
            }
            result.population_frequency = PopulationFrequencyFilter::And(filters);
        }
        Ok(())
    }
}
