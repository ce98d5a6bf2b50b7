//! Compiles declarative variant queries into sample index queries.
//!
//! The planner picks the samples to read, translates as many conditions as
//! possible into index filters, and records which conditions the index
//! answers exactly. Conditions it does not answer stay in the residual query
//! that is checked on the decoded variants.

mod annotation;
mod files;
mod regions;

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::index::codec;
use crate::index::schema::valid_genotype;
use crate::index::SampleIndexSchema;
use crate::query::genotype::{
    expand_genotypes, matches_genotype, parse_genotype_filter, Genotype, GenotypeClass,
    GenotypeFilter,
};
use crate::query::ops::{is_negated, remove_negation};
use crate::query::{self, QueryOperation, QueryParam, VariantQuery, VariantType};

use super::metadata::{IndexStatus, Metadata, SampleMetadata, StudyMetadata};
use super::query::{
    is_fully_covered_parent_filter, Coverage, ParentFilter, ParsedSampleIndexQuery,
    QueryCoverage, SampleIndexQuery,
};
use super::Error;

/// Whether the index holds the calls selected by one `genotype` entry.
fn is_indexable_genotype(gt: &str) -> bool {
    if is_negated(gt) {
        return false;
    }
    match gt.parse::<GenotypeClass>() {
        Ok(GenotypeClass::Het) | Ok(GenotypeClass::HomAlt) | Ok(GenotypeClass::MainAlt) => true,
        Ok(GenotypeClass::HomRef) | Ok(GenotypeClass::Miss) => false,
        Err(_) => valid_genotype(gt),
    }
}

/// Whether the index can select the samples of a genotype filter. Under OR
/// every sample needs indexed genotypes, otherwise one is enough.
fn is_indexable_filter(filter: &GenotypeFilter) -> bool {
    let mut valid = filter
        .samples
        .values()
        .map(|gts| gts.iter().all(|gt| is_indexable_genotype(gt)));
    match filter.operation {
        Some(QueryOperation::Or) => valid.all(|v| v),
        _ => valid.any(|v| v),
    }
}

/// Indexed genotypes of `loaded` that fail the genotype list `gts`.
///
/// Variants carrying one of them in the sample cannot match, so they are
/// subtracted from the result.
fn excluded_genotypes(gts: &[String], loaded: &[String]) -> Vec<String> {
    let (negated, plain): (Vec<&String>, Vec<&String>) = gts.iter().partition(|gt| is_negated(gt));
    loaded
        .iter()
        .filter(|gt| valid_genotype(gt))
        .filter(|gt| match gt.parse::<Genotype>() {
            Ok(parsed) => {
                negated.iter().any(|v| matches_genotype(v, &parsed))
                    || !plain.iter().any(|v| matches_genotype(v, &parsed))
            }
            Err(_) => false,
        })
        .cloned()
        .collect()
}

/// Parent codes standing for the calls of a genotype class.
fn class_codes(class: GenotypeClass) -> &'static [u8] {
    match class {
        GenotypeClass::HomRef => &[codec::HOM_REF_UNPHASED, codec::HOM_REF_PHASED, codec::HEMI_REF],
        GenotypeClass::Het => &[
            codec::HET_REF_UNPHASED,
            codec::HET_REF_01_PHASED,
            codec::HET_REF_10_PHASED,
            codec::MULTI_HET,
        ],
        GenotypeClass::HomAlt => &[
            codec::HOM_ALT_UNPHASED,
            codec::HOM_ALT_PHASED,
            codec::HEMI_ALT,
            codec::MULTI_HOM,
        ],
        GenotypeClass::Miss => &[codec::MISSING_HOM, codec::MISSING_HET],
        GenotypeClass::MainAlt => &[
            codec::HET_REF_UNPHASED,
            codec::HOM_ALT_UNPHASED,
            codec::HET_REF_01_PHASED,
            codec::HET_REF_10_PHASED,
            codec::HOM_ALT_PHASED,
            codec::HEMI_ALT,
            codec::MULTI_HET,
            codec::MISSING_HET,
        ],
    }
}

/// Parent codes of one genotype, ignoring phase.
fn genotype_codes(gt: &str) -> Vec<u8> {
    if let Ok(class) = gt.parse::<GenotypeClass>() {
        return class_codes(class).to_vec();
    }
    match codec::encode(gt) {
        codec::HOM_REF_UNPHASED | codec::HOM_REF_PHASED => {
            vec![codec::HOM_REF_UNPHASED, codec::HOM_REF_PHASED]
        }
        codec::HET_REF_UNPHASED | codec::HET_REF_01_PHASED | codec::HET_REF_10_PHASED => vec![
            codec::HET_REF_UNPHASED,
            codec::HET_REF_01_PHASED,
            codec::HET_REF_10_PHASED,
        ],
        codec::HOM_ALT_UNPHASED | codec::HOM_ALT_PHASED => {
            vec![codec::HOM_ALT_UNPHASED, codec::HOM_ALT_PHASED]
        }
        code => vec![code],
    }
}

/// Codes of a parent accepted by the parent's genotype list.
///
/// Returns `None` when the list has negated entries. Calls missing from a
/// record count as `0/0`, so a child with files the parent does not share
/// also accepts the unknown code.
fn parent_filter(
    child: &SampleMetadata,
    parent: &SampleMetadata,
    gts: &[String],
) -> Option<ParentFilter> {
    if gts.iter().any(|gt| is_negated(gt)) {
        return None;
    }
    let mut filter = [false; codec::NUM_CODES];
    for gt in gts {
        for code in genotype_codes(gt) {
            filter[code as usize] = true;
        }
    }
    if parent.multi_file {
        filter[codec::DISCREPANCY_SIMPLE as usize] = true;
        filter[codec::DISCREPANCY_ANY as usize] = true;
    }
    let shares_files = child.files.iter().all(|f| parent.files.contains(f));
    let accepts_ref = [
        codec::HOM_REF_UNPHASED,
        codec::HOM_REF_PHASED,
        codec::MISSING_HOM,
    ]
    .iter()
    .any(|code| filter[*code as usize]);
    if !shares_files && accepts_ref {
        filter[codec::UNKNOWN as usize] = true;
    }
    Some(filter)
}

/// Samples picked from the genotype conditions of a query.
#[derive(Debug, Default)]
struct SampleSelection {
    /// Param the samples were selected from.
    param: Option<QueryParam>,
    samples: IndexMap<String, Vec<String>>,
    negated: BTreeSet<String>,
    /// Parents whose condition is checked through the parent codes of their
    /// children.
    parents_in_query: BTreeSet<String>,
    fathers: IndexMap<String, ParentFilter>,
    mothers: IndexMap<String, ParentFilter>,
    mendelian: BTreeSet<String>,
    only_de_novo: bool,
    operation: Option<QueryOperation>,
    /// Whether the index answers the selecting param exactly.
    exact: bool,
    /// Whether the index returns a superset of the annotated variants.
    partial_index: bool,
}

impl SampleSelection {
    fn positive_samples(&self) -> Vec<&str> {
        self.samples
            .keys()
            .filter(|s| !self.negated.contains(*s))
            .map(String::as_str)
            .collect()
    }
}

/// Compiles `VariantQuery`s for the sample index of the studies in
/// `metadata`.
pub struct SampleIndexQueryParser<'a> {
    schema: Arc<SampleIndexSchema>,
    metadata: &'a Metadata,
}

impl<'a> SampleIndexQueryParser<'a> {
    pub fn new(schema: Arc<SampleIndexSchema>, metadata: &'a Metadata) -> Self {
        Self { schema, metadata }
    }

    /// Whether the sample index can answer `query` at all.
    ///
    /// The query needs positive sample conditions the index holds calls
    /// for, and no condition on variant identifiers.
    pub fn valid_sample_index_query(query: &VariantQuery) -> Result<bool, Error> {
        if query.is_valid(QueryParam::Id) || query.is_valid(QueryParam::Xref) {
            return Ok(false);
        }
        if let Some(value) = query.get(QueryParam::Genotype).filter(|v| !v.is_empty()) {
            if is_indexable_filter(&parse_genotype_filter(value)?) {
                return Ok(true);
            }
        }
        let samples = query.split_values(QueryParam::Sample)?;
        if samples.iter().any(|s| !is_negated(s)) {
            return Ok(true);
        }
        for param in [QueryParam::SampleMendelianError, QueryParam::SampleDeNovo] {
            let samples = query.split_values(param)?;
            if !samples.is_empty() && !samples.iter().any(|s| is_negated(s)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Compile `input`.
    ///
    /// # Errors
    ///
    /// `Error::NotIndexable` if the index cannot answer the query; errors on
    /// malformed values or samples unknown to the study.
    pub fn parse(&self, input: &VariantQuery) -> Result<ParsedSampleIndexQuery, Error> {
        if !Self::valid_sample_index_query(input)? {
            return Err(Error::NotIndexable(
                "no indexable sample condition".to_string(),
            ));
        }
        let study = self.metadata.default_study(input)?;
        let selection = self.select_samples(input, study)?;
        let positives = selection.positive_samples();
        if positives.is_empty() {
            return Err(Error::NotIndexable("no positive samples".to_string()));
        }
        tracing::debug!(
            "selected samples {:?} ({:?}), negated {:?}, parents {:?}",
            positives,
            selection.operation,
            selection.negated,
            selection.parents_in_query
        );

        let mut query = SampleIndexQuery::new(self.schema.clone(), &study.name);
        let (region_groups, mut coverage) = regions::plan_regions(input)?;
        query.regions = region_groups;
        let (variant_types, types_coverage) = self.plan_types(input)?;
        query.variant_types = variant_types;
        coverage.merge(types_coverage);

        let positive_files = positives
            .iter()
            .map(|s| study.sample(s))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flat_map(|meta| meta.files.iter())
            .collect::<BTreeSet<_>>();
        let mut partial_files = false;
        for sample in selection.negated.iter().chain(&selection.parents_in_query) {
            let meta = study.sample(sample)?;
            partial_files |= meta.files.iter().any(|f| !positive_files.contains(f));
        }
        let (file_filters, files_coverage) = files::FilesPlanner::new(
            self.schema.file_index(),
            study,
            partial_files,
        )
        .plan(input, &positives, selection.operation, &query.variant_types)?;
        query.file_filters = file_filters;
        coverage.merge(files_coverage);

        if let Some(param) = selection.param {
            let sample_data_covered = !input.is_valid(QueryParam::SampleData)
                || matches!(coverage.get(QueryParam::SampleData), Some(Coverage::Remove));
            if selection.exact && sample_data_covered {
                coverage.remove(param);
            }
        }

        let complete_index = self.complete_index(study, &selection)?;
        let (annotation, annotation_coverage) = annotation::AnnotationPlanner::new(
            self.schema.annotation_index(),
            complete_index,
        )
        .plan(input)?;
        query.annotation = annotation;
        coverage.merge(annotation_coverage);

        for sample in selection.samples.keys() {
            if study.sample(sample)?.multi_file {
                query.multi_file_samples.insert(sample.clone());
            }
        }
        query.samples = selection.samples;
        query.negated_samples = selection.negated;
        query.father_filters = selection.fathers;
        query.mother_filters = selection.mothers;
        query.mendelian_error_samples = selection.mendelian;
        query.only_de_novo = selection.only_de_novo;
        query.operation = selection.operation;

        let coverage = coverage.restrict_to(input);
        tracing::debug!("residual query: {:?}", coverage.apply(input));
        Ok(ParsedSampleIndexQuery {
            query,
            coverage,
            complete_index,
        })
    }

    /// Whether the annotation streams of all read samples are ready and no
    /// sample condition forces a superset.
    fn complete_index(
        &self,
        study: &StudyMetadata,
        selection: &SampleSelection,
    ) -> Result<bool, Error> {
        if !selection.negated.is_empty() || selection.partial_index {
            return Ok(false);
        }
        for sample in selection.positive_samples() {
            let status = study
                .sample(sample)?
                .annotation_status(study.sample_index_version);
            if status != IndexStatus::Ready {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn select_samples(
        &self,
        input: &VariantQuery,
        study: &StudyMetadata,
    ) -> Result<SampleSelection, Error> {
        let mut selection = SampleSelection {
            exact: true,
            ..Default::default()
        };
        if let Some(value) = input.get(QueryParam::Genotype).filter(|v| !v.is_empty()) {
            let filter = parse_genotype_filter(value)?;
            if is_indexable_filter(&filter) {
                selection.param = Some(QueryParam::Genotype);
                self.select_by_genotype(study, &filter, &mut selection)?;
                return Ok(selection);
            }
        }

        let loaded = study.loaded_genotypes();
        let main_alt = GenotypeClass::MainAlt
            .filter(&loaded)
            .into_iter()
            .filter(|gt| valid_genotype(gt))
            .collect::<Vec<_>>();
        let samples = input.split_values(QueryParam::Sample)?;
        if samples.iter().any(|s| !is_negated(s)) {
            selection.param = Some(QueryParam::Sample);
            selection.operation = samples.operation;
            for sample in samples.iter().filter(|s| !is_negated(s)) {
                study.sample(sample)?;
                selection.samples.insert(sample.clone(), main_alt.clone());
            }
            return Ok(selection);
        }

        for (param, only_de_novo) in [
            (QueryParam::SampleMendelianError, false),
            (QueryParam::SampleDeNovo, true),
        ] {
            let samples = input.split_values(param)?;
            if samples.is_empty() || samples.iter().any(|s| is_negated(s)) {
                continue;
            }
            for sample in samples.iter() {
                let meta = study.sample(sample)?;
                if meta.family_index != IndexStatus::Ready {
                    return Err(Error::NotIndexable(format!(
                        "family index of sample {} is not ready",
                        sample
                    )));
                }
                selection.samples.insert(sample.clone(), main_alt.clone());
                selection.mendelian.insert(sample.clone());
            }
            selection.param = Some(param);
            selection.operation = samples.operation;
            selection.only_de_novo = only_de_novo;
            selection.partial_index = true;
            return Ok(selection);
        }
        Ok(selection)
    }

    fn select_by_genotype(
        &self,
        study: &StudyMetadata,
        filter: &GenotypeFilter,
        selection: &mut SampleSelection,
    ) -> Result<(), Error> {
        let loaded = study.loaded_genotypes();
        let or = filter.operation == Some(QueryOperation::Or);
        selection.operation = filter.operation;

        let mut children = BTreeSet::new();
        let mut parents = BTreeSet::new();
        if !or {
            for (sample, gts) in &filter.samples {
                let meta = study.sample(sample)?;
                if meta.family_index != IndexStatus::Ready
                    || !gts.iter().all(|gt| is_indexable_genotype(gt))
                {
                    continue;
                }
                let in_filter = [&meta.father, &meta.mother]
                    .into_iter()
                    .flatten()
                    .filter(|p| filter.samples.contains_key(*p))
                    .cloned()
                    .collect::<Vec<_>>();
                if !in_filter.is_empty() {
                    children.insert(sample.clone());
                    parents.extend(in_filter);
                }
            }
        }

        for (sample, gts) in &filter.samples {
            let meta = study.sample(sample)?;
            if parents.contains(sample) && !children.contains(sample) {
                selection.parents_in_query.insert(sample.clone());
                continue;
            }
            let (negated, plain): (Vec<String>, Vec<String>) =
                gts.iter().cloned().partition(|gt| is_negated(gt));
            if plain.is_empty() {
                if or {
                    return Err(Error::NotIndexable(format!(
                        "sample {} only has negated genotypes",
                        sample
                    )));
                }
                let stripped = negated
                    .iter()
                    .map(|gt| remove_negation(gt).to_string())
                    .collect::<Vec<_>>();
                let expanded = expand_genotypes(&stripped, &loaded)?
                    .into_iter()
                    .filter(|gt| valid_genotype(gt))
                    .collect();
                selection.samples.insert(sample.clone(), expanded);
                selection.negated.insert(sample.clone());
                selection.exact = false;
                selection.partial_index = true;
                continue;
            }
            if !plain.iter().all(|gt| is_indexable_genotype(gt)) {
                if or {
                    return Err(Error::NotIndexable(format!(
                        "genotypes of sample {} are not indexed",
                        sample
                    )));
                }
                selection
                    .samples
                    .insert(sample.clone(), excluded_genotypes(gts, &loaded));
                selection.negated.insert(sample.clone());
                selection.exact = false;
                selection.partial_index = true;
                continue;
            }
            if !negated.is_empty() {
                selection.exact = false;
            }
            let expanded = expand_genotypes(&plain, &loaded)?
                .into_iter()
                .filter(|gt| valid_genotype(gt))
                .collect();
            selection.samples.insert(sample.clone(), expanded);

            if children.contains(sample) {
                for (parent, is_father) in [(&meta.father, true), (&meta.mother, false)] {
                    let (parent, parent_gts) = match parent
                        .as_ref()
                        .and_then(|p| filter.samples.get_key_value(p))
                    {
                        Some(found) => found,
                        None => continue,
                    };
                    match parent_filter(meta, study.sample(parent)?, parent_gts) {
                        Some(codes) => {
                            if !is_fully_covered_parent_filter(&codes) {
                                selection.exact = false;
                            }
                            let target = if is_father {
                                &mut selection.fathers
                            } else {
                                &mut selection.mothers
                            };
                            target.insert(sample.clone(), codes);
                        }
                        None => selection.exact = false,
                    }
                }
            }
        }
        Ok(())
    }

    /// Variant types as recorded by the index. `type` is answered unless it
    /// asks for copy number gains or losses alone.
    fn plan_types(&self, input: &VariantQuery) -> Result<(Vec<VariantType>, QueryCoverage), Error> {
        let requested = input
            .as_string_list(QueryParam::Type)
            .iter()
            .map(|t| {
                t.parse::<VariantType>()
                    .map_err(|_| query::Error::UnknownVariantType(t.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut coverage = QueryCoverage::default();
        if requested.is_empty() {
            return Ok((Vec::new(), coverage));
        }
        let mut types = requested.iter().map(VariantType::index_type).collect::<Vec<_>>();
        types.sort();
        types.dedup();
        let split_copy_number = !requested.contains(&VariantType::CopyNumber)
            && requested
                .iter()
                .any(|t| matches!(t, VariantType::CopyNumberGain | VariantType::CopyNumberLoss));
        if !split_copy_number {
            coverage.remove(QueryParam::Type);
        }
        Ok((types, coverage))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::sample_index::query::Coverage;

    fn metadata() -> Metadata {
        Metadata::default().with_study(
            StudyMetadata::new("study")
                .with_sample(
                    SampleMetadata::new("child")
                        .with_files(&["trio.vcf"])
                        .with_parents(Some("father"), Some("mother"))
                        .with_annotation_index(IndexStatus::Ready, 0),
                )
                .with_sample(
                    SampleMetadata::new("father")
                        .with_files(&["trio.vcf"])
                        .with_annotation_index(IndexStatus::Ready, 0),
                )
                .with_sample(
                    SampleMetadata::new("mother")
                        .with_files(&["trio.vcf"])
                        .with_annotation_index(IndexStatus::Ready, 0),
                )
                .with_sample(SampleMetadata::new("other").with_files(&["other.vcf"])),
        )
    }

    fn parse(query: &VariantQuery) -> Result<ParsedSampleIndexQuery, Error> {
        let metadata = metadata();
        SampleIndexQueryParser::new(Arc::new(SampleIndexSchema::default_schema()), &metadata)
            .parse(query)
    }

    #[rstest]
    #[case("0/1", true)]
    #[case("HET", true)]
    #[case("MAIN_ALT", true)]
    #[case("HOM_REF", false)]
    #[case("MISS", false)]
    #[case("0/0", false)]
    #[case("!0/1", false)]
    fn indexable_genotypes(#[case] gt: &str, #[case] expected: bool) {
        assert_eq!(is_indexable_genotype(gt), expected);
    }

    #[rstest]
    #[case(&[("genotype", "child:0/1")], true)]
    #[case(&[("genotype", "child:0/0")], false)]
    #[case(&[("genotype", "child:0/1,father:0/0")], false)]
    #[case(&[("genotype", "child:0/1;father:0/0")], true)]
    #[case(&[("genotype", "child:0/1"), ("id", "rs123")], false)]
    #[case(&[("sample", "child")], true)]
    #[case(&[("sample", "!child")], false)]
    #[case(&[("sampleDeNovo", "child")], true)]
    fn validity(#[case] pairs: &[(&str, &str)], #[case] expected: bool) -> Result<(), anyhow::Error> {
        let query = VariantQuery::from_pairs(pairs.iter().copied())?;
        assert_eq!(SampleIndexQueryParser::valid_sample_index_query(&query)?, expected);
        Ok(())
    }

    #[test]
    fn not_indexable() {
        let query = VariantQuery::default().with(QueryParam::Genotype, "child:HOM_REF");
        assert!(matches!(parse(&query), Err(Error::NotIndexable(_))));
    }

    #[test]
    fn trio_with_hom_ref_parents() -> Result<(), anyhow::Error> {
        let input = VariantQuery::default()
            .with(QueryParam::Genotype, "child:0/1;father:0/0;mother:0/0")
            .with(QueryParam::Type, "SNV");
        let parsed = parse(&input)?;
        let query = &parsed.query;
        assert_eq!(query.positive_samples(), vec!["child"]);
        assert_eq!(query.samples["child"], vec!["0/1", "0|1", "1|0"]);
        let father = query.father_filters["child"];
        let accepted = (0..codec::NUM_CODES)
            .filter(|c| father[*c])
            .collect::<Vec<_>>();
        assert_eq!(accepted, vec![0, 3]);
        assert_eq!(query.variant_types, vec![VariantType::Snv]);
        assert!(parsed.residual(&input).is_empty());
        assert!(parsed.complete_index);
        Ok(())
    }

    #[test]
    fn parent_in_other_file_is_unknown() -> Result<(), anyhow::Error> {
        let metadata = metadata();
        let study = metadata.default_study(&VariantQuery::default())?;
        let mut child = study.sample("child")?.clone();
        child.files.push("extra.vcf".into());
        let filter = parent_filter(&child, study.sample("father")?, &["HOM_REF".to_string()])
            .expect("no negation");
        assert!(filter[codec::UNKNOWN as usize]);
        assert!(filter[codec::HEMI_REF as usize]);
        assert!(!is_fully_covered_parent_filter(&filter));
        assert_eq!(
            parent_filter(&child, study.sample("father")?, &["!0/1".to_string()]),
            None
        );
        Ok(())
    }

    #[test]
    fn negated_sample_is_subtracted() -> Result<(), anyhow::Error> {
        let input =
            VariantQuery::default().with(QueryParam::Genotype, "child:0/1;other:!1/1");
        let parsed = parse(&input)?;
        assert_eq!(parsed.query.positive_samples(), vec!["child"]);
        assert!(parsed.query.negated_samples.contains("other"));
        assert_eq!(parsed.query.samples["other"], vec!["1/1", "1|1"]);
        assert!(!parsed.complete_index);
        assert_eq!(parsed.coverage.get(QueryParam::Genotype), None);
        Ok(())
    }

    #[rstest]
    #[case("child:0/1;other:0/0", vec!["0/1", "1/1", "0|1", "1|0", "1|1", "./1", "1/2", "0/2"])]
    #[case("child:0/1;other:HOM_REF", vec!["0/1", "1/1", "0|1", "1|0", "1|1", "./1", "1/2", "0/2"])]
    #[case("child:0/1;other:0/1,0/0", vec!["1/1", "1|1", "./1", "1/2", "0/2"])]
    #[case("child:0/1;other:MISS", vec!["0/1", "1/1", "0|1", "1|0", "1|1", "1/2", "0/2"])]
    fn unindexed_genotypes_are_subtracted(
        #[case] genotype: &str,
        #[case] expected: Vec<&str>,
    ) -> Result<(), anyhow::Error> {
        let input = VariantQuery::default().with(QueryParam::Genotype, genotype);
        let parsed = parse(&input)?;
        assert_eq!(parsed.query.positive_samples(), vec!["child"]);
        assert!(parsed.query.negated_samples.contains("other"));
        assert_eq!(parsed.query.samples["other"], expected);
        assert!(!parsed.complete_index);
        assert_eq!(parsed.residual(&input).get(QueryParam::Genotype), Some(genotype));
        Ok(())
    }

    #[test]
    fn or_with_negated_sample() {
        let input = VariantQuery::default().with(QueryParam::Genotype, "child:0/1,other:!1/1");
        assert!(matches!(parse(&input), Err(Error::NotIndexable(_))));
    }

    #[test]
    fn sample_param() -> Result<(), anyhow::Error> {
        let input = VariantQuery::default().with(QueryParam::Sample, "child,other");
        let parsed = parse(&input)?;
        assert_eq!(parsed.query.operation, Some(QueryOperation::Or));
        assert_eq!(parsed.query.positive_samples(), vec!["child", "other"]);
        assert!(!parsed.query.samples["child"].contains(&"0/2".to_string()));
        assert_eq!(parsed.coverage.get(QueryParam::Sample), Some(&Coverage::Remove));
        assert!(!parsed.complete_index, "other is not annotated");
        Ok(())
    }

    #[test]
    fn de_novo() -> Result<(), anyhow::Error> {
        let input = VariantQuery::default().with(QueryParam::SampleDeNovo, "child");
        let parsed = parse(&input)?;
        assert!(parsed.query.only_de_novo);
        assert!(parsed.query.mendelian_error_samples.contains("child"));
        assert!(!parsed.complete_index);
        assert!(parsed.residual(&input).is_empty());
        Ok(())
    }

    #[test]
    fn mendelian_needs_family_index() {
        let input = VariantQuery::default().with(QueryParam::SampleMendelianError, "father");
        assert!(matches!(parse(&input), Err(Error::NotIndexable(_))));
    }

    #[rstest]
    #[case("SNV,INDEL", vec![VariantType::Snv, VariantType::Indel], true)]
    #[case("COPY_NUMBER_GAIN", vec![VariantType::CopyNumber], false)]
    #[case("COPY_NUMBER,COPY_NUMBER_LOSS", vec![VariantType::CopyNumber], true)]
    fn types(
        #[case] value: &str,
        #[case] expected: Vec<VariantType>,
        #[case] covered: bool,
    ) -> Result<(), anyhow::Error> {
        let input = VariantQuery::default()
            .with(QueryParam::Genotype, "child:0/1")
            .with(QueryParam::Type, value);
        let parsed = parse(&input)?;
        assert_eq!(parsed.query.variant_types, expected);
        assert_eq!(parsed.residual(&input).get(QueryParam::Type).is_none(), covered);
        Ok(())
    }

    #[test]
    fn unknown_type() {
        let input = VariantQuery::default()
            .with(QueryParam::Genotype, "child:0/1")
            .with(QueryParam::Type, "FOO");
        assert_eq!(
            parse(&input).map(|_| ()),
            Err(Error::Query(query::Error::UnknownVariantType("FOO".into())))
        );
    }

    #[test]
    fn uncovered_sample_data_keeps_genotype() -> Result<(), anyhow::Error> {
        let input = VariantQuery::default()
            .with(QueryParam::Genotype, "child:0/1")
            .with(QueryParam::SampleData, "child:DP>12");
        let parsed = parse(&input)?;
        let residual = parsed.residual(&input);
        assert_eq!(residual.get(QueryParam::Genotype), Some("child:0/1"));
        assert_eq!(residual.get(QueryParam::SampleData), Some("child:DP>12"));
        Ok(())
    }
}
