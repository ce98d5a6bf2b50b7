//! Compiled sample index queries as produced by the planner.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::index::annotation::{test_combination, AnnotationIndexEntry};
use crate::index::codec::{is_ambiguous_code, NUM_CODES};
use crate::index::schema::{summary, AnnotationIndexSchema};
use crate::index::{self, BitBuffer, IndexFieldFilter, SampleIndexSchema};
use crate::query::{QueryOperation, QueryParam, Region, VariantQuery, VariantType};

/// Accepted genotype codes of a parent, indexed by code.
pub type ParentFilter = [bool; NUM_CODES];

/// Whether a parent filter only accepts codes standing for one genotype.
pub fn is_fully_covered_parent_filter(filter: &ParentFilter) -> bool {
    filter
        .iter()
        .enumerate()
        .all(|(code, accepted)| !accepted || !is_ambiguous_code(code))
}

/// Filters over the file index entries of one sample.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SampleFileIndexQuery {
    pub sample: String,
    pub filters: Vec<IndexFieldFilter>,
}

impl SampleFileIndexQuery {
    pub fn new(sample: impl Into<String>, filters: Vec<IndexFieldFilter>) -> Self {
        Self {
            sample: sample.into(),
            filters: filters.into_iter().filter(|f| !f.is_no_op()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether one file index entry passes all filters.
    pub fn passes(&self, entry: &BitBuffer) -> Result<bool, index::Error> {
        for filter in &self.filters {
            if !filter.read_and_test(entry)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// File level filter of one sample.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub enum FileQueryShape {
    /// No file level condition.
    #[default]
    Empty,
    /// One query that any file entry of the variant must pass.
    Single(SampleFileIndexQuery),
    /// One query per file of a split `fileData` filter.
    Split {
        operation: QueryOperation,
        queries: Vec<SampleFileIndexQuery>,
    },
}

impl FileQueryShape {
    pub fn is_empty(&self) -> bool {
        match self {
            FileQueryShape::Empty => true,
            FileQueryShape::Single(query) => query.is_empty(),
            FileQueryShape::Split { queries, .. } => queries.iter().all(|q| q.is_empty()),
        }
    }

    /// Test the file entries of one variant.
    ///
    /// With AND every sub-query has to be passed by some entry; the entries
    /// may differ per sub-query.
    pub fn passes(&self, entries: &[BitBuffer]) -> Result<bool, index::Error> {
        match self {
            FileQueryShape::Empty => Ok(true),
            FileQueryShape::Single(query) => {
                for entry in entries {
                    if query.passes(entry)? {
                        return Ok(true);
                    }
                }
                Ok(query.is_empty())
            }
            FileQueryShape::Split {
                operation: QueryOperation::Or,
                queries,
            } => {
                for entry in entries {
                    for query in queries {
                        if query.passes(entry)? {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            FileQueryShape::Split {
                operation: QueryOperation::And,
                queries,
            } => {
                let mut passed = vec![false; queries.len()];
                for entry in entries {
                    for (i, query) in queries.iter().enumerate() {
                        if !passed[i] && query.passes(entry)? {
                            passed[i] = true;
                        }
                    }
                    if passed.iter().all(|p| *p) {
                        return Ok(true);
                    }
                }
                Ok(passed.iter().all(|p| *p))
            }
        }
    }
}

/// Population frequency part of the annotation query.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub enum PopulationFrequencyFilter {
    #[default]
    NoOp,
    /// Every filter must pass.
    And(Vec<IndexFieldFilter>),
    /// Any filter must pass; `partial` if some population of the query is
    /// not indexed and may satisfy the query on its own.
    Or {
        filters: Vec<IndexFieldFilter>,
        partial: bool,
    },
}

impl PopulationFrequencyFilter {
    pub fn is_no_op(&self) -> bool {
        match self {
            PopulationFrequencyFilter::NoOp => true,
            PopulationFrequencyFilter::And(filters) => filters.is_empty(),
            PopulationFrequencyFilter::Or { filters, partial } => filters.is_empty() || *partial,
        }
    }

    /// Test the packed population frequency codes of a variant.
    pub fn test(&self, packed: u32) -> bool {
        match self {
            PopulationFrequencyFilter::NoOp => true,
            PopulationFrequencyFilter::And(filters) => filters.iter().all(|f| f.test_packed(packed)),
            PopulationFrequencyFilter::Or { filters, partial } => {
                filters.is_empty() || filters.iter().any(|f| f.test_packed(packed)) || *partial
            }
        }
    }
}

/// Transcript level combination of consequence type with biotype and/or
/// transcript flag.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CombinationFilter {
    pub consequence_type: IndexFieldFilter,
    pub biotype: Option<IndexFieldFilter>,
    pub transcript_flag: Option<IndexFieldFilter>,
}

impl CombinationFilter {
    pub fn test(&self, entry: &AnnotationIndexEntry) -> bool {
        let ct = entry.consequence_type;
        let bt = self.biotype.as_ref().map_or(true, |bt| {
            test_combination(ct, &entry.ct_bt, &self.consequence_type, bt)
        });
        let tf = self.transcript_flag.as_ref().map_or(true, |tf| {
            test_combination(ct, &entry.ct_tf, &self.consequence_type, tf)
        });
        bt && tf
    }
}

/// Annotation part of a sample index query.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SampleAnnotationIndexQuery {
    /// Summary bits to test.
    pub summary_mask: u8,
    /// Expected value of the tested summary bits.
    pub summary_value: u8,
    pub consequence_type: IndexFieldFilter,
    pub biotype: IndexFieldFilter,
    pub transcript_flag: IndexFieldFilter,
    pub combination: Option<CombinationFilter>,
    /// Filters over the packed clinical bits, all must pass.
    pub clinical: Vec<IndexFieldFilter>,
    pub population_frequency: PopulationFrequencyFilter,
}

impl SampleAnnotationIndexQuery {
    /// Query accepting every variant.
    pub fn empty(schema: &AnnotationIndexSchema) -> Self {
        Self {
            summary_mask: 0,
            summary_value: 0,
            consequence_type: schema.consequence_type().no_op_filter(false),
            biotype: schema.biotype().no_op_filter(false),
            transcript_flag: schema.transcript_flag().no_op_filter(false),
            combination: None,
            clinical: Vec::new(),
            population_frequency: PopulationFrequencyFilter::NoOp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary_mask == 0
            && self.consequence_type.is_no_op()
            && self.biotype.is_no_op()
            && self.transcript_flag.is_no_op()
            && self.combination.is_none()
            && self.clinical.is_empty()
            && self.population_frequency.is_no_op()
    }

    pub fn test_summary(&self, value: u8) -> bool {
        value & self.summary_mask == self.summary_value
    }

    /// Consequence type, biotype, transcript flag, and their combination.
    /// Intergenic variants carry no transcript data and pass.
    pub fn test_consequences(&self, entry: &AnnotationIndexEntry) -> bool {
        if entry.is_intergenic() {
            return true;
        }
        self.consequence_type.test(entry.consequence_type)
            && self.biotype.test(entry.biotype)
            && self.transcript_flag.test(entry.transcript_flag)
            && self.combination.as_ref().map_or(true, |c| c.test(entry))
    }

    pub fn test_clinical(&self, entry: &AnnotationIndexEntry) -> bool {
        if self.summary_mask & summary::CLINICAL == 0 {
            return true;
        }
        entry.has_clinical() && self.clinical.iter().all(|f| f.test_packed(entry.clinical))
    }

    pub fn test_population_frequency(&self, entry: &AnnotationIndexEntry) -> bool {
        self.population_frequency.test(entry.population_frequency)
    }
}

/// A compiled query against the sample index of one study.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SampleIndexQuery {
    #[serde(skip)]
    pub schema: Arc<SampleIndexSchema>,
    /// Regions grouped by chromosome chunk; empty for the whole genome.
    pub regions: Vec<Vec<Region>>,
    /// Accepted variant types; empty for all.
    pub variant_types: Vec<VariantType>,
    pub study: String,
    /// Samples to read with the genotype buckets to read for each.
    pub samples: IndexMap<String, Vec<String>>,
    /// Samples whose calls are split over several files.
    pub multi_file_samples: BTreeSet<String>,
    /// Samples whose variants are subtracted from the result.
    pub negated_samples: BTreeSet<String>,
    pub father_filters: IndexMap<String, ParentFilter>,
    pub mother_filters: IndexMap<String, ParentFilter>,
    pub file_filters: IndexMap<String, FileQueryShape>,
    pub annotation: SampleAnnotationIndexQuery,
    /// Samples read through their Mendelian error records.
    pub mendelian_error_samples: BTreeSet<String>,
    pub only_de_novo: bool,
    /// Combination of the per-sample results.
    pub operation: Option<QueryOperation>,
}

impl SampleIndexQuery {
    /// Query without samples or filters.
    pub fn new(schema: Arc<SampleIndexSchema>, study: impl Into<String>) -> Self {
        let annotation = SampleAnnotationIndexQuery::empty(schema.annotation_index());
        Self {
            schema,
            regions: Vec::new(),
            variant_types: Vec::new(),
            study: study.into(),
            samples: IndexMap::new(),
            multi_file_samples: BTreeSet::new(),
            negated_samples: BTreeSet::new(),
            father_filters: IndexMap::new(),
            mother_filters: IndexMap::new(),
            file_filters: IndexMap::new(),
            annotation,
            mendelian_error_samples: BTreeSet::new(),
            only_de_novo: false,
            operation: None,
        }
    }

    /// Samples whose results make up the positive part of the query.
    pub fn positive_samples(&self) -> Vec<&str> {
        self.samples
            .keys()
            .filter(|s| !self.negated_samples.contains(*s))
            .map(String::as_str)
            .collect()
    }

    /// Projection of the query to one sample.
    pub fn for_sample<'a>(&'a self, sample: &str) -> SingleSampleIndexQuery<'a> {
        SingleSampleIndexQuery {
            base: self,
            sample: sample.to_string(),
            genotypes: self.samples.get(sample).cloned().unwrap_or_default(),
            father_filter: self.father_filters.get(sample).copied(),
            mother_filter: self.mother_filters.get(sample).copied(),
            file_filter: self.file_filters.get(sample).cloned().unwrap_or_default(),
            multi_file: self.multi_file_samples.contains(sample),
            mendelian_error: self.mendelian_error_samples.contains(sample),
        }
    }
}

/// A `SampleIndexQuery` projected to one sample.
#[derive(Debug, Clone)]
pub struct SingleSampleIndexQuery<'a> {
    pub base: &'a SampleIndexQuery,
    pub sample: String,
    pub genotypes: Vec<String>,
    pub father_filter: Option<ParentFilter>,
    pub mother_filter: Option<ParentFilter>,
    pub file_filter: FileQueryShape,
    pub multi_file: bool,
    pub mendelian_error: bool,
}

impl<'a> SingleSampleIndexQuery<'a> {
    pub fn annotation(&self) -> &SampleAnnotationIndexQuery {
        &self.base.annotation
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.base.regions.iter().flatten()
    }

    pub fn has_regions(&self) -> bool {
        !self.base.regions.is_empty()
    }

    pub fn variant_types(&self) -> &[VariantType] {
        &self.base.variant_types
    }

    pub fn has_parents_filter(&self) -> bool {
        self.father_filter.is_some() || self.mother_filter.is_some()
    }

    pub fn test_parents(&self, father: u8, mother: u8) -> bool {
        self.father_filter
            .map_or(true, |f| f.get(father as usize).copied().unwrap_or(false))
            && self
                .mother_filter
                .map_or(true, |f| f.get(mother as usize).copied().unwrap_or(false))
    }
}

/// What the planner did with one parameter of the input query.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Coverage {
    /// Fully answered by the index.
    Remove,
    /// Partially answered; only the given value remains to be checked.
    Replace(String),
}

/// Per-parameter coverage of the input query by a compiled plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueryCoverage {
    actions: IndexMap<QueryParam, Coverage>,
}

impl QueryCoverage {
    /// Mark `param` as answered by the index.
    pub fn remove(&mut self, param: QueryParam) {
        self.actions.insert(param, Coverage::Remove);
    }

    /// Leave only `value` of `param` to be checked.
    pub fn replace(&mut self, param: QueryParam, value: impl Into<String>) {
        self.actions.insert(param, Coverage::Replace(value.into()));
    }

    /// Add the coverage of a later planning step; its actions win.
    pub fn merge(&mut self, other: QueryCoverage) {
        self.actions.extend(other.actions);
    }

    /// Drop the actions that leave `input` unchanged.
    pub fn restrict_to(mut self, input: &VariantQuery) -> Self {
        self.actions.retain(|param, coverage| match coverage {
            Coverage::Remove => input.get(*param).is_some(),
            Coverage::Replace(value) => input.get(*param) != Some(value.as_str()),
        });
        self
    }

    pub fn get(&self, param: QueryParam) -> Option<&Coverage> {
        self.actions.get(&param)
    }

    /// Parameters answered by the index alone.
    pub fn covered(&self) -> Vec<QueryParam> {
        self.actions
            .iter()
            .filter(|(_, c)| **c == Coverage::Remove)
            .map(|(p, _)| *p)
            .collect()
    }

    /// Residual query that remains to be checked on the index results.
    pub fn apply(&self, input: &VariantQuery) -> VariantQuery {
        let mut residual = input.clone();
        for (param, coverage) in &self.actions {
            match coverage {
                Coverage::Remove => {
                    residual.remove(*param);
                }
                Coverage::Replace(value) => residual.put(*param, value.clone()),
            }
        }
        residual
    }
}

/// Result of planning: the compiled query and the coverage of the input.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParsedSampleIndexQuery {
    pub query: SampleIndexQuery,
    pub coverage: QueryCoverage,
    /// Whether all samples are annotated and no condition made the annotation
    /// part of the index partial.
    pub complete_index: bool,
}

impl ParsedSampleIndexQuery {
    pub fn residual(&self, input: &VariantQuery) -> VariantQuery {
        self.coverage.apply(input)
    }
}
