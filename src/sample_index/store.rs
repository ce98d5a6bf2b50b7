//! In-memory sample index of the loaded studies and query execution over it.
//!
//! Queries the index can answer are planned, evaluated per sample in
//! parallel, merged in genomic order, and finally checked against the
//! residual query on the stored records. Other queries scan the records.

use std::sync::Arc;

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::executor::{QueryOptions, VariantQueryExecutor, VariantQueryResult};
use crate::index::SampleIndexSchema;
use crate::query::local_filter::LocalFilter;
use crate::query::param::SKIP_GENE_REGIONS;
use crate::query::{QueryOperation, QueryParam, Region, Variant, VariantQuery};

use super::builder::SampleIndexBuilder;
use super::entry::{SampleIndexEntry, BATCH_SIZE};
use super::filter::SampleIndexEntryFilter;
use super::metadata::Metadata;
use super::parser::SampleIndexQueryParser;
use super::query::{ParsedSampleIndexQuery, SampleIndexQuery};
use super::Error;

/// Sort `variants` in genomic order and drop repeated variants.
pub fn sort_and_dedup(variants: &mut Vec<Variant>) {
    variants.sort_by(|a, b| a.genomic_cmp(b));
    variants.dedup_by(|a, b| a.same_genomic_variant(b));
}

fn contains_variant(sorted: &[Variant], variant: &Variant) -> bool {
    sorted
        .binary_search_by(|other| other.genomic_cmp(variant))
        .is_ok()
}

/// Variants found in every list. Lists must be sorted.
fn intersect(lists: Vec<Vec<Variant>>) -> Vec<Variant> {
    let mut lists = lists.into_iter();
    let mut result = lists.next().unwrap_or_default();
    for other in lists {
        result.retain(|v| contains_variant(&other, v));
    }
    result
}

fn union(lists: Vec<Vec<Variant>>) -> Vec<Variant> {
    let mut result = lists.into_iter().flatten().collect::<Vec<_>>();
    sort_and_dedup(&mut result);
    result
}

/// Whether `residual` still restricts the variants.
fn needs_local_filter(residual: &VariantQuery) -> bool {
    residual.params().any(|(param, value)| match param {
        QueryParam::Study
        | QueryParam::IncludeSample
        | QueryParam::IncludeFile
        | QueryParam::IncludeGenotype => false,
        QueryParam::GeneRegions => value != SKIP_GENE_REGIONS,
        _ => true,
    })
}

/// Records and index entries of one study.
#[derive(Debug, Default)]
struct StudyData {
    /// Records in genomic order; multi-file variants have one per file.
    records: Vec<Variant>,
    entries: IndexMap<String, Vec<SampleIndexEntry>>,
}

impl StudyData {
    /// Entries of `sample` in chunks touched by `regions`.
    fn entries<'a>(
        &'a self,
        sample: &str,
        regions: &'a [Vec<Region>],
    ) -> impl Iterator<Item = &'a SampleIndexEntry> + 'a {
        self.entries
            .get(sample)
            .into_iter()
            .flatten()
            .filter(move |entry| {
                regions.is_empty()
                    || regions.iter().flatten().any(|region| {
                        region.overlaps(
                            &entry.chromosome,
                            entry.batch_start,
                            entry.batch_start + BATCH_SIZE - 1,
                        )
                    })
            })
    }

    /// Stored records of the same genomic variant as `variant`.
    fn records_of<'a>(&'a self, variant: &'a Variant) -> impl Iterator<Item = &'a Variant> + 'a {
        let first = self
            .records
            .partition_point(|r| r.genomic_cmp(variant) == std::cmp::Ordering::Less);
        self.records[first..]
            .iter()
            .take_while(move |r| r.same_genomic_variant(variant))
    }
}

/// Sample index of the studies in `metadata` and the records it was built
/// from.
pub struct SampleIndexStore {
    schema: Arc<SampleIndexSchema>,
    metadata: Metadata,
    studies: IndexMap<String, StudyData>,
}

impl SampleIndexStore {
    pub fn new(schema: Arc<SampleIndexSchema>, metadata: Metadata) -> Self {
        Self {
            schema,
            metadata,
            studies: IndexMap::new(),
        }
    }

    /// Add decoded records to `study` and rebuild its sample index.
    pub fn load<I>(&mut self, study: &str, records: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Variant>,
    {
        let study_meta = self
            .metadata
            .studies
            .get(study)
            .ok_or_else(|| Error::UnknownStudy(study.to_string()))?;
        let data = self.studies.entry(study.to_string()).or_default();
        data.records.extend(records);
        data.records.sort_by(|a, b| a.genomic_cmp(b));
        data.entries = SampleIndexBuilder::new(&self.schema, study_meta).build(&data.records)?;
        tracing::info!(
            "indexed {} records of study {} for {} samples",
            data.records.len(),
            study,
            data.entries.len()
        );
        Ok(())
    }

    /// Compile `query` against the sample index.
    pub fn plan(&self, query: &VariantQuery) -> Result<ParsedSampleIndexQuery, Error> {
        SampleIndexQueryParser::new(self.schema.clone(), &self.metadata).parse(query)
    }

    fn sample_variants(
        &self,
        data: &StudyData,
        query: &SampleIndexQuery,
        sample: &str,
    ) -> Result<Vec<Variant>, Error> {
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample(sample));
        let mut result = Vec::new();
        for entry in data.entries(sample, &query.regions) {
            result.extend(filter.filter(entry)?);
        }
        sort_and_dedup(&mut result);
        tracing::debug!("sample {}: {} variants", sample, result.len());
        Ok(result)
    }

    /// Variants selected by the compiled query, in genomic order, as decoded
    /// from the index.
    pub fn index_variants(&self, parsed: &ParsedSampleIndexQuery) -> Result<Vec<Variant>, Error> {
        let query = &parsed.query;
        let data = match self.studies.get(&query.study) {
            Some(data) => data,
            None => return Ok(Vec::new()),
        };
        let per_sample = query
            .samples
            .keys()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|sample| Ok((sample.as_str(), self.sample_variants(data, query, sample)?)))
            .collect::<Result<Vec<_>, Error>>()?;

        let (negated, positive): (Vec<_>, Vec<_>) = per_sample
            .into_iter()
            .partition(|(sample, _)| query.negated_samples.contains(*sample));
        let positive = positive.into_iter().map(|(_, v)| v).collect::<Vec<_>>();
        let mut result = match query.operation {
            Some(QueryOperation::Or) => union(positive),
            _ => intersect(positive),
        };
        let excluded = union(negated.into_iter().map(|(_, v)| v).collect());
        if !excluded.is_empty() {
            result.retain(|v| !contains_variant(&excluded, v));
        }
        Ok(result)
    }

    /// Number of variants selected by the compiled query.
    ///
    /// Queries reading a single sample are counted without decoding where
    /// the evaluator allows it.
    pub fn count(&self, parsed: &ParsedSampleIndexQuery) -> Result<usize, Error> {
        let query = &parsed.query;
        if let ([sample], Some(data)) = (
            query.positive_samples().as_slice(),
            self.studies.get(&query.study),
        ) {
            if query.negated_samples.is_empty() {
                let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample(sample));
                return data
                    .entries(sample, &query.regions)
                    .map(|entry| filter.filter_and_count(entry))
                    .sum();
            }
        }
        Ok(self.index_variants(parsed)?.len())
    }

    /// Full records of the variants decoded from the index that pass
    /// `filter`. Of several records of one variant, the first passing one is
    /// kept.
    fn resolve(&self, study: &str, variants: &[Variant], filter: Option<&LocalFilter>) -> Vec<Variant> {
        let data = match self.studies.get(study) {
            Some(data) => data,
            None => return Vec::new(),
        };
        variants
            .iter()
            .filter_map(|variant| {
                data.records_of(variant)
                    .find(|record| filter.map_or(true, |f| f.passes(record)))
                    .cloned()
            })
            .collect()
    }

    /// Answer `query` from the stored records alone.
    pub fn scan(&self, query: &VariantQuery, options: &QueryOptions) -> Result<VariantQueryResult, Error> {
        let study = self.metadata.default_study(query)?;
        let filter = LocalFilter::new(query)?;
        let mut matches = self
            .studies
            .get(&study.name)
            .map(|data| {
                data.records
                    .iter()
                    .filter(|r| filter.passes(r))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        matches.dedup_by(|a, b| a.same_genomic_variant(b));
        tracing::debug!("scan of study {} found {} variants", study.name, matches.len());
        Ok(VariantQueryResult {
            num_matches: options.count.then_some(matches.len()),
            variants: options.page(matches),
            approximate_count: false,
        })
    }
}

impl VariantQueryExecutor for SampleIndexStore {
    type Error = Error;

    fn can_use_this_executor(&self, query: &VariantQuery, _options: &QueryOptions) -> Result<bool, Error> {
        SampleIndexQueryParser::valid_sample_index_query(query)
    }

    fn query(&self, query: &VariantQuery, options: &QueryOptions) -> Result<VariantQueryResult, Error> {
        if !self.can_use_this_executor(query, options)? {
            return self.scan(query, options);
        }
        let parsed = self.plan(query)?;
        let residual = parsed.residual(query);
        let filter = if needs_local_filter(&residual) {
            Some(LocalFilter::new(&residual)?)
        } else {
            None
        };
        if options.count && options.limit == Some(0) && filter.is_none() {
            return Ok(VariantQueryResult {
                variants: Vec::new(),
                num_matches: Some(self.count(&parsed)?),
                approximate_count: false,
            });
        }
        let found = self.index_variants(&parsed)?;
        let matches = self.resolve(&parsed.query.study, &found, filter.as_ref());
        tracing::debug!(
            "index returned {} variants, {} pass the residual query",
            found.len(),
            matches.len()
        );
        Ok(VariantQueryResult {
            num_matches: options.count.then_some(matches.len()),
            variants: options.page(matches),
            approximate_count: false,
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::query::variant::{ConsequenceType, VariantAnnotation};
    use crate::sample_index::metadata::{IndexStatus, SampleMetadata, StudyMetadata};

    fn annotation(gene: Option<&str>, term: &str, frequency: f64) -> VariantAnnotation {
        VariantAnnotation {
            consequence_types: vec![ConsequenceType {
                gene: gene.map(str::to_string),
                biotype: gene.map(|_| "protein_coding".to_string()),
                so_terms: vec![term.to_string()],
                flags: Vec::new(),
            }],
            population_frequencies: IndexMap::from([("GNOMAD_GENOMES:ALL".to_string(), frequency)]),
            ..Default::default()
        }
    }

    fn metadata() -> Metadata {
        let sample = |name: &str| {
            SampleMetadata::new(name)
                .with_files(&["f1"])
                .with_annotation_index(IndexStatus::Ready, 0)
        };
        Metadata::default().with_study(
            StudyMetadata::new("study")
                .with_sample(sample("child").with_parents(Some("father"), Some("mother")))
                .with_sample(sample("father"))
                .with_sample(sample("mother")),
        )
    }

    fn record(start: i32, child: &str, father: &str, mother: &str) -> Variant {
        Variant::new("1", start, "A", "C")
            .with_file("f1")
            .with_file_data("FILTER", "PASS")
            .with_genotype("child", child)
            .with_genotype("father", father)
            .with_genotype("mother", mother)
            .with_annotation(annotation(Some("BRCA1"), "missense_variant", 0.2))
    }

    fn store() -> Result<SampleIndexStore, anyhow::Error> {
        let mut store = SampleIndexStore::new(Arc::new(SampleIndexSchema::default_schema()), metadata());
        store.load(
            "study",
            vec![
                record(100, "0/1", "0/0", "0/0"),
                record(200, "0/1", "0/1", "0/0"),
                record(300, "1/1", "0/1", "0/1"),
                record(400, "0/0", "1/1", "0/1"),
                record(500, "0/1", "0/0", "0/0")
                    .with_annotation(annotation(Some("BRCA2"), "missense_variant", 0.001)),
                Variant::new("2", 100, "A", "ACGT")
                    .with_file("f1")
                    .with_genotype("child", "1/1")
                    .with_genotype("father", "0/1")
                    .with_genotype("mother", "1/1")
                    .with_annotation(annotation(None, "intergenic_variant", 0.0)),
            ],
        )?;
        Ok(store)
    }

    fn starts(result: &VariantQueryResult) -> Vec<(String, i32)> {
        result
            .variants
            .iter()
            .map(|v| (v.chromosome.clone(), v.start))
            .collect()
    }

    fn at(chromosome: &str, start: i32) -> (String, i32) {
        (chromosome.to_string(), start)
    }

    #[test]
    fn single_het_sample() -> Result<(), anyhow::Error> {
        let store = store()?;
        let query = VariantQuery::default().with(QueryParam::Genotype, "child:0/1");
        let result = store.query(&query, &QueryOptions::default())?;
        assert_eq!(starts(&result), vec![at("1", 100), at("1", 200), at("1", 500)]);
        Ok(())
    }

    #[test]
    fn trio() -> Result<(), anyhow::Error> {
        let store = store()?;
        let query = VariantQuery::default()
            .with(QueryParam::Genotype, "child:0/1,1/1;father:0/0;mother:0/0");
        let parsed = store.plan(&query)?;
        assert!(parsed.residual(&query).is_empty());
        let result = store.query(&query, &QueryOptions::default().with_count(true))?;
        assert_eq!(starts(&result), vec![at("1", 100), at("1", 500)]);
        assert_eq!(result.num_matches, Some(2));
        Ok(())
    }

    #[rstest]
    #[case(QueryParam::SampleDeNovo, &[100, 500])]
    // child 0/0 with a hom alt father at 400
    #[case(QueryParam::SampleMendelianError, &[100, 400, 500])]
    fn mendelian_errors(#[case] param: QueryParam, #[case] expected: &[i32]) -> Result<(), anyhow::Error> {
        let store = store()?;
        let query = VariantQuery::default().with(param, "child");
        let result = store.query(&query, &QueryOptions::default())?;
        let expected = expected.iter().map(|start| at("1", *start)).collect::<Vec<_>>();
        assert_eq!(starts(&result), expected);
        Ok(())
    }

    #[test]
    fn samples_or_and_negation() -> Result<(), anyhow::Error> {
        let store = store()?;
        let or = VariantQuery::default().with(QueryParam::Genotype, "father:1/1,mother:1/1");
        assert_eq!(
            starts(&store.query(&or, &QueryOptions::default())?),
            vec![at("1", 400), at("2", 100)]
        );
        let and = VariantQuery::default().with(QueryParam::Sample, "child;father");
        assert_eq!(
            starts(&store.query(&and, &QueryOptions::default())?),
            vec![at("1", 200), at("1", 300), at("2", 100)]
        );
        let negated =
            VariantQuery::default().with(QueryParam::Genotype, "child:0/1,1/1;father:!0/1");
        assert_eq!(
            starts(&store.query(&negated, &QueryOptions::default())?),
            vec![at("1", 100), at("1", 500)]
        );
        Ok(())
    }

    #[test]
    fn hom_ref_sample_is_subtracted() -> Result<(), anyhow::Error> {
        let store = store()?;
        let query = VariantQuery::default().with(QueryParam::Genotype, "father:0/1;mother:0/0");
        let parsed = store.plan(&query)?;
        assert!(parsed.query.negated_samples.contains("mother"));
        assert_eq!(store.index_variants(&parsed)?.len(), 1);
        assert_eq!(
            starts(&store.query(&query, &QueryOptions::default())?),
            vec![at("1", 200)]
        );
        Ok(())
    }

    #[test]
    fn population_frequency_and_region() -> Result<(), anyhow::Error> {
        let store = store()?;
        let query = VariantQuery::default()
            .with(QueryParam::Genotype, "child:0/1")
            .with(QueryParam::Region, "1:50-1000")
            .with(QueryParam::PopulationFrequencyAlt, "GNOMAD_GENOMES:ALL<0.01");
        let result = store.query(&query, &QueryOptions::default())?;
        assert_eq!(starts(&result), vec![at("1", 500)]);
        Ok(())
    }

    #[test]
    fn count_and_page() -> Result<(), anyhow::Error> {
        let store = store()?;
        let query = VariantQuery::default().with(QueryParam::Sample, "child");
        let counted = store.query(&query, &QueryOptions::default().with_count(true).with_limit(0))?;
        assert_eq!(counted.num_matches, Some(5));
        assert!(counted.variants.is_empty());
        let page = store.query(&query, &QueryOptions::default().with_skip(1).with_limit(2))?;
        assert_eq!(starts(&page), vec![at("1", 200), at("1", 300)]);
        Ok(())
    }

    #[test]
    fn not_indexable_query_scans() -> Result<(), anyhow::Error> {
        let store = store()?;
        let query = VariantQuery::default().with(QueryParam::Genotype, "father:0/0");
        assert!(!store.can_use_this_executor(&query, &QueryOptions::default())?);
        let result = store.query(&query, &QueryOptions::default())?;
        assert_eq!(starts(&result), vec![at("1", 100), at("1", 500)]);
        Ok(())
    }

    #[test]
    fn sort_and_dedup_variants() {
        let mut variants = vec![
            Variant::new("2", 5, "A", "C"),
            Variant::new("1", 10, "A", "G"),
            Variant::new("chr1", 10, "A", "G"),
            Variant::new("1", 10, "A", "C"),
        ];
        sort_and_dedup(&mut variants);
        let keys = variants
            .iter()
            .map(|v| format!("{}:{}:{}", v.chromosome, v.start, v.alternate))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["1:10:C", "1:10:G", "2:5:C"]);
    }

    const SAMPLES: [&str; 3] = ["s1", "s2", "s3"];
    const CALLS: [Option<&str>; 6] = [
        Some("0/1"),
        Some("1/1"),
        Some("0|1"),
        Some("1/2"),
        Some("0/0"),
        None,
    ];

    fn arb_record() -> impl Strategy<Value = Variant> {
        (
            prop::sample::select(vec!["1", "2"]),
            1i32..3_000_000,
            prop::sample::select(vec!["C", "CG"]),
            prop::collection::vec(prop::sample::select(CALLS.to_vec()), 3),
            prop::option::of(prop::sample::select(vec![
                "missense_variant",
                "stop_gained",
                "synonymous_variant",
            ])),
            prop::sample::select(vec![0.0, 0.003, 0.008, 0.02, 0.3]),
            prop::bool::ANY,
        )
            .prop_map(|(chromosome, start, alternate, calls, term, frequency, pass)| {
                let mut record = Variant::new(chromosome, start, "A", alternate)
                    .with_file("f1")
                    .with_file_data("FILTER", if pass { "PASS" } else { "LowQual" })
                    .with_annotation(match term {
                        Some(term) => annotation(Some("GENE"), term, frequency),
                        None => annotation(None, "intergenic_variant", frequency),
                    });
                for (sample, call) in SAMPLES.iter().zip(calls) {
                    if let Some(call) = call {
                        record = record.with_genotype(*sample, call);
                    }
                }
                record
            })
    }

    fn arb_query() -> impl Strategy<Value = VariantQuery> {
        (
            prop::sample::select(vec![
                "s1:0/1",
                "s1:HET",
                "s1:MAIN_ALT",
                "s1:0/1,1/1;s2:HOM_REF",
                "s1:1/1,s2:0/1",
                "s1:0/1;s2:!1/1",
                "s1:HOM_ALT;s3:1/2",
                "s2:0/0",
            ]),
            prop::option::of(prop::sample::select(vec![
                "missense_variant",
                "stop_gained,synonymous_variant",
            ])),
            prop::option::of(prop::sample::select(vec![
                "GNOMAD_GENOMES:ALL<0.01",
                "GNOMAD_GENOMES:ALL<0.004",
                "GNOMAD_GENOMES:ALL>0.1",
            ])),
            prop::option::of(prop::sample::select(vec!["PASS", "!PASS"])),
            prop::option::of(prop::sample::select(vec!["1:1-1500000", "2"])),
            prop::option::of(prop::sample::select(vec!["SNV", "INDEL"])),
        )
            .prop_map(|(genotype, ct, frequency, filter, region, variant_type)| {
                let mut query = VariantQuery::default().with(QueryParam::Genotype, genotype);
                let optional = [
                    (QueryParam::ConsequenceType, ct),
                    (QueryParam::PopulationFrequencyAlt, frequency),
                    (QueryParam::Filter, filter),
                    (QueryParam::Region, region),
                    (QueryParam::Type, variant_type),
                ];
                for (param, value) in optional {
                    if let Some(value) = value {
                        query.put(param, value);
                    }
                }
                query
            })
    }

    fn random_store(records: Vec<Variant>) -> Result<SampleIndexStore, Error> {
        let mut study = StudyMetadata::new("study");
        for sample in SAMPLES {
            study = study.with_sample(
                SampleMetadata::new(sample)
                    .with_files(&["f1"])
                    .with_annotation_index(IndexStatus::Ready, 0),
            );
        }
        let mut store = SampleIndexStore::new(
            Arc::new(SampleIndexSchema::default_schema()),
            Metadata::default().with_study(study),
        );
        store.load("study", records)?;
        Ok(store)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Index plus residual query finds exactly what the local filter finds.
        #[test]
        fn index_agrees_with_scan(
            records in prop::collection::vec(arb_record(), 0..40),
            query in arb_query(),
        ) {
            let mut records = records;
            sort_and_dedup(&mut records);
            let store = random_store(records).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let options = QueryOptions::default().with_count(true);
            let expected = store.scan(&query, &options).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let found = store.query(&query, &options).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(found.variants, expected.variants);
            prop_assert_eq!(found.num_matches, expected.num_matches);
        }

        /// The index never drops a variant passing the query.
        #[test]
        fn index_is_conservative(
            records in prop::collection::vec(arb_record(), 0..40),
            query in arb_query(),
        ) {
            let mut records = records;
            sort_and_dedup(&mut records);
            let store = random_store(records).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let parsed = match store.plan(&query) {
                Ok(parsed) => parsed,
                Err(Error::NotIndexable(_)) => return Ok(()),
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            };
            let found = store.index_variants(&parsed).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let expected = store
                .scan(&query, &QueryOptions::default())
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            for variant in &expected.variants {
                prop_assert!(contains_variant(&found, variant), "missing {}", variant);
            }
            prop_assert_eq!(
                store.count(&parsed).map_err(|e| TestCaseError::fail(e.to_string()))?,
                found.len()
            );
        }

        /// Planning the residual query of the same samples again leaves the
        /// same residual query.
        #[test]
        fn residual_is_idempotent(query in arb_query()) {
            let store = random_store(Vec::new()).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let parsed = match store.plan(&query) {
                Ok(parsed) => parsed,
                Err(Error::NotIndexable(_)) => return Ok(()),
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            };
            let residual = parsed.residual(&query);
            let mut replanned = residual.clone();
            if let Some(genotype) = query.get(QueryParam::Genotype) {
                replanned.put(QueryParam::Genotype, genotype);
            }
            let again = store
                .plan(&replanned)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(&again.query.samples, &parsed.query.samples);
            prop_assert_eq!(again.residual(&replanned), residual);
        }
    }
}
