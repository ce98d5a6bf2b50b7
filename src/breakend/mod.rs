//! Pairing of breakends with their mates.
//!
//! Breakend queries are answered by a delegate executor; every breakend
//! found is then joined with its mate, looked up in a window around the
//! position given in the alternate allele.

use std::cmp::Ordering;
use std::collections::HashMap;

use itertools::Itertools;

use crate::executor::{QueryOptions, VariantQueryExecutor, VariantQueryResult};
use crate::query::local_filter::LocalFilter;
use crate::query::{QueryParam, Region, Variant, VariantQuery, VariantType};

/// Slack around the mate position.
pub const MATE_WINDOW: i32 = 50;

/// File data key holding the VCF ID of the mate.
pub const MATE_ID: &str = "MATEID";

/// Parameters passed on to the mate lookup.
const MATE_QUERY_PARAMS: &[QueryParam] = &[
    QueryParam::Study,
    QueryParam::Type,
    QueryParam::IncludeSample,
    QueryParam::IncludeGenotype,
    QueryParam::IncludeFile,
];

/// Errors of the breakend executor.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unable to find mate of variant {variant} with MATEID={mate_id}")]
    MissingMate { variant: String, mate_id: String },
    #[error(transparent)]
    SampleIndex(#[from] crate::sample_index::Error),
    #[error(transparent)]
    Query(#[from] crate::query::Error),
}

fn missing_mate(variant: &Variant) -> Error {
    Error::MissingMate {
        variant: variant.to_string(),
        mate_id: variant.file_data.get(MATE_ID).cloned().unwrap_or_default(),
    }
}

/// Answers breakend queries with pairs of `(variant, mate)`, flattened in
/// the result list.
pub struct BreakendVariantQueryExecutor<'a, E> {
    delegate: &'a E,
}

impl<'a, E> BreakendVariantQueryExecutor<'a, E>
where
    E: VariantQueryExecutor,
    Error: From<E::Error>,
{
    pub fn new(delegate: &'a E) -> Self {
        Self { delegate }
    }

    /// Mates of `variants` by their VCF ID, fetched with one query.
    fn mates(
        &self,
        base: &VariantQuery,
        variants: &[Variant],
    ) -> Result<HashMap<String, Variant>, Error> {
        let regions = variants
            .iter()
            .map(|variant| {
                let mate = variant.breakend_mate().ok_or_else(|| missing_mate(variant))?;
                Ok(Region::new(
                    mate.chromosome,
                    (mate.position - MATE_WINDOW).max(1),
                    mate.position + MATE_WINDOW,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let query = base.clone().with(QueryParam::Region, regions.iter().join(","));
        let found = self.delegate.query(&query, &QueryOptions::default())?;
        tracing::debug!(
            "found {} mate candidates for {} breakends",
            found.variants.len(),
            variants.len()
        );
        Ok(found
            .variants
            .into_iter()
            .filter_map(|mate| mate.id.clone().map(|id| (id, mate)))
            .collect())
    }

    /// Join `variants` with their mates.
    ///
    /// A pair whose mate sorts first is emitted with the mate, unless the
    /// mate itself fails the query.
    fn pairs(
        &self,
        base: &VariantQuery,
        filter: &LocalFilter,
        variants: Vec<Variant>,
    ) -> Result<Vec<Variant>, Error> {
        if variants.is_empty() {
            return Ok(variants);
        }
        let mates = self.mates(base, &variants)?;
        let mut result = Vec::with_capacity(variants.len() * 2);
        for variant in variants {
            let mate = variant
                .file_data
                .get(MATE_ID)
                .and_then(|id| mates.get(id))
                .ok_or_else(|| missing_mate(&variant))?;
            if variant.genomic_cmp(mate) == Ordering::Greater && filter.passes(mate) {
                continue;
            }
            let mate = mate.clone();
            result.push(variant);
            result.push(mate);
        }
        Ok(result)
    }
}

impl<E> VariantQueryExecutor for BreakendVariantQueryExecutor<'_, E>
where
    E: VariantQueryExecutor,
    Error: From<E::Error>,
{
    type Error = Error;

    fn can_use_this_executor(&self, query: &VariantQuery, _options: &QueryOptions) -> Result<bool, Error> {
        let only_breakends = matches!(
            query.as_string_list(QueryParam::Type).as_slice(),
            [t] if t.parse::<VariantType>().ok() == Some(VariantType::Breakend)
        );
        Ok(only_breakends && query.is_valid(QueryParam::Genotype))
    }

    fn query(&self, query: &VariantQuery, options: &QueryOptions) -> Result<VariantQueryResult, Error> {
        let base = query.sub_query(MATE_QUERY_PARAMS);
        let filter = LocalFilter::new(query)?;

        let window = options.limit.map(|limit| {
            let window = options.skip + 2 * limit;
            if options.count {
                window.max(options.approximate_count_sampling_size)
            } else {
                window
            }
        });
        let delegate_options = QueryOptions {
            limit: window,
            skip: 0,
            count: true,
            ..options.clone()
        };
        let found = self.delegate.query(query, &delegate_options)?;
        let delegate_matches = found.num_matches.unwrap_or(found.variants.len());
        let pairs = self.pairs(&base, &filter, found.variants)?;

        let (num_matches, approximate_count) = match window {
            Some(window) if delegate_matches >= window && delegate_matches > 0 => {
                (delegate_matches * 2, true)
            }
            _ => (pairs.len(), false),
        };
        tracing::debug!(
            "{} breakends gave {} pair members (approximate count: {})",
            delegate_matches,
            pairs.len(),
            approximate_count
        );
        Ok(VariantQueryResult {
            num_matches: options.count.then_some(num_matches),
            approximate_count: options.count && approximate_count,
            variants: options.page(pairs),
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::index::SampleIndexSchema;
    use crate::sample_index::metadata::{Metadata, SampleMetadata, StudyMetadata};
    use crate::sample_index::store::SampleIndexStore;

    fn breakend(chromosome: &str, start: i32, alternate: &str, id: &str, mate: &str, gt: &str) -> Variant {
        Variant::new(chromosome, start, "A", alternate)
            .with_id(id)
            .with_file("f1")
            .with_file_data(MATE_ID, mate)
            .with_genotype("s1", gt)
    }

    fn store(extra: Vec<Variant>) -> Result<SampleIndexStore, anyhow::Error> {
        let metadata = Metadata::default().with_study(
            StudyMetadata::new("study").with_sample(SampleMetadata::new("s1").with_files(&["f1"])),
        );
        let mut store = SampleIndexStore::new(Arc::new(SampleIndexSchema::default_schema()), metadata);
        let mut records = vec![
            breakend("1", 1000, "A[2:5000[", "bnd_1", "bnd_2", "0/1"),
            breakend("2", 5000, "]1:1000]A", "bnd_2", "bnd_1", "0/1"),
            breakend("1", 2000, "A[3:100[", "bnd_3", "bnd_4", "0/1"),
            breakend("3", 100, "]1:2000]A", "bnd_4", "bnd_3", "0/0"),
            breakend("4", 100, "A[5:100[", "bnd_6", "bnd_7", "0/0"),
            breakend("5", 100, "]4:100]A", "bnd_7", "bnd_6", "0/1"),
            Variant::new("1", 1500, "A", "C").with_file("f1").with_genotype("s1", "0/1"),
        ];
        records.extend(extra);
        store.load("study", records)?;
        Ok(store)
    }

    fn query() -> VariantQuery {
        VariantQuery::default()
            .with(QueryParam::Type, "BREAKEND")
            .with(QueryParam::Genotype, "s1:0/1")
    }

    fn ids(result: &VariantQueryResult) -> Vec<&str> {
        result
            .variants
            .iter()
            .map(|v| v.id.as_deref().unwrap_or("."))
            .collect()
    }

    #[test]
    fn can_use() -> Result<(), anyhow::Error> {
        let store = store(Vec::new())?;
        let executor = BreakendVariantQueryExecutor::new(&store);
        let options = QueryOptions::default();
        assert!(executor.can_use_this_executor(&query(), &options)?);
        let mut other = query();
        other.put(QueryParam::Type, "BREAKEND,SNV");
        assert!(!executor.can_use_this_executor(&other, &options)?);
        other.put(QueryParam::Type, "BREAKEND");
        other.remove(QueryParam::Genotype);
        assert!(!executor.can_use_this_executor(&other, &options)?);
        Ok(())
    }

    #[test]
    fn pairs() -> Result<(), anyhow::Error> {
        let store = store(Vec::new())?;
        let executor = BreakendVariantQueryExecutor::new(&store);
        let result = executor.query(&query(), &QueryOptions::default().with_count(true))?;
        // bnd_2 is emitted with bnd_1, bnd_6 fails the query and is emitted
        // with bnd_7
        assert_eq!(
            ids(&result),
            vec!["bnd_1", "bnd_2", "bnd_3", "bnd_4", "bnd_7", "bnd_6"]
        );
        assert_eq!(result.num_matches, Some(6));
        assert!(!result.approximate_count);
        Ok(())
    }

    #[test]
    fn paging() -> Result<(), anyhow::Error> {
        let store = store(Vec::new())?;
        let executor = BreakendVariantQueryExecutor::new(&store);
        let result = executor.query(&query(), &QueryOptions::default().with_skip(1).with_limit(2))?;
        assert_eq!(ids(&result), vec!["bnd_2", "bnd_3"]);
        assert_eq!(result.num_matches, None);
        Ok(())
    }

    #[test]
    fn approximate_count() -> Result<(), anyhow::Error> {
        let store = store(Vec::new())?;
        let executor = BreakendVariantQueryExecutor::new(&store);
        let options = QueryOptions {
            approximate_count_sampling_size: 2,
            ..QueryOptions::default().with_limit(1).with_count(true)
        };
        let result = executor.query(&query(), &options)?;
        assert_eq!(ids(&result), vec!["bnd_1"]);
        assert_eq!(result.num_matches, Some(8));
        assert!(result.approximate_count);
        Ok(())
    }

    #[test]
    fn missing_mate() -> Result<(), anyhow::Error> {
        let store = store(vec![breakend("6", 100, "A[7:100[", "bnd_8", "bnd_9", "0/1")])?;
        let executor = BreakendVariantQueryExecutor::new(&store);
        let err = executor
            .query(&query(), &QueryOptions::default())
            .expect_err("mate must be missing");
        assert_eq!(
            err,
            Error::MissingMate {
                variant: "6:100:A:A[7:100[".into(),
                mate_id: "bnd_9".into(),
            }
        );
        insta::assert_snapshot!(
            err.to_string(),
            @"unable to find mate of variant 6:100:A:A[7:100[ with MATEID=bnd_9"
        );
        Ok(())
    }
}
