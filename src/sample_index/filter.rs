//! Evaluate a compiled query over the index entries of one sample.

use std::marker::PhantomData;

use crate::index::annotation::AnnotationIndexEntry;
use crate::index::{self, BitBuffer};
use crate::query::Variant;

use super::entry::{is_de_novo, SampleIndexEntry, SampleIndexGtEntryIterator};
use super::query::SingleSampleIndexQuery;
use super::Error;

/// Shape of the records produced by the evaluator.
pub trait SampleIndexRecord: Sized + Send {
    /// Read the current variant of `iter`, moving it to the next variant.
    fn read(
        iter: &mut SampleIndexGtEntryIterator<'_>,
        file_index: Vec<BitBuffer>,
    ) -> Result<Self, index::Error>;

    fn variant(&self) -> &Variant;
}

impl SampleIndexRecord for Variant {
    fn read(
        iter: &mut SampleIndexGtEntryIterator<'_>,
        _file_index: Vec<BitBuffer>,
    ) -> Result<Self, index::Error> {
        iter.next_variant()
    }

    fn variant(&self) -> &Variant {
        self
    }
}

/// A matching variant together with its raw index data.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SampleVariantIndexEntry {
    pub variant: Variant,
    pub gt: String,
    pub file_index: Vec<BitBuffer>,
    pub annotation: Option<AnnotationIndexEntry>,
    /// `(father, mother)` codes.
    pub parents: Option<(u8, u8)>,
}

impl SampleIndexRecord for SampleVariantIndexEntry {
    fn read(
        iter: &mut SampleIndexGtEntryIterator<'_>,
        file_index: Vec<BitBuffer>,
    ) -> Result<Self, index::Error> {
        let gt = iter.gt().to_string();
        let annotation = iter.annotation()?.cloned();
        let parents = iter.parents()?;
        Ok(Self {
            variant: iter.next_variant()?,
            gt,
            file_index,
            annotation,
            parents,
        })
    }

    fn variant(&self) -> &Variant {
        &self.variant
    }
}

/// Outcome of testing one variant.
enum Outcome<T> {
    /// Summary bits do not match.
    Summary,
    Rejected,
    /// Passed without decoding the variant.
    Counted,
    Accepted(T),
}

/// Applies a `SingleSampleIndexQuery` to index entries of its sample.
///
/// Checks run cheapest first: the annotation summary, the detailed
/// annotation filters, the file index, and the parent codes are all tested
/// before the variant itself is decoded for the region and type filters.
pub struct SampleIndexEntryFilter<'q, T> {
    query: SingleSampleIndexQuery<'q>,
    _record: PhantomData<fn() -> T>,
}

impl<'q, T: SampleIndexRecord> SampleIndexEntryFilter<'q, T> {
    pub fn new(query: SingleSampleIndexQuery<'q>) -> Self {
        Self {
            query,
            _record: PhantomData,
        }
    }

    pub fn query(&self) -> &SingleSampleIndexQuery<'q> {
        &self.query
    }

    /// Matching records of `entry` in genomic order.
    pub fn filter(&self, entry: &SampleIndexEntry) -> Result<Vec<T>, Error> {
        if self.query.mendelian_error {
            self.filter_mendelian(entry)
        } else {
            self.collect(entry, false)
        }
    }

    /// Number of matching records of `entry`.
    pub fn filter_and_count(&self, entry: &SampleIndexEntry) -> Result<usize, Error> {
        if self.query.mendelian_error {
            return Ok(self.filter_mendelian(entry)?.len());
        }
        if self.query.has_regions() || !self.query.variant_types().is_empty() || self.query.multi_file
        {
            return Ok(self.collect(entry, true)?.len());
        }
        let mut count = 0;
        for gt in &self.query.genotypes {
            if let Some(mut iter) = entry.iter_gt(gt, self.file_schema()) {
                count += self.walk(&mut iter, false, &mut Vec::new())?;
            }
        }
        Ok(count)
    }

    fn file_schema(&self) -> &'q index::schema::FileIndexSchema {
        self.query.base.schema.file_index()
    }

    fn collect(&self, entry: &SampleIndexEntry, count: bool) -> Result<Vec<T>, Error> {
        let mut lists = Vec::new();
        for gt in &self.query.genotypes {
            if let Some(mut iter) = entry.iter_gt(gt, self.file_schema()) {
                let mut records = Vec::new();
                self.walk(&mut iter, true, &mut records)?;
                if !records.is_empty() {
                    lists.push(records);
                }
            }
        }
        if lists.len() == 1 {
            return Ok(lists.remove(0));
        }
        let may_have_duplicates = self.query.multi_file && entry.discrepancies > 0;
        let mut result = lists.into_iter().flatten().collect::<Vec<_>>();
        if !count || may_have_duplicates {
            result.sort_by(|a, b| a.variant().genomic_cmp(b.variant()));
        }
        if may_have_duplicates {
            result.dedup_by(|a, b| a.variant().same_genomic_variant(b.variant()));
        }
        Ok(result)
    }

    /// Test all variants of one bucket, pushing the matches to `records` if
    /// `decode` is set. Returns the number of matches.
    fn walk(
        &self,
        iter: &mut SampleIndexGtEntryIterator<'_>,
        decode: bool,
        records: &mut Vec<T>,
    ) -> Result<usize, Error> {
        let annotation = self.query.annotation();
        let mut expected = iter
            .bucket()
            .annotation_count(annotation.summary_value)
            .map_or(usize::MAX, |c| c as usize);
        let mut count = 0;
        while iter.has_next() && expected > 0 {
            match self.test_next(iter, decode)? {
                Outcome::Summary => continue,
                Outcome::Rejected => (),
                Outcome::Counted => count += 1,
                Outcome::Accepted(record) => {
                    records.push(record);
                    count += 1;
                }
            }
            expected -= 1;
        }
        if iter.has_next() {
            tracing::trace!(
                "stopping early at {} of sample {}, no more annotated matches",
                iter,
                self.query.sample
            );
        }
        Ok(count)
    }

    fn filter_mendelian(&self, entry: &SampleIndexEntry) -> Result<Vec<T>, Error> {
        let mut errors = entry.mendelian_errors(self.file_schema());
        let mut result: Vec<T> = Vec::new();
        while let Some(record) = errors.next_record() {
            if self.query.base.only_de_novo && !is_de_novo(record.code) {
                continue;
            }
            let iter = errors.position(record).map_err(|source| {
                let cursor = format!("{}:{} mendelian error", entry.chromosome, entry.batch_start);
                tracing::error!("corrupt mendelian errors of {} at {}", self.query.sample, cursor);
                Error::CorruptIndex {
                    sample: self.query.sample.clone(),
                    cursor,
                    source,
                }
            })?;
            if let Outcome::Accepted(found) = self.test_next(iter, true)? {
                let pos = result
                    .binary_search_by(|r| r.variant().genomic_cmp(found.variant()))
                    .unwrap_or_else(|pos| pos);
                if result
                    .get(pos)
                    .map_or(true, |r| !r.variant().same_genomic_variant(found.variant()))
                {
                    result.insert(pos, found);
                }
            }
        }
        Ok(result)
    }

    /// Test the current variant of `iter` and move past it.
    fn test_next(
        &self,
        iter: &mut SampleIndexGtEntryIterator<'_>,
        decode: bool,
    ) -> Result<Outcome<T>, Error> {
        self.try_test_next(iter, decode)
            .map_err(|source| self.corrupt(iter, source))
    }

    fn try_test_next(
        &self,
        iter: &mut SampleIndexGtEntryIterator<'_>,
        decode: bool,
    ) -> Result<Outcome<T>, index::Error> {
        let query = self.query.annotation();
        let annotation = iter.annotation()?;
        if let Some(annotation) = annotation {
            if !query.test_summary(annotation.summary) {
                iter.skip()?;
                return Ok(Outcome::Summary);
            }
            if !(query.test_clinical(annotation)
                && query.test_consequences(annotation)
                && query.test_population_frequency(annotation))
            {
                iter.skip()?;
                return Ok(Outcome::Rejected);
            }
        }

        let file_index = iter.file_entries()?;
        if !self.query.file_filter.passes(&file_index)? {
            iter.skip()?;
            return Ok(Outcome::Rejected);
        }
        if self.query.has_parents_filter() {
            if let Some((father, mother)) = iter.parents()? {
                if !self.query.test_parents(father, mother) {
                    iter.skip()?;
                    return Ok(Outcome::Rejected);
                }
            }
        }

        if !decode {
            iter.skip()?;
            return Ok(Outcome::Counted);
        }
        let record = T::read(iter, file_index)?;
        if self.test_location(record.variant()) {
            Ok(Outcome::Accepted(record))
        } else {
            Ok(Outcome::Rejected)
        }
    }

    fn test_location(&self, variant: &Variant) -> bool {
        let in_region = !self.query.has_regions()
            || self
                .query
                .regions()
                .any(|r| r.contains(&variant.chromosome, variant.start));
        let types = self.query.variant_types();
        in_region && (types.is_empty() || types.contains(&variant.variant_type().index_type()))
    }

    fn corrupt(&self, iter: &SampleIndexGtEntryIterator<'_>, source: index::Error) -> Error {
        let cursor = iter.to_string();
        tracing::error!(
            "corrupt sample index of sample {} at {}: {}",
            self.query.sample,
            cursor,
            source
        );
        Error::CorruptIndex {
            sample: self.query.sample.clone(),
            cursor,
            source,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::index::codec;
    use crate::index::schema::summary;
    use crate::index::SampleIndexSchema;
    use crate::query::{Region, VariantType};
    use crate::sample_index::builder::SampleIndexBuilder;
    use crate::sample_index::metadata::{SampleMetadata, StudyMetadata};
    use crate::sample_index::query::SampleIndexQuery;

    fn study() -> StudyMetadata {
        StudyMetadata::new("s1")
            .with_sample(
                SampleMetadata::new("child")
                    .with_files(&["f1"])
                    .with_parents(Some("father"), Some("mother")),
            )
            .with_sample(SampleMetadata::new("father").with_files(&["f1"]))
            .with_sample(SampleMetadata::new("mother").with_files(&["f1"]))
    }

    fn record(start: i32, alternate: &str, child: &str, father: &str, mother: &str) -> Variant {
        Variant::new("1", start, "A", alternate)
            .with_file("f1")
            .with_genotype("child", child)
            .with_genotype("father", father)
            .with_genotype("mother", mother)
    }

    fn entry(schema: &SampleIndexSchema) -> Result<SampleIndexEntry, anyhow::Error> {
        let study = study();
        let records = vec![
            record(100, "C", "0/1", "0/1", "0/0"),
            record(200, "ACGT", "0/1", "0/0", "0/0"),
            record(300, "C", "1/1", "0/1", "0/1"),
            record(400, "C", "1/1", "0/0", "0/0"),
            record(500, "C", "0/0", "1/1", "1/1"),
        ];
        let mut entries =
            SampleIndexBuilder::new(schema, &study).build_sample(study.sample("child")?, &records)?;
        Ok(entries.remove(0))
    }

    fn query(gts: &[&str]) -> SampleIndexQuery {
        let mut query = SampleIndexQuery::new(Arc::new(SampleIndexSchema::default_schema()), "s1");
        query.samples.insert(
            "child".into(),
            gts.iter().map(|gt| gt.to_string()).collect(),
        );
        query
    }

    fn starts(variants: &[Variant]) -> Vec<i32> {
        variants.iter().map(|v| v.start).collect()
    }

    #[test]
    fn genotype_buckets_merge_sorted() -> Result<(), anyhow::Error> {
        let query = query(&["1/1", "0/1"]);
        let entry = entry(&query.schema)?;
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample("child"));
        assert_eq!(starts(&filter.filter(&entry)?), vec![100, 200, 300, 400]);
        assert_eq!(filter.filter_and_count(&entry)?, 4);
        Ok(())
    }

    #[test]
    fn region_and_type() -> Result<(), anyhow::Error> {
        let mut query = query(&["0/1", "1/1"]);
        query.regions = vec![vec![Region::new("1", 150, 350)]];
        let entry = entry(&query.schema)?;
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample("child"));
        assert_eq!(starts(&filter.filter(&entry)?), vec![200, 300]);

        query.regions = Vec::new();
        query.variant_types = vec![VariantType::Indel];
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample("child"));
        assert_eq!(starts(&filter.filter(&entry)?), vec![200]);
        assert_eq!(filter.filter_and_count(&entry)?, 1);
        Ok(())
    }

    #[test]
    fn parent_filters() -> Result<(), anyhow::Error> {
        let mut query = query(&["0/1", "1/1"]);
        let mut hom_ref = [false; codec::NUM_CODES];
        hom_ref[codec::HOM_REF_UNPHASED as usize] = true;
        query.father_filters.insert("child".into(), hom_ref);
        let entry = entry(&query.schema)?;
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample("child"));
        assert_eq!(starts(&filter.filter(&entry)?), vec![200, 400]);
        assert_eq!(filter.filter_and_count(&entry)?, 2);
        Ok(())
    }

    #[test]
    fn mendelian_errors() -> Result<(), anyhow::Error> {
        let mut query = query(&["0/1", "1/1"]);
        query.mendelian_error_samples.insert("child".into());
        let entry = entry(&query.schema)?;
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample("child"));
        assert_eq!(starts(&filter.filter(&entry)?), vec![200, 400, 500]);

        query.only_de_novo = true;
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample("child"));
        assert_eq!(starts(&filter.filter(&entry)?), vec![200, 400]);
        assert_eq!(filter.filter_and_count(&entry)?, 2);
        Ok(())
    }

    #[test]
    fn unannotated_buckets_pass_summary() -> Result<(), anyhow::Error> {
        let mut query = query(&["0/1"]);
        query.annotation.summary_mask = summary::INTERGENIC;
        query.annotation.summary_value = summary::INTERGENIC;
        let entry = entry(&query.schema)?;
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample("child"));
        assert_eq!(starts(&filter.filter(&entry)?), vec![100, 200]);
        Ok(())
    }

    #[test]
    fn raw_entries() -> Result<(), anyhow::Error> {
        let query = query(&["1/1"]);
        let entry = entry(&query.schema)?;
        let filter = SampleIndexEntryFilter::<SampleVariantIndexEntry>::new(query.for_sample("child"));
        let result = filter.filter(&entry)?;
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].gt, "1/1");
        assert_eq!(result[0].file_index.len(), 1);
        assert_eq!(
            result[0].parents,
            Some((codec::HET_REF_UNPHASED, codec::HET_REF_UNPHASED))
        );
        assert_eq!(result[1].variant.start, 400);
        Ok(())
    }

    #[test]
    fn corrupt_stream() -> Result<(), anyhow::Error> {
        let query = query(&["0/1"]);
        let mut entry = entry(&query.schema)?;
        if let Some(bucket) = entry.gts.get_mut("0/1") {
            bucket.variants.truncate(10);
        }
        let filter = SampleIndexEntryFilter::<Variant>::new(query.for_sample("child"));
        match filter.filter(&entry) {
            Err(Error::CorruptIndex { sample, cursor, .. }) => {
                assert_eq!(sample, "child");
                assert_eq!(cursor, "1:0 gt 0/1 variant 0 of 2");
            }
            other => panic!("unexpected result {:?}", other.map(|v| v.len())),
        }
        Ok(())
    }
}
