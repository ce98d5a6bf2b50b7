//! Build sample index entries from decoded variant records.

use indexmap::IndexMap;

use crate::index::annotation::AnnotationIndexConverter;
use crate::index::codec::{self, is_ambiguous_code, join_parents_code};
use crate::index::schema::{summary, valid_genotype};
use crate::index::SampleIndexSchema;
use crate::query::genotype::Genotype;
use crate::query::Variant;

use super::entry::{
    batch_start, write_variant, MendelianErrorRecord, SampleIndexEntry, SampleIndexGtEntry,
};
use super::metadata::{IndexStatus, SampleMetadata, StudyMetadata};
use super::Error;

/// Genotype of a sample without a call.
const NO_CALL: &str = "0/0";

/// Mendelian error code of a child call given the parent calls.
///
/// `None` stands for a parent that is not in the pedigree; missing calls are
/// treated the same way. Returns 0 for calls consistent with the parents.
pub fn mendelian_error_code(
    father: Option<&Genotype>,
    mother: Option<&Genotype>,
    child: &Genotype,
) -> u8 {
    let father = father.filter(|gt| !gt.is_missing());
    let mother = mother.filter(|gt| !gt.is_missing());
    let hom_ref = |gt: Option<&Genotype>| gt.map_or(false, Genotype::is_hom_ref);
    let hom_alt = |gt: Option<&Genotype>| gt.map_or(false, Genotype::is_hom_alt);

    if child.is_missing() {
        0
    } else if child.is_het() {
        if hom_alt(father) && hom_alt(mother) {
            1
        } else if hom_ref(father) && hom_ref(mother) {
            2
        } else {
            0
        }
    } else if child.is_hom_alt() {
        match (father, mother) {
            (Some(f), Some(m)) if f.is_hom_ref() && m.is_hom_ref() => 5,
            (Some(f), Some(_)) if f.is_hom_ref() => 3,
            (Some(_), Some(m)) if m.is_hom_ref() => 4,
            (None, Some(m)) if m.is_hom_ref() => 10,
            (Some(f), None) if f.is_hom_ref() => 12,
            _ => 0,
        }
    } else if child.is_hom_ref() {
        match (father, mother) {
            (Some(f), Some(m)) if f.is_hom_alt() && m.is_hom_alt() => 8,
            (Some(f), Some(_)) if f.is_hom_alt() => 6,
            (Some(_), Some(m)) if m.is_hom_alt() => 7,
            (None, Some(m)) if m.is_hom_alt() => 9,
            (Some(f), None) if f.is_hom_alt() => 11,
            _ => 0,
        }
    } else {
        0
    }
}

/// Parents of a sample with a family index.
#[derive(Debug, Clone, Copy)]
struct Family<'a> {
    father: Option<&'a SampleMetadata>,
    mother: Option<&'a SampleMetadata>,
}

impl Family<'_> {
    fn has_call(&self, record: &Variant) -> bool {
        [self.father, self.mother]
            .iter()
            .flatten()
            .any(|parent| record.genotypes.contains_key(&parent.name))
    }
}

/// Whether `record` was loaded from a file of `sample`.
fn in_files_of(sample: &SampleMetadata, record: &Variant) -> bool {
    match &record.file {
        Some(file) => sample.files.contains(file),
        None => sample.files.is_empty(),
    }
}

/// Encodes the decoded records of a study into sample index entries.
pub struct SampleIndexBuilder<'a> {
    schema: &'a SampleIndexSchema,
    study: &'a StudyMetadata,
}

impl<'a> SampleIndexBuilder<'a> {
    pub fn new(schema: &'a SampleIndexSchema, study: &'a StudyMetadata) -> Self {
        Self { schema, study }
    }

    /// Entries of every sample of the study.
    pub fn build(&self, records: &[Variant]) -> Result<IndexMap<String, Vec<SampleIndexEntry>>, Error> {
        let mut result = IndexMap::new();
        for sample in self.study.samples.values() {
            result.insert(sample.name.clone(), self.build_sample(sample, records)?);
        }
        Ok(result)
    }

    /// Entries of one sample in genomic order.
    pub fn build_sample(
        &self,
        sample: &SampleMetadata,
        records: &[Variant],
    ) -> Result<Vec<SampleIndexEntry>, Error> {
        let family = self.family_of(sample);
        let mut relevant = records
            .iter()
            .filter(|r| {
                r.genotypes.contains_key(&sample.name) || family.map_or(false, |f| f.has_call(r))
            })
            .collect::<Vec<_>>();
        relevant.sort_by(|a, b| a.genomic_cmp(b));

        let mut entries = Vec::new();
        let mut start = 0;
        while start < relevant.len() {
            let mut end = start + 1;
            while end < relevant.len() && relevant[start].same_genomic_variant(relevant[end]) {
                end += 1;
            }
            self.add_variant(sample, family, &relevant[start..end], &mut entries)?;
            start = end;
        }

        for entry in &mut entries {
            for bucket in entry.gts.values_mut() {
                bucket.annotation_counts = bucket.annotation.as_ref().map(|annotations| {
                    (0..summary::NUM_BITS)
                        .map(|bit| {
                            annotations
                                .iter()
                                .filter(|a| a.summary & (1 << bit) != 0)
                                .count() as u32
                        })
                        .collect()
                });
            }
        }
        tracing::debug!(
            "built {} entries for sample {} from {} records",
            entries.len(),
            sample.name,
            relevant.len()
        );
        Ok(entries)
    }

    fn family_of(&self, sample: &SampleMetadata) -> Option<Family<'a>> {
        if sample.family_index != IndexStatus::Ready
            || (sample.father.is_none() && sample.mother.is_none())
        {
            return None;
        }
        let lookup = |name: &Option<String>| name.as_ref().and_then(|n| self.study.samples.get(n));
        Some(Family {
            father: lookup(&sample.father),
            mother: lookup(&sample.mother),
        })
    }

    /// Add the records of one genomic variant.
    fn add_variant(
        &self,
        sample: &SampleMetadata,
        family: Option<Family<'_>>,
        group: &[&Variant],
        entries: &mut Vec<SampleIndexEntry>,
    ) -> Result<(), Error> {
        let calls = group
            .iter()
            .filter_map(|r| r.genotypes.get(&sample.name).map(|gt| (*r, gt.as_str())))
            .collect::<Vec<_>>();
        let valid = calls
            .iter()
            .filter(|(_, gt)| valid_genotype(gt))
            .copied()
            .collect::<Vec<_>>();
        let parents = family.map(|f| {
            join_parents_code(
                self.parent_code(f.father, group),
                self.parent_code(f.mother, group),
            )
        });

        let mut distinct: Vec<&str> = Vec::new();
        for (_, gt) in &valid {
            if !distinct.contains(gt) {
                distinct.push(gt);
            }
        }
        if distinct.len() > 1 {
            entry_for(entries, &sample.name, group[0]).discrepancies += 1;
        }
        let mut first_bucket = None;
        for gt in &distinct {
            let records = valid
                .iter()
                .filter(|(_, g)| g == gt)
                .map(|(r, _)| *r)
                .collect::<Vec<_>>();
            let index = self.push_variant(entries, sample, gt, &records, parents, true)?;
            first_bucket.get_or_insert_with(|| (gt.to_string(), index));
        }

        let family = match family {
            Some(family) => family,
            None => return Ok(()),
        };
        let child_gt = valid
            .first()
            .or_else(|| calls.first())
            .map(|(_, gt)| *gt)
            .unwrap_or(NO_CALL);
        let code = match child_gt.parse::<Genotype>() {
            Ok(child) => mendelian_error_code(
                parent_genotype(family.father, group).as_ref(),
                parent_genotype(family.mother, group).as_ref(),
                &child,
            ),
            Err(_) => 0,
        };
        if code == 0 {
            return Ok(());
        }
        let (gt, index) = match first_bucket {
            Some(bucket) => bucket,
            None => {
                // child call not indexed, read from the child's or a parent's record
                let records = match calls.iter().find(|(_, gt)| *gt == child_gt) {
                    Some((record, _)) => vec![*record],
                    None => vec![group
                        .iter()
                        .find(|r| family.has_call(r))
                        .copied()
                        .unwrap_or(group[0])],
                };
                let index = self.push_variant(entries, sample, child_gt, &records, parents, false)?;
                (child_gt.to_string(), index)
            }
        };
        entry_for(entries, &sample.name, group[0])
            .mendelian_errors
            .push(MendelianErrorRecord { gt, index, code });
        Ok(())
    }

    /// Append one variant to the bucket of `gt`, returning its position.
    fn push_variant(
        &self,
        entries: &mut Vec<SampleIndexEntry>,
        sample: &SampleMetadata,
        gt: &str,
        records: &[&Variant],
        parents: Option<u8>,
        annotated: bool,
    ) -> Result<usize, Error> {
        let first = records[0];
        let entry = entry_for(entries, &sample.name, first);
        let bucket = entry.gts.entry(gt.to_string()).or_insert_with(|| {
            let mut bucket = SampleIndexGtEntry::new(gt);
            bucket.annotation = annotated.then(Vec::new);
            bucket.parents = parents.map(|_| Vec::new());
            bucket
        });

        let index = bucket.count;
        write_variant(&mut bucket.variants, first)?;
        let file_schema = self.schema.file_index();
        let no_data = IndexMap::new();
        for (i, record) in records.iter().enumerate() {
            let position = record
                .file
                .as_deref()
                .and_then(|f| sample.file_position(f))
                .unwrap_or(0);
            let sample_data = record.sample_data.get(&sample.name).unwrap_or(&no_data);
            let mut file_entry = file_schema.encode(record, position, sample_data)?;
            file_schema.set_multi_file(&mut file_entry, i + 1 < records.len())?;
            bucket.file_index.append(&file_entry)?;
        }

        let annotation = first
            .annotation
            .as_ref()
            .filter(|_| annotated)
            .map(|a| AnnotationIndexConverter::new(self.schema.annotation_index()).convert(a));
        bucket.annotation = match (bucket.annotation.take(), annotation) {
            (Some(mut annotations), Some(annotation)) => {
                annotations.push(annotation);
                Some(annotations)
            }
            _ => None,
        };
        if let (Some(codes), Some(code)) = (bucket.parents.as_mut(), parents) {
            codes.push(code);
        }
        bucket.count += 1;
        Ok(index)
    }

    /// Genotype code of a parent at one variant.
    fn parent_code(&self, parent: Option<&SampleMetadata>, group: &[&Variant]) -> u8 {
        let parent = match parent {
            Some(parent) => parent,
            None => return codec::UNKNOWN,
        };
        let mut codes = group
            .iter()
            .filter_map(|r| r.genotypes.get(&parent.name))
            .map(|gt| codec::encode(gt))
            .collect::<Vec<_>>();
        codes.dedup();
        match codes.as_slice() {
            [] if group.iter().any(|r| in_files_of(parent, r)) => codec::HOM_REF_UNPHASED,
            [] => codec::UNKNOWN,
            [code] => *code,
            _ if codes.iter().all(|c| !is_ambiguous_code(*c as usize)) => {
                codec::DISCREPANCY_SIMPLE
            }
            _ => codec::DISCREPANCY_ANY,
        }
    }
}

/// Call of a parent at one variant; parents without a call are hom-ref.
fn parent_genotype(parent: Option<&SampleMetadata>, group: &[&Variant]) -> Option<Genotype> {
    let parent = parent?;
    let gt = group
        .iter()
        .find_map(|r| r.genotypes.get(&parent.name))
        .map(String::as_str)
        .unwrap_or(NO_CALL);
    gt.parse().ok()
}

/// The entry holding `variant`, appended if it starts a new chunk.
fn entry_for<'e>(
    entries: &'e mut Vec<SampleIndexEntry>,
    sample: &str,
    variant: &Variant,
) -> &'e mut SampleIndexEntry {
    let chunk = batch_start(variant.start);
    match entries.last() {
        Some(last) if last.chromosome == variant.chromosome && last.batch_start == chunk => (),
        _ => entries.push(SampleIndexEntry::new(sample, &variant.chromosome, chunk)),
    }
    let last = entries.len() - 1;
    &mut entries[last]
}
