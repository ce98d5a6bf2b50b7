//! Sample index entries and their iterators.
//!
//! One `SampleIndexEntry` holds the variants of one sample in one chromosome
//! chunk of `BATCH_SIZE` bases, grouped into one bucket per genotype.  Each
//! bucket keeps parallel streams with one element per variant: the encoded
//! variant, the annotation index entry, the file index entries, and the
//! parents code.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexMap;

use crate::index::annotation::AnnotationIndexEntry;
use crate::index::codec::split_parents_code;
use crate::index::schema::{summary, FileIndexSchema};
use crate::index::{self, BitBuffer};
use crate::query::Variant;

/// Size of the chromosome chunks covered by one entry.
pub const BATCH_SIZE: i32 = 1_000_000;

/// Mendelian error codes that stand for a de novo variant in the child.
pub const DE_NOVO_MENDELIAN_ERROR_CODES: [bool; 13] = [
    true, false, true, true, true, true, false, false, false, false, true, false, true,
];

pub fn is_de_novo(code: u8) -> bool {
    DE_NOVO_MENDELIAN_ERROR_CODES
        .get(code as usize)
        .copied()
        .unwrap_or(false)
}

/// Start of the chunk holding `position`.
pub fn batch_start(position: i32) -> i32 {
    position.max(0) / BATCH_SIZE * BATCH_SIZE
}

/// Append the encoded form of `variant` to `buf`.
///
/// Layout: start and end as little endian `i32`, then reference and
/// alternate allele, each prefixed by its length as little endian `u16`.
pub fn write_variant(buf: &mut Vec<u8>, variant: &Variant) -> Result<(), index::Error> {
    buf.extend_from_slice(&variant.start.to_le_bytes());
    buf.extend_from_slice(&variant.end.to_le_bytes());
    for allele in [&variant.reference, &variant.alternate] {
        let len = u16::try_from(allele.len()).map_err(|_| {
            index::Error::Malformed(format!("allele of {} bytes is too long", allele.len()))
        })?;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(allele.as_bytes());
    }
    Ok(())
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], index::Error> {
    let end = *pos + len;
    if end > bytes.len() {
        return Err(index::Error::Malformed(format!(
            "variant stream ends at {} but {} bytes were requested at {}",
            bytes.len(),
            len,
            pos
        )));
    }
    let result = &bytes[*pos..end];
    *pos = end;
    Ok(result)
}

fn read_allele(bytes: &[u8], pos: &mut usize) -> Result<String, index::Error> {
    let len = LittleEndian::read_u16(take(bytes, pos, 2)?) as usize;
    String::from_utf8(take(bytes, pos, len)?.to_vec())
        .map_err(|e| index::Error::Malformed(format!("allele is not UTF-8: {}", e)))
}

/// Decode the variant at `pos` and move `pos` past it.
pub fn read_variant(chromosome: &str, bytes: &[u8], pos: &mut usize) -> Result<Variant, index::Error> {
    let start = LittleEndian::read_i32(take(bytes, pos, 4)?);
    let end = LittleEndian::read_i32(take(bytes, pos, 4)?);
    let reference = read_allele(bytes, pos)?;
    let alternate = read_allele(bytes, pos)?;
    Ok(Variant::new(chromosome, start, reference, alternate).with_end(end))
}

fn skip_variant(bytes: &[u8], pos: &mut usize) -> Result<(), index::Error> {
    take(bytes, pos, 8)?;
    for _ in 0..2 {
        let len = LittleEndian::read_u16(take(bytes, pos, 2)?) as usize;
        take(bytes, pos, len)?;
    }
    Ok(())
}

/// Variants of one sample with one genotype in one chunk.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SampleIndexGtEntry {
    pub gt: String,
    /// Number of variants in the bucket.
    pub count: usize,
    /// Encoded variants in genomic order.
    pub variants: Vec<u8>,
    /// Annotation index entry per variant; `None` if the bucket is not
    /// annotated.
    pub annotation: Option<Vec<AnnotationIndexEntry>>,
    /// Number of variants per summary bit, in bit order.
    pub annotation_counts: Option<Vec<u32>>,
    /// File index entries; every variant has at least one, and bit 0 of an
    /// entry tells whether another one of the same variant follows.
    pub file_index: BitBuffer,
    /// Joined father and mother code per variant.
    pub parents: Option<Vec<u8>>,
}

impl SampleIndexGtEntry {
    pub fn new(gt: impl Into<String>) -> Self {
        Self {
            gt: gt.into(),
            ..Default::default()
        }
    }

    /// Number of variants with all bits of `mask` set in their summary.
    pub fn annotation_count(&self, mask: u8) -> Option<u32> {
        let counts = self.annotation_counts.as_ref()?;
        (0..summary::NUM_BITS)
            .filter(|bit| mask & (1 << bit) != 0)
            .map(|bit| counts.get(bit).copied().unwrap_or(0))
            .min()
    }
}

/// Mendelian error of the child at one variant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MendelianErrorRecord {
    /// Bucket holding the variant.
    pub gt: String,
    /// Position of the variant in the bucket.
    pub index: usize,
    pub code: u8,
}

/// Index entry of one sample in one chromosome chunk.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SampleIndexEntry {
    pub sample: String,
    pub chromosome: String,
    pub batch_start: i32,
    pub gts: IndexMap<String, SampleIndexGtEntry>,
    /// Number of variants with different calls in different files.
    pub discrepancies: usize,
    /// Mendelian errors in genomic order.
    pub mendelian_errors: Vec<MendelianErrorRecord>,
}

impl SampleIndexEntry {
    pub fn new(sample: impl Into<String>, chromosome: impl Into<String>, batch_start: i32) -> Self {
        Self {
            sample: sample.into(),
            chromosome: chromosome.into(),
            batch_start,
            ..Default::default()
        }
    }

    /// Iterator over the bucket of `gt`, if present.
    pub fn iter_gt<'a>(
        &'a self,
        gt: &str,
        file_schema: &'a FileIndexSchema,
    ) -> Option<SampleIndexGtEntryIterator<'a>> {
        self.gts
            .get(gt)
            .map(|bucket| SampleIndexGtEntryIterator::new(self, bucket, file_schema))
    }

    pub fn mendelian_errors<'a>(
        &'a self,
        file_schema: &'a FileIndexSchema,
    ) -> MendelianErrorIterator<'a> {
        MendelianErrorIterator::new(self, file_schema)
    }
}

/// Cursor over the variants of one genotype bucket.
///
/// The streams of the bucket are read in lock step; the current variant is
/// described by `next_index`.
#[derive(Debug, Clone)]
pub struct SampleIndexGtEntryIterator<'a> {
    entry: &'a SampleIndexEntry,
    bucket: &'a SampleIndexGtEntry,
    file_schema: &'a FileIndexSchema,
    index: usize,
    variant_offset: usize,
    file_offset: usize,
}

impl<'a> SampleIndexGtEntryIterator<'a> {
    pub fn new(
        entry: &'a SampleIndexEntry,
        bucket: &'a SampleIndexGtEntry,
        file_schema: &'a FileIndexSchema,
    ) -> Self {
        Self {
            entry,
            bucket,
            file_schema,
            index: 0,
            variant_offset: 0,
            file_offset: 0,
        }
    }

    pub fn gt(&self) -> &'a str {
        &self.bucket.gt
    }

    pub fn bucket(&self) -> &'a SampleIndexGtEntry {
        self.bucket
    }

    pub fn has_next(&self) -> bool {
        self.index < self.bucket.count
    }

    pub fn next_index(&self) -> usize {
        self.index
    }

    /// Annotation of the current variant; `None` for unannotated buckets.
    pub fn annotation(&self) -> Result<Option<&'a AnnotationIndexEntry>, index::Error> {
        match &self.bucket.annotation {
            None => Ok(None),
            Some(entries) => entries.get(self.index).map(Some).ok_or_else(|| {
                index::Error::Malformed(format!(
                    "annotation stream holds {} of {} entries",
                    entries.len(),
                    self.bucket.count
                ))
            }),
        }
    }

    /// File index entries of the current variant and the bits they take.
    fn read_file_entries(&self) -> Result<(Vec<BitBuffer>, usize), index::Error> {
        let length = self.file_schema.bit_length();
        let mut offset = self.file_offset;
        let mut entries = Vec::new();
        loop {
            let entry = self.bucket.file_index.slice(offset, length)?;
            offset += length;
            let more = self.file_schema.is_multi_file(&entry)?;
            entries.push(entry);
            if !more {
                break;
            }
        }
        Ok((entries, offset - self.file_offset))
    }

    pub fn file_entries(&self) -> Result<Vec<BitBuffer>, index::Error> {
        Ok(self.read_file_entries()?.0)
    }

    /// `(father, mother)` codes of the current variant, if the bucket has a
    /// parents stream.
    pub fn parents(&self) -> Result<Option<(u8, u8)>, index::Error> {
        match &self.bucket.parents {
            None => Ok(None),
            Some(codes) => codes
                .get(self.index)
                .map(|code| Some(split_parents_code(*code)))
                .ok_or_else(|| {
                    index::Error::Malformed(format!(
                        "parents stream holds {} of {} entries",
                        codes.len(),
                        self.bucket.count
                    ))
                }),
        }
    }

    /// Decode the current variant and move to the next one.
    pub fn next_variant(&mut self) -> Result<Variant, index::Error> {
        let (_, bits) = self.read_file_entries()?;
        let mut offset = self.variant_offset;
        let variant = read_variant(&self.entry.chromosome, &self.bucket.variants, &mut offset)?;
        self.variant_offset = offset;
        self.file_offset += bits;
        self.index += 1;
        Ok(variant)
    }

    /// Move to the next variant without decoding the current one.
    pub fn skip(&mut self) -> Result<(), index::Error> {
        let (_, bits) = self.read_file_entries()?;
        skip_variant(&self.bucket.variants, &mut self.variant_offset)?;
        self.file_offset += bits;
        self.index += 1;
        Ok(())
    }

    /// Skip forward until `index` is the current variant.
    pub fn advance_to(&mut self, index: usize) -> Result<(), index::Error> {
        if index < self.index || index >= self.bucket.count {
            return Err(index::Error::Malformed(format!(
                "can not move from variant {} to {} of {}",
                self.index, index, self.bucket.count
            )));
        }
        while self.index < index {
            self.skip()?;
        }
        Ok(())
    }
}

impl std::fmt::Display for SampleIndexGtEntryIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} gt {} variant {} of {}",
            self.entry.chromosome,
            self.entry.batch_start,
            self.bucket.gt,
            self.index,
            self.bucket.count
        )
    }
}

/// Walks the Mendelian error records of an entry, positioning one iterator
/// per genotype bucket on the variant of each record.
pub struct MendelianErrorIterator<'a> {
    entry: &'a SampleIndexEntry,
    file_schema: &'a FileIndexSchema,
    records: std::slice::Iter<'a, MendelianErrorRecord>,
    iterators: HashMap<&'a str, SampleIndexGtEntryIterator<'a>>,
}

impl<'a> MendelianErrorIterator<'a> {
    pub fn new(entry: &'a SampleIndexEntry, file_schema: &'a FileIndexSchema) -> Self {
        Self {
            entry,
            file_schema,
            records: entry.mendelian_errors.iter(),
            iterators: HashMap::new(),
        }
    }

    pub fn next_record(&mut self) -> Option<&'a MendelianErrorRecord> {
        self.records.next()
    }

    /// Iterator over the bucket of `record`, positioned on its variant.
    pub fn position(
        &mut self,
        record: &'a MendelianErrorRecord,
    ) -> Result<&mut SampleIndexGtEntryIterator<'a>, index::Error> {
        let entry = self.entry;
        let file_schema = self.file_schema;
        let bucket = entry.gts.get(&record.gt).ok_or_else(|| {
            index::Error::Malformed(format!("no bucket for genotype {}", record.gt))
        })?;
        let iter = self
            .iterators
            .entry(record.gt.as_str())
            .or_insert_with(|| SampleIndexGtEntryIterator::new(entry, bucket, file_schema));
        iter.advance_to(record.index)?;
        Ok(iter)
    }
}
