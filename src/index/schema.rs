//! Layout of the sample index: file index entries and annotation index fields.

use crate::query::variant::VariantType;
use crate::query::Variant;

use super::config::{IndexFieldConfiguration, SampleIndexConfiguration, Source};
use super::field::IndexField;
use super::filter::{FieldLocation, IndexFieldFilter};
use super::{BitBuffer, Error};

/// Bits of the per-variant annotation summary byte.
pub mod summary {
    pub const PROTEIN_CODING: u8 = 1 << 0;
    pub const CUSTOM_LOFE_PROTEIN_CODING: u8 = 1 << 1;
    pub const CUSTOM_LOF: u8 = 1 << 2;
    pub const MISSENSE: u8 = 1 << 3;
    pub const CUSTOM_LOFE: u8 = 1 << 4;
    pub const INTERGENIC: u8 = 1 << 5;
    pub const POP_FREQ_ANY_001: u8 = 1 << 6;
    pub const CLINICAL: u8 = 1 << 7;

    pub const NUM_BITS: usize = 8;
}

/// Loss-of-function consequence types.
pub const CUSTOM_LOF: &[&str] = &[
    "frameshift_variant",
    "incomplete_terminal_codon_variant",
    "start_lost",
    "stop_gained",
    "stop_lost",
    "splice_acceptor_variant",
    "splice_donor_variant",
    "feature_truncation",
    "transcript_ablation",
];

/// Consequence types added to `CUSTOM_LOF` for the extended set.
pub const CUSTOM_LOFE_EXTRA: &[&str] = &[
    "missense_variant",
    "inframe_deletion",
    "inframe_insertion",
    "splice_region_variant",
    "transcript_amplification",
    "stop_retained_variant",
];

pub const MISSENSE: &str = "missense_variant";
pub const PROTEIN_CODING: &str = "protein_coding";
pub const INTERGENIC_VARIANT: &str = "intergenic_variant";
/// Terms that can be found outside of genes.
pub const NON_GENIC_TERMS: &[&str] = &[
    "intergenic_variant",
    "regulatory_region_variant",
    "TF_binding_site_variant",
];

/// Whether `ct` is a loss-of-function term.
pub fn is_custom_lof(ct: &str) -> bool {
    CUSTOM_LOF.contains(&ct)
}

/// Whether `ct` is a loss-of-function or missense-like term.
pub fn is_custom_lofe(ct: &str) -> bool {
    is_custom_lof(ct) || CUSTOM_LOFE_EXTRA.contains(&ct)
}

/// Whether the index stores variants of samples with genotype `gt`.
///
/// Reference-only, all-missing, and negated genotypes are not indexed.
pub fn valid_genotype(gt: &str) -> bool {
    if crate::query::ops::is_negated(gt) {
        return false;
    }
    match gt.parse::<crate::query::genotype::Genotype>() {
        Ok(parsed) => parsed.has_alt(),
        Err(_) => false,
    }
}

/// Types distinguished by the file index, in code order.
const INDEXED_TYPES: &[VariantType] = &[
    VariantType::Snv,
    VariantType::Mnv,
    VariantType::Indel,
    VariantType::Insertion,
    VariantType::Deletion,
    VariantType::Inversion,
    VariantType::Duplication,
    VariantType::TandemDuplication,
    VariantType::Breakend,
    VariantType::CopyNumber,
];

pub const TYPE_KEY: &str = "type";
pub const FILE_POSITION_KEY: &str = "filePosition";

/// Layout of one file index entry.
///
/// Bit 0 tells whether another entry for the same variant follows; then come
/// the file position, the variant type, and the custom fields.
#[derive(Debug, Clone)]
pub struct FileIndexSchema {
    file_position: FieldLocation,
    type_field: IndexField,
    custom_fields: Vec<IndexField>,
    bit_length: usize,
}

impl FileIndexSchema {
    pub fn new(
        file_position_bits: usize,
        custom_fields: &[IndexFieldConfiguration],
    ) -> Result<Self, Error> {
        if file_position_bits == 0 || file_position_bits > 6 {
            return Err(Error::InvalidField {
                key: FILE_POSITION_KEY.into(),
                reason: format!("{} bits not in 1..=6", file_position_bits),
            });
        }
        let file_position = FieldLocation {
            offset: 1,
            length: file_position_bits,
        };
        let type_config = IndexFieldConfiguration::categorical(
            Source::File,
            TYPE_KEY,
            &INDEXED_TYPES
                .iter()
                .map(VariantType::as_ref)
                .collect::<Vec<&str>>(),
        )
        .with_mapping(
            VariantType::CopyNumber.as_ref(),
            &[
                VariantType::CopyNumber.as_ref(),
                VariantType::CopyNumberGain.as_ref(),
                VariantType::CopyNumberLoss.as_ref(),
            ],
        );
        let type_field = IndexField::new(type_config, 1 + file_position_bits)?;
        let mut offset = type_field.location().offset + type_field.bit_length();
        let mut fields = Vec::with_capacity(custom_fields.len());
        for config in custom_fields {
            if config.source == Source::Annotation {
                return Err(Error::InvalidField {
                    key: config.key.clone(),
                    reason: "annotation fields are not part of the file index".into(),
                });
            }
            if fields
                .iter()
                .any(|f: &IndexField| f.source() == config.source && f.key() == config.key)
            {
                return Err(Error::InvalidField {
                    key: config.key.clone(),
                    reason: "duplicate field".into(),
                });
            }
            let field = IndexField::new(config.clone(), offset)?;
            offset += field.bit_length();
            fields.push(field);
        }
        Ok(Self {
            file_position,
            type_field,
            custom_fields: fields,
            bit_length: offset,
        })
    }

    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    /// Maximum number of files per sample the position field can address.
    pub fn max_files(&self) -> usize {
        1 << self.file_position.length
    }

    pub fn type_field(&self) -> &IndexField {
        &self.type_field
    }

    pub fn custom_fields(&self) -> &[IndexField] {
        &self.custom_fields
    }

    pub fn custom_field(&self, source: Source, key: &str) -> Option<&IndexField> {
        self.custom_fields
            .iter()
            .find(|f| f.source() == source && f.key() == key)
    }

    pub fn is_multi_file(&self, entry: &BitBuffer) -> Result<bool, Error> {
        entry.get_bit(0)
    }

    pub fn set_multi_file(&self, entry: &mut BitBuffer, multi_file: bool) -> Result<(), Error> {
        entry.write(0, 1, u32::from(multi_file))
    }

    pub fn file_position(&self, entry: &BitBuffer) -> Result<u32, Error> {
        entry.read(self.file_position.offset, self.file_position.length)
    }

    /// Filter accepting entries of the files at the given positions.
    pub fn file_position_filter(&self, positions: &[usize]) -> IndexFieldFilter {
        IndexFieldFilter::Codes {
            key: FILE_POSITION_KEY.into(),
            location: self.file_position,
            accepted: positions
                .iter()
                .filter(|p| **p < 64)
                .fold(0u64, |acc, p| acc | (1 << p)),
            exact: true,
        }
    }

    /// Encode the file index entry of `variant` as loaded from the file at
    /// `file_position`.
    ///
    /// File fields are read from the file data of the variant and sample
    /// fields from `sample_data`.
    pub fn encode(
        &self,
        variant: &Variant,
        file_position: usize,
        sample_data: &indexmap::IndexMap<String, String>,
    ) -> Result<BitBuffer, Error> {
        if file_position >= self.max_files() {
            return Err(Error::InvalidOperand {
                key: FILE_POSITION_KEY.into(),
                value: file_position.to_string(),
            });
        }
        let mut entry = BitBuffer::new(self.bit_length);
        entry.write(
            self.file_position.offset,
            self.file_position.length,
            file_position as u32,
        )?;
        let variant_type = variant.variant_type();
        self.type_field.write(
            &mut entry,
            self.type_field.encode(Some(variant_type.as_ref()))?,
        )?;
        for field in &self.custom_fields {
            let value = match field.source() {
                Source::Sample => sample_data.get(field.key()),
                _ => variant.file_data.get(field.key()),
            };
            field.write(&mut entry, field.encode(value.map(String::as_str))?)?;
        }
        Ok(entry)
    }
}

/// Layout of the annotation index.
#[derive(Debug, Clone)]
pub struct AnnotationIndexSchema {
    consequence_type: IndexField,
    biotype: IndexField,
    transcript_flag: IndexField,
    clinical_source: IndexField,
    clinical_significance: IndexField,
    population_frequencies: Vec<IndexField>,
    any_below_001: Vec<String>,
    transcript_combination: bool,
}

impl AnnotationIndexSchema {
    fn new(config: &super::config::AnnotationIndexConfiguration) -> Result<Self, Error> {
        let clinical_source = IndexField::new(config.clinical_source.clone(), 0)?;
        let clinical_significance =
            IndexField::new(config.clinical_significance.clone(), clinical_source.bit_length())?;
        let mut population_frequencies = Vec::new();
        let mut offset = 0;
        for population in &config.population_frequency.populations {
            let field = IndexField::new(
                IndexFieldConfiguration::range(
                    Source::Annotation,
                    population,
                    &config.population_frequency.thresholds,
                )
                .with_domain(0.0, 1.0),
                offset,
            )?;
            offset += field.bit_length();
            population_frequencies.push(field);
        }
        if offset > 32 {
            return Err(Error::InvalidField {
                key: "populationFrequency".into(),
                reason: format!("{} bits exceed 32", offset),
            });
        }
        Ok(Self {
            consequence_type: IndexField::new(config.consequence_type.clone(), 0)?,
            biotype: IndexField::new(config.biotype.clone(), 0)?,
            transcript_flag: IndexField::new(config.transcript_flag.clone(), 0)?,
            clinical_source,
            clinical_significance,
            population_frequencies,
            any_below_001: config.population_frequency.any_below_001.clone(),
            transcript_combination: config.transcript_combination,
        })
    }

    pub fn consequence_type(&self) -> &IndexField {
        &self.consequence_type
    }

    pub fn biotype(&self) -> &IndexField {
        &self.biotype
    }

    pub fn transcript_flag(&self) -> &IndexField {
        &self.transcript_flag
    }

    pub fn clinical_source(&self) -> &IndexField {
        &self.clinical_source
    }

    pub fn clinical_significance(&self) -> &IndexField {
        &self.clinical_significance
    }

    pub fn clinical_bit_length(&self) -> usize {
        self.clinical_source.bit_length() + self.clinical_significance.bit_length()
    }

    pub fn population_frequencies(&self) -> &[IndexField] {
        &self.population_frequencies
    }

    pub fn population_frequency(&self, population: &str) -> Option<&IndexField> {
        self.population_frequencies
            .iter()
            .find(|f| f.key() == population)
    }

    pub fn population_frequency_bit_length(&self) -> usize {
        self.population_frequencies
            .iter()
            .map(IndexField::bit_length)
            .sum()
    }

    /// Populations contributing to the `POP_FREQ_ANY_001` summary bit.
    pub fn any_below_001(&self) -> &[String] {
        &self.any_below_001
    }

    pub fn transcript_combination(&self) -> bool {
        self.transcript_combination
    }
}

/// Layout of the whole sample index.
#[derive(Debug, Clone)]
pub struct SampleIndexSchema {
    file_index: FileIndexSchema,
    annotation_index: AnnotationIndexSchema,
}

impl SampleIndexSchema {
    pub fn new(config: &SampleIndexConfiguration) -> Result<Self, Error> {
        Ok(Self {
            file_index: FileIndexSchema::new(
                config.file_index.file_position_bits,
                &config.file_index.custom_fields,
            )?,
            annotation_index: AnnotationIndexSchema::new(&config.annotation_index)?,
        })
    }

    /// Schema of the default configuration.
    pub fn default_schema() -> Self {
        Self::new(&SampleIndexConfiguration::default()).expect("default configuration is valid")
    }

    pub fn file_index(&self) -> &FileIndexSchema {
        &self.file_index
    }

    pub fn annotation_index(&self) -> &AnnotationIndexSchema {
        &self.annotation_index
    }
}
