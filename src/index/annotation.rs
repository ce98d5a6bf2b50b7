//! Conversion of variant annotations into annotation index entries.

use std::collections::HashSet;

use crate::query::variant::VariantAnnotation;

use super::config::CONFIRMED_SUFFIX;
use super::filter::IndexFieldFilter;
use super::schema::{self, summary, AnnotationIndexSchema};

/// Annotation index values of one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationIndexEntry {
    pub summary: u8,
    pub consequence_type: u32,
    pub biotype: u32,
    pub transcript_flag: u32,
    /// Biotype bits per set consequence type bit, in bit order.
    pub ct_bt: Vec<u32>,
    /// Transcript flag bits per set consequence type bit, in bit order.
    pub ct_tf: Vec<u32>,
    /// Source bits followed by significance bits.
    pub clinical: u32,
    /// Concatenated population frequency codes.
    pub population_frequency: u32,
}

impl AnnotationIndexEntry {
    pub fn is_intergenic(&self) -> bool {
        self.summary & summary::INTERGENIC != 0
    }

    pub fn has_clinical(&self) -> bool {
        self.summary & summary::CLINICAL != 0
    }
}

/// Builds annotation index entries following an annotation schema.
pub struct AnnotationIndexConverter<'a> {
    schema: &'a AnnotationIndexSchema,
}

impl<'a> AnnotationIndexConverter<'a> {
    pub fn new(schema: &'a AnnotationIndexSchema) -> Self {
        Self { schema }
    }

    pub fn convert(&self, annotation: &VariantAnnotation) -> AnnotationIndexEntry {
        let mut entry = AnnotationIndexEntry::default();
        let intergenic = annotation
            .consequence_types
            .iter()
            .all(|ct| ct.gene.is_none());
        if intergenic {
            entry.summary |= summary::INTERGENIC;
        } else {
            self.convert_consequence_types(annotation, &mut entry);
        }

        let mut offset = 0;
        for field in self.schema.population_frequencies() {
            let frequency = annotation
                .population_frequencies
                .get(field.key())
                .copied()
                .unwrap_or(0.0);
            entry.population_frequency |= field.encode_number(Some(frequency)) << offset;
            offset += field.bit_length();
        }
        let any_below_001 = self.schema.any_below_001().iter().any(|population| {
            annotation
                .population_frequencies
                .get(population)
                .copied()
                .unwrap_or(0.0)
                < 0.01
        });
        if any_below_001 {
            entry.summary |= summary::POP_FREQ_ANY_001;
        }

        if !annotation.clinical.is_empty() {
            entry.summary |= summary::CLINICAL;
            let sources = annotation
                .clinical
                .iter()
                .map(|c| c.source.as_str())
                .collect::<Vec<_>>();
            let mut significances = Vec::new();
            for assertion in &annotation.clinical {
                if let Some(significance) = &assertion.significance {
                    significances.push(significance.clone());
                    if assertion.confirmed {
                        significances.push(format!("{}{}", significance, CONFIRMED_SUFFIX));
                    }
                }
            }
            let source_bits = self.schema.clinical_source().encode_all(&sources);
            let significance_bits = self.schema.clinical_significance().encode_all(&significances);
            entry.clinical =
                source_bits | (significance_bits << self.schema.clinical_source().bit_length());
        }
        entry
    }

    fn convert_consequence_types(&self, annotation: &VariantAnnotation, entry: &mut AnnotationIndexEntry) {
        let ct_field = self.schema.consequence_type();
        let bt_field = self.schema.biotype();
        let tf_field = self.schema.transcript_flag();
        let mut rows_bt = vec![0u32; ct_field.bit_length()];
        let mut rows_tf = vec![0u32; ct_field.bit_length()];

        for ct in &annotation.consequence_types {
            let protein_coding = ct.biotype.as_deref() == Some(schema::PROTEIN_CODING);
            if protein_coding {
                entry.summary |= summary::PROTEIN_CODING;
            }
            for term in &ct.so_terms {
                if schema::is_custom_lof(term) {
                    entry.summary |= summary::CUSTOM_LOF;
                }
                if schema::is_custom_lofe(term) {
                    entry.summary |= summary::CUSTOM_LOFE;
                    if protein_coding {
                        entry.summary |= summary::CUSTOM_LOFE_PROTEIN_CODING;
                    }
                }
                if term == schema::MISSENSE {
                    entry.summary |= summary::MISSENSE;
                }
            }

            let ct_bits = ct_field.encode_all(&ct.so_terms);
            let bt_bits = ct
                .biotype
                .as_deref()
                .map(|bt| bt_field.encode_all(&[bt]))
                .unwrap_or(0);
            let tf_bits = tf_field.encode_all(&ct.flags);
            entry.consequence_type |= ct_bits;
            entry.biotype |= bt_bits;
            entry.transcript_flag |= tf_bits;
            for bit in 0..ct_field.bit_length() {
                if ct_bits & (1 << bit) != 0 {
                    rows_bt[bit] |= bt_bits;
                    rows_tf[bit] |= tf_bits;
                }
            }
        }

        if self.schema.transcript_combination() {
            for bit in 0..ct_field.bit_length() {
                if entry.consequence_type & (1 << bit) != 0 {
                    entry.ct_bt.push(rows_bt[bit]);
                    entry.ct_tf.push(rows_tf[bit]);
                }
            }
        }
    }
}

/// Whether any transcript satisfies both the consequence type filter and the
/// filter over the combined field.
///
/// `rows` holds one bit set of the combined field per set bit of `ct`.
pub fn test_combination(
    ct: u32,
    rows: &[u32],
    ct_filter: &IndexFieldFilter,
    other_filter: &IndexFieldFilter,
) -> bool {
    let mut row = 0;
    for bit in 0..32 {
        if ct & (1 << bit) == 0 {
            continue;
        }
        if ct_filter.matches_bit(bit) {
            if let Some(values) = rows.get(row) {
                if other_filter.test(*values) {
                    return true;
                }
            }
        }
        row += 1;
    }
    false
}

/// Consequence type values whose index bits are selected by a filter.
pub fn selected_terms(field: &super::IndexField, filter: &IndexFieldFilter) -> HashSet<String> {
    (0..field.bit_length())
        .filter(|bit| filter.matches_bit(*bit))
        .flat_map(|bit| field.bit_members(bit).to_vec())
        .collect()
}

#[cfg(test)]
mod test {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::index::SampleIndexSchema;
    use crate::query::ops::{split_value, FilterOp};
    use crate::query::variant::{ClinicalAssertion, ConsequenceType};

    fn ct(gene: &str, biotype: &str, terms: &[&str], flags: &[&str]) -> ConsequenceType {
        ConsequenceType {
            gene: Some(gene.into()),
            biotype: Some(biotype.into()),
            so_terms: terms.iter().map(|s| s.to_string()).collect(),
            flags: flags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn intergenic() {
        let schema = SampleIndexSchema::default_schema();
        let converter = AnnotationIndexConverter::new(schema.annotation_index());
        let entry = converter.convert(&VariantAnnotation {
            consequence_types: vec![ConsequenceType {
                so_terms: vec!["intergenic_variant".into()],
                ..Default::default()
            }],
            population_frequencies: IndexMap::from([("GNOMAD_GENOMES:ALL".to_string(), 0.2)]),
            ..Default::default()
        });
        assert!(entry.is_intergenic());
        assert_eq!(entry.consequence_type, 0);
        assert!(entry.ct_bt.is_empty());
        // 1000G:ALL is missing and counts as rare
        assert_ne!(entry.summary & summary::POP_FREQ_ANY_001, 0);
        // GNOMAD_GENOMES:ALL >= 0.01 is code 3
        assert_eq!(entry.population_frequency & 0b11, 3);
    }

    #[test]
    fn genic() {
        let schema = SampleIndexSchema::default_schema();
        let converter = AnnotationIndexConverter::new(schema.annotation_index());
        let entry = converter.convert(&VariantAnnotation {
            consequence_types: vec![
                ct("BRCA1", "protein_coding", &["missense_variant"], &["canonical"]),
                ct("BRCA1", "nonsense_mediated_decay", &["stop_gained"], &[]),
            ],
            population_frequencies: IndexMap::from([
                ("GNOMAD_GENOMES:ALL".to_string(), 0.5),
                ("1000G:ALL".to_string(), 0.3),
            ]),
            clinical: vec![ClinicalAssertion {
                source: "clinvar".into(),
                significance: Some("pathogenic".into()),
                confirmed: true,
            }],
            protein_substitution: false,
        });
        assert!(!entry.is_intergenic());
        assert!(entry.has_clinical());
        let expected_summary = summary::PROTEIN_CODING
            | summary::CUSTOM_LOF
            | summary::CUSTOM_LOFE
            | summary::CUSTOM_LOFE_PROTEIN_CODING
            | summary::MISSENSE
            | summary::CLINICAL;
        assert_eq!(entry.summary, expected_summary);
        // missense (bit 0), stop_gained (bit 4)
        assert_eq!(entry.consequence_type, 0b1_0001);
        // protein_coding (bit 0), NMD (bit 1)
        assert_eq!(entry.biotype, 0b11);
        assert_eq!(entry.ct_bt, vec![0b01, 0b10]);
        assert_eq!(entry.ct_tf, vec![0b1, 0b0]);
        // clinvar source bit, then pathogenic (bit 4) and pathogenic_confirmed (bit 9)
        assert_eq!(entry.clinical, 0b1 | (1 << (2 + 4)) | (1 << (2 + 9)));

        let ct_field = schema.annotation_index().consequence_type();
        let bt_field = schema.annotation_index().biotype();
        let missense = ct_field.build_filter(FilterOp::Eq, "missense_variant").expect("filter");
        let stop = ct_field.build_filter(FilterOp::Eq, "stop_gained").expect("filter");
        let coding = bt_field.build_filter(FilterOp::Eq, "protein_coding").expect("filter");
        assert!(test_combination(entry.consequence_type, &entry.ct_bt, &missense, &coding));
        assert!(!test_combination(entry.consequence_type, &entry.ct_bt, &stop, &coding));
    }

    #[test]
    fn selected_terms_of_filter() -> Result<(), anyhow::Error> {
        let schema = SampleIndexSchema::default_schema();
        let field = schema.annotation_index().consequence_type();
        let filter = field.build_filter_values(
            FilterOp::Eq,
            &split_value("ct", "missense_variant,inframe_deletion")?,
        )?;
        let mut terms = selected_terms(field, &filter).into_iter().collect::<Vec<_>>();
        terms.sort();
        assert_eq!(
            terms,
            vec!["inframe_deletion", "inframe_insertion", "missense_variant"]
        );
        Ok(())
    }
}
