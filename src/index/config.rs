//! Configuration of the sample index layout.

use indexmap::IndexMap;

/// Where the value of an index field comes from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    /// File-level data, e.g. `FILTER`, `QUAL`, INFO fields.
    File,
    /// Sample-level data, e.g. `DP` from the FORMAT column.
    Sample,
    /// Variant annotation.
    Annotation,
}

/// Encoding of an index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexFieldType {
    /// One code per value (group), plus a code for all other values.
    Categorical,
    /// One bit per value (group).
    CategoricalMultiValue,
    /// Value ranges delimited by thresholds.
    Range,
}

/// Configuration of one index field.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndexFieldConfiguration {
    pub source: Source,
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: IndexFieldType,
    /// Range thresholds; code `i` holds values in `[thresholds[i-1], thresholds[i])`.
    #[serde(default)]
    pub thresholds: Vec<f64>,
    /// Categorical values, one code or bit each.
    #[serde(default)]
    pub values: Vec<String>,
    /// Values sharing the code of a configured value.
    #[serde(default)]
    pub values_mapping: IndexMap<String, Vec<String>>,
    /// Whether missing values get their own code.
    #[serde(default)]
    pub nullable: bool,
    /// Whether the field only holds integers.
    #[serde(default)]
    pub integer: bool,
    /// Lower bound of the value domain.
    pub min: Option<f64>,
    /// Upper bound of the value domain.
    pub max: Option<f64>,
}

impl IndexFieldConfiguration {
    pub fn categorical(source: Source, key: &str, values: &[&str]) -> Self {
        Self {
            source,
            key: key.to_string(),
            field_type: IndexFieldType::Categorical,
            thresholds: Vec::new(),
            values: values.iter().map(|s| s.to_string()).collect(),
            values_mapping: IndexMap::new(),
            nullable: false,
            integer: false,
            min: None,
            max: None,
        }
    }

    pub fn multi_value(source: Source, key: &str, values: &[&str]) -> Self {
        Self {
            field_type: IndexFieldType::CategoricalMultiValue,
            ..Self::categorical(source, key, values)
        }
    }

    pub fn range(source: Source, key: &str, thresholds: &[f64]) -> Self {
        Self {
            field_type: IndexFieldType::Range,
            thresholds: thresholds.to_vec(),
            ..Self::categorical(source, key, &[])
        }
    }

    pub fn with_mapping(mut self, value: &str, members: &[&str]) -> Self {
        self.values_mapping.insert(
            value.to_string(),
            members.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_integer(mut self, integer: bool) -> Self {
        self.integer = integer;
        self
    }

    pub fn with_domain(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// Layout of the per-variant file index entries.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileIndexConfiguration {
    /// Bits of the position of the file among the files of the sample.
    pub file_position_bits: usize,
    /// File and sample data fields.
    pub custom_fields: Vec<IndexFieldConfiguration>,
}

impl Default for FileIndexConfiguration {
    fn default() -> Self {
        Self {
            file_position_bits: 3,
            custom_fields: vec![
                IndexFieldConfiguration::categorical(Source::File, "FILTER", &["PASS"]),
                IndexFieldConfiguration::range(Source::File, "QUAL", &[10.0, 20.0, 30.0])
                    .with_nullable(true),
                IndexFieldConfiguration::range(
                    Source::File,
                    "DP",
                    &[5.0, 10.0, 15.0, 20.0, 30.0, 40.0, 50.0],
                )
                .with_integer(true)
                .with_domain(0.0, f64::INFINITY),
                IndexFieldConfiguration::range(
                    Source::Sample,
                    "DP",
                    &[5.0, 10.0, 15.0, 20.0, 30.0, 40.0, 50.0],
                )
                .with_integer(true)
                .with_nullable(true)
                .with_domain(0.0, f64::INFINITY),
            ],
        }
    }
}

/// Population frequency part of the annotation index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PopulationFrequencyIndexConfiguration {
    /// Populations as `STUDY:POPULATION`.
    pub populations: Vec<String>,
    pub thresholds: Vec<f64>,
    /// Populations contributing to the "any population below 0.01" summary bit.
    pub any_below_001: Vec<String>,
}

impl Default for PopulationFrequencyIndexConfiguration {
    fn default() -> Self {
        Self {
            populations: vec![
                "GNOMAD_GENOMES:ALL".into(),
                "GNOMAD_EXOMES:ALL".into(),
                "1000G:ALL".into(),
            ],
            thresholds: vec![0.001, 0.005, 0.01],
            any_below_001: vec!["GNOMAD_GENOMES:ALL".into(), "1000G:ALL".into()],
        }
    }
}

/// Layout of the annotation index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationIndexConfiguration {
    pub population_frequency: PopulationFrequencyIndexConfiguration,
    pub consequence_type: IndexFieldConfiguration,
    pub biotype: IndexFieldConfiguration,
    pub transcript_flag: IndexFieldConfiguration,
    /// Whether the CT x BT and CT x TF co-occurrence matrices are stored.
    pub transcript_combination: bool,
    pub clinical_source: IndexFieldConfiguration,
    pub clinical_significance: IndexFieldConfiguration,
}

/// Clinical significance values without the confirmed status.
pub const CLINICAL_SIGNIFICANCES: &[&str] = &[
    "benign",
    "likely_benign",
    "uncertain_significance",
    "likely_pathogenic",
    "pathogenic",
];

/// Suffix of clinical significance values with confirmed status.
pub const CONFIRMED_SUFFIX: &str = "_confirmed";

impl Default for AnnotationIndexConfiguration {
    fn default() -> Self {
        let significance = CLINICAL_SIGNIFICANCES
            .iter()
            .map(|s| s.to_string())
            .chain(
                CLINICAL_SIGNIFICANCES
                    .iter()
                    .map(|s| format!("{}{}", s, CONFIRMED_SUFFIX)),
            )
            .collect::<Vec<_>>();
        let significance = significance.iter().map(String::as_str).collect::<Vec<_>>();
        Self {
            population_frequency: Default::default(),
            consequence_type: IndexFieldConfiguration::multi_value(
                Source::Annotation,
                "ct",
                &[
                    "missense_variant",
                    "frameshift_variant",
                    "inframe_indel",
                    "start_lost",
                    "stop_gained",
                    "stop_lost",
                    "splice_acceptor_variant",
                    "splice_donor_variant",
                    "splice_region_variant",
                    "synonymous_variant",
                    "transcript_ablation_amplification",
                    "utr",
                    "intron_variant",
                    "non_coding",
                    "regulatory",
                    "other_coding",
                ],
            )
            .with_mapping("inframe_indel", &["inframe_deletion", "inframe_insertion"])
            .with_mapping(
                "transcript_ablation_amplification",
                &["transcript_ablation", "transcript_amplification"],
            )
            .with_mapping("utr", &["3_prime_UTR_variant", "5_prime_UTR_variant"])
            .with_mapping(
                "non_coding",
                &[
                    "non_coding_transcript_variant",
                    "non_coding_transcript_exon_variant",
                    "mature_miRNA_variant",
                    "NMD_transcript_variant",
                ],
            )
            .with_mapping(
                "regulatory",
                &[
                    "regulatory_region_variant",
                    "TF_binding_site_variant",
                    "upstream_gene_variant",
                    "downstream_gene_variant",
                ],
            )
            .with_mapping(
                "other_coding",
                &[
                    "incomplete_terminal_codon_variant",
                    "start_retained_variant",
                    "stop_retained_variant",
                    "coding_sequence_variant",
                    "protein_altering_variant",
                    "feature_truncation",
                    "feature_elongation",
                ],
            ),
            biotype: IndexFieldConfiguration::multi_value(
                Source::Annotation,
                "biotype",
                &[
                    "protein_coding",
                    "nonsense_mediated_decay",
                    "lncRNA",
                    "miRNA",
                    "small_rna",
                    "pseudogene",
                    "retained_intron",
                    "ig_tr",
                ],
            )
            .with_mapping(
                "lncRNA",
                &[
                    "lncRNA",
                    "lincRNA",
                    "antisense",
                    "sense_intronic",
                    "sense_overlapping",
                    "processed_transcript",
                ],
            )
            .with_mapping("small_rna", &["snRNA", "snoRNA", "scaRNA", "misc_RNA"])
            .with_mapping(
                "pseudogene",
                &[
                    "pseudogene",
                    "processed_pseudogene",
                    "unprocessed_pseudogene",
                    "transcribed_processed_pseudogene",
                    "transcribed_unprocessed_pseudogene",
                ],
            )
            .with_mapping(
                "ig_tr",
                &[
                    "IG_C_gene",
                    "IG_D_gene",
                    "IG_J_gene",
                    "IG_V_gene",
                    "TR_C_gene",
                    "TR_D_gene",
                    "TR_J_gene",
                    "TR_V_gene",
                ],
            ),
            transcript_flag: IndexFieldConfiguration::multi_value(
                Source::Annotation,
                "transcriptFlag",
                &[
                    "canonical",
                    "MANE_Select",
                    "MANE_Plus_Clinical",
                    "CCDS",
                    "basic",
                    "LRG",
                    "EGLH_HaemOnc",
                    "TSO500",
                ],
            ),
            transcript_combination: true,
            clinical_source: IndexFieldConfiguration::multi_value(
                Source::Annotation,
                "clinical",
                &["clinvar", "cosmic"],
            ),
            clinical_significance: IndexFieldConfiguration::multi_value(
                Source::Annotation,
                "clinicalSignificance",
                &significance,
            ),
        }
    }
}

/// Configuration of the sample index.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SampleIndexConfiguration {
    #[serde(default)]
    pub file_index: FileIndexConfiguration,
    #[serde(default)]
    pub annotation_index: AnnotationIndexConfiguration,
}

impl SampleIndexConfiguration {
    /// Load the configuration from a JSON file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, anyhow::Error> {
        let reader = std::io::BufReader::new(std::fs::File::open(path.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "could not open index configuration {}: {}",
                path.as_ref().display(),
                e
            )
        })?);
        serde_json::from_reader(reader).map_err(|e| {
            anyhow::anyhow!(
                "could not parse index configuration {}: {}",
                path.as_ref().display(),
                e
            )
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_json_roundtrip() -> Result<(), anyhow::Error> {
        let config = SampleIndexConfiguration::default();
        let json = serde_json::to_string(&config)?;
        let parsed: SampleIndexConfiguration = serde_json::from_str(&json)?;
        assert_eq!(parsed.annotation_index, config.annotation_index);
        assert_eq!(
            parsed.file_index.custom_fields.len(),
            config.file_index.custom_fields.len()
        );
        Ok(())
    }

    #[test]
    fn partial_json_uses_defaults() -> Result<(), anyhow::Error> {
        let json = r#"{"file_index": {"file_position_bits": 2, "custom_fields": []}}"#;
        let parsed: SampleIndexConfiguration = serde_json::from_str(json)?;
        assert_eq!(parsed.file_index.file_position_bits, 2);
        assert!(parsed.file_index.custom_fields.is_empty());
        assert!(parsed.annotation_index.transcript_combination);
        Ok(())
    }

    #[test]
    fn load_from_file() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::TempDir::new()?;
        let path = tmp_dir.path().join("config.json");
        std::fs::write(&path, serde_json::to_string(&SampleIndexConfiguration::default())?)?;
        let loaded = SampleIndexConfiguration::load(&path)?;
        assert_eq!(loaded.file_index.file_position_bits, 3);
        Ok(())
    }
}
