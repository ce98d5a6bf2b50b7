//! Variant model, variant type inference, and the genomic comparator.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::common;

/// Variant types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum VariantType {
    Snv,
    Mnv,
    Indel,
    Insertion,
    Deletion,
    Inversion,
    Duplication,
    TandemDuplication,
    Translocation,
    Breakend,
    CopyNumber,
    CopyNumberGain,
    CopyNumberLoss,
    Sv,
    NoVariation,
    Symbolic,
    Mixed,
}

impl VariantType {
    /// Infer the type from reference and alternate alleles, VCF style.
    pub fn infer(reference: &str, alternate: &str) -> VariantType {
        if alternate.contains('[') || alternate.contains(']') {
            return VariantType::Breakend;
        }
        if alternate.starts_with('<') && alternate.ends_with('>') {
            let inner = &alternate[1..alternate.len() - 1];
            return match inner {
                "DEL" => VariantType::Deletion,
                "INS" => VariantType::Insertion,
                "DUP" => VariantType::Duplication,
                "DUP:TANDEM" => VariantType::TandemDuplication,
                "INV" => VariantType::Inversion,
                "CNV" => VariantType::CopyNumber,
                "NON_REF" | "*" => VariantType::NoVariation,
                _ => match inner.strip_prefix("CN").map(str::parse::<u32>) {
                    Some(Ok(cn)) if cn < 2 => VariantType::CopyNumberLoss,
                    Some(Ok(cn)) if cn > 2 => VariantType::CopyNumberGain,
                    Some(Ok(_)) => VariantType::CopyNumber,
                    _ if inner.starts_with("DEL:") => VariantType::Deletion,
                    _ if inner.starts_with("INS:") => VariantType::Insertion,
                    _ => VariantType::Symbolic,
                },
            };
        }
        if alternate == "." || alternate == "*" || alternate == reference {
            return VariantType::NoVariation;
        }
        match (reference.len(), alternate.len()) {
            (1, 1) => VariantType::Snv,
            (r, a) if r == a => VariantType::Mnv,
            _ => VariantType::Indel,
        }
    }

    /// Type as recorded by the file index, which cannot tell copy number gains
    /// and losses apart.
    pub fn index_type(&self) -> VariantType {
        match self {
            VariantType::CopyNumberGain | VariantType::CopyNumberLoss => VariantType::CopyNumber,
            other => *other,
        }
    }
}

/// Mate position of a breakend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakendMate {
    pub chromosome: String,
    pub position: i32,
}

/// One consequence of a variant on a transcript.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConsequenceType {
    #[serde(default)]
    pub gene: Option<String>,
    #[serde(default)]
    pub biotype: Option<String>,
    #[serde(default)]
    pub so_terms: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// One clinical assertion of a variant.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClinicalAssertion {
    pub source: String,
    #[serde(default)]
    pub significance: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

/// Functional annotation of a variant, as far as the sample index encodes it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantAnnotation {
    #[serde(default)]
    pub consequence_types: Vec<ConsequenceType>,
    /// Alternate allele frequency by `STUDY:POPULATION`.
    #[serde(default)]
    pub population_frequencies: IndexMap<String, f64>,
    #[serde(default)]
    pub clinical: Vec<ClinicalAssertion>,
    /// Whether a protein substitution score is available.
    #[serde(default)]
    pub protein_substitution: bool,
}

/// A variant together with the study data the query layer looks at.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Variant {
    pub chromosome: String,
    pub start: i32,
    pub end: i32,
    pub reference: String,
    pub alternate: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub annotation: Option<VariantAnnotation>,
    /// Name of the file the record was loaded from.
    #[serde(default)]
    pub file: Option<String>,
    /// File-level data (`FILTER`, `QUAL`, `MATEID`, INFO fields).
    #[serde(default)]
    pub file_data: IndexMap<String, String>,
    /// Genotype per sample.
    #[serde(default)]
    pub genotypes: IndexMap<String, String>,
    /// Other per-sample fields (e.g. `DP`) per sample.
    #[serde(default)]
    pub sample_data: IndexMap<String, IndexMap<String, String>>,
}

impl Variant {
    /// Create a variant; the end position follows from the reference allele.
    pub fn new(
        chromosome: impl Into<String>,
        start: i32,
        reference: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        let reference = reference.into();
        let alternate = alternate.into();
        let end = start + (reference.len().max(1) as i32) - 1;
        Self {
            chromosome: chromosome.into(),
            start,
            end,
            reference,
            alternate,
            id: None,
            annotation: None,
            file: None,
            file_data: IndexMap::new(),
            genotypes: IndexMap::new(),
            sample_data: IndexMap::new(),
        }
    }

    pub fn with_end(mut self, end: i32) -> Self {
        self.end = end;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_annotation(mut self, annotation: VariantAnnotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_file_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.file_data.insert(key.into(), value.into());
        self
    }

    pub fn with_genotype(mut self, sample: impl Into<String>, gt: impl Into<String>) -> Self {
        self.genotypes.insert(sample.into(), gt.into());
        self
    }

    pub fn with_sample_data(
        mut self,
        sample: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.sample_data
            .entry(sample.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn variant_type(&self) -> VariantType {
        VariantType::infer(&self.reference, &self.alternate)
    }

    /// Mate position from a breakend alternate allele such as `G]2:321682]`.
    pub fn breakend_mate(&self) -> Option<BreakendMate> {
        let alt = &self.alternate;
        let open = alt.find(['[', ']'])?;
        let bracket = alt[open..].chars().next()?;
        let close = alt[open + 1..].find(bracket)? + open + 1;
        let (chromosome, position) = alt[open + 1..close].rsplit_once(':')?;
        Some(BreakendMate {
            chromosome: chromosome.to_string(),
            position: position.parse().ok()?,
        })
    }

    /// Same position and alleles, ignoring study data.
    pub fn same_genomic_variant(&self, other: &Variant) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.reference == other.reference
            && self.alternate == other.alternate
            && common::canonicalize(&self.chromosome) == common::canonicalize(&other.chromosome)
    }

    /// Order within one chromosome: start, end, reference, alternate.
    pub fn intra_chromosome_cmp(&self, other: &Variant) -> Ordering {
        self.start
            .cmp(&other.start)
            .then(self.end.cmp(&other.end))
            .then_with(|| self.reference.cmp(&other.reference))
            .then_with(|| self.alternate.cmp(&other.alternate))
    }

    /// Genomic order across chromosomes.
    pub fn genomic_cmp(&self, other: &Variant) -> Ordering {
        common::chrom_cmp(&self.chromosome, &other.chromosome)
            .then_with(|| self.intra_chromosome_cmp(other))
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome,
            self.start,
            if self.reference.is_empty() {
                "-"
            } else {
                self.reference.as_str()
            },
            if self.alternate.is_empty() {
                "-"
            } else {
                self.alternate.as_str()
            }
        )
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("A", "C", VariantType::Snv)]
    #[case("AC", "GT", VariantType::Mnv)]
    #[case("A", "AT", VariantType::Indel)]
    #[case("AT", "", VariantType::Indel)]
    #[case("N", "<DEL>", VariantType::Deletion)]
    #[case("N", "<DUP:TANDEM>", VariantType::TandemDuplication)]
    #[case("N", "<CNV>", VariantType::CopyNumber)]
    #[case("N", "<CN0>", VariantType::CopyNumberLoss)]
    #[case("N", "<CN4>", VariantType::CopyNumberGain)]
    #[case("G", "G]2:321682]", VariantType::Breakend)]
    #[case("T", "[13:123457[T", VariantType::Breakend)]
    #[case("A", ".", VariantType::NoVariation)]
    fn infer(#[case] reference: &str, #[case] alternate: &str, #[case] expected: VariantType) {
        assert_eq!(VariantType::infer(reference, alternate), expected);
    }

    #[rstest]
    #[case("SNV", VariantType::Snv)]
    #[case("COPY_NUMBER_GAIN", VariantType::CopyNumberGain)]
    #[case("breakend", VariantType::Breakend)]
    fn type_names(#[case] name: &str, #[case] expected: VariantType) -> Result<(), anyhow::Error> {
        assert_eq!(name.parse::<VariantType>()?, expected);
        Ok(())
    }

    #[rstest]
    #[case("G]2:321682]", Some(("2", 321682)))]
    #[case("[13:123457[T", Some(("13", 123457)))]
    #[case("C", None)]
    fn breakend_mate(#[case] alternate: &str, #[case] expected: Option<(&str, i32)>) {
        let variant = Variant::new("1", 100, "N", alternate);
        assert_eq!(
            variant.breakend_mate(),
            expected.map(|(chromosome, position)| BreakendMate {
                chromosome: chromosome.to_string(),
                position
            })
        );
    }

    #[test]
    fn genomic_order() {
        let mut variants = vec![
            Variant::new("2", 100, "A", "C"),
            Variant::new("1", 200, "A", "G"),
            Variant::new("1", 200, "A", "C"),
            Variant::new("X", 1, "A", "C"),
            Variant::new("1", 50, "AT", "A"),
        ];
        variants.sort_by(Variant::genomic_cmp);
        let names = variants.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["1:50:AT:A", "1:200:A:C", "1:200:A:G", "2:100:A:C", "X:1:A:C"]
        );
    }
}
