//! Query parameter vocabulary and the declarative query map.

use indexmap::IndexMap;

use super::{ops, Error, QueryOperation, Values};

/// Value of `geneRegions` telling that the gene regions were already applied.
pub const SKIP_GENE_REGIONS: &str = "SKIP";

/// Names of the parameters of a declarative variant query.
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
pub enum QueryParam {
    #[strum(serialize = "study")]
    #[serde(rename = "study")]
    Study,
    #[strum(serialize = "region")]
    #[serde(rename = "region")]
    Region,
    #[strum(serialize = "gene")]
    #[serde(rename = "gene")]
    Gene,
    /// Regions resolved from `gene` by the upper query layer.
    #[strum(serialize = "geneRegions")]
    #[serde(rename = "geneRegions")]
    GeneRegions,
    #[strum(serialize = "id")]
    #[serde(rename = "id")]
    Id,
    #[strum(serialize = "xref")]
    #[serde(rename = "xref")]
    Xref,
    #[strum(serialize = "type")]
    #[serde(rename = "type")]
    Type,
    #[strum(serialize = "sample")]
    #[serde(rename = "sample")]
    Sample,
    #[strum(serialize = "genotype")]
    #[serde(rename = "genotype")]
    Genotype,
    #[strum(serialize = "sampleMendelianError")]
    #[serde(rename = "sampleMendelianError")]
    SampleMendelianError,
    #[strum(serialize = "sampleDeNovo")]
    #[serde(rename = "sampleDeNovo")]
    SampleDeNovo,
    #[strum(serialize = "file")]
    #[serde(rename = "file")]
    File,
    #[strum(serialize = "fileData")]
    #[serde(rename = "fileData")]
    FileData,
    #[strum(serialize = "sampleData")]
    #[serde(rename = "sampleData")]
    SampleData,
    #[strum(serialize = "filter")]
    #[serde(rename = "filter")]
    Filter,
    #[strum(serialize = "qual")]
    #[serde(rename = "qual")]
    Qual,
    #[strum(serialize = "ct")]
    #[serde(rename = "ct")]
    ConsequenceType,
    #[strum(serialize = "biotype")]
    #[serde(rename = "biotype")]
    Biotype,
    #[strum(serialize = "transcriptFlag")]
    #[serde(rename = "transcriptFlag")]
    TranscriptFlag,
    #[strum(serialize = "populationFrequencyAlt")]
    #[serde(rename = "populationFrequencyAlt")]
    PopulationFrequencyAlt,
    #[strum(serialize = "clinical")]
    #[serde(rename = "clinical")]
    Clinical,
    #[strum(serialize = "clinicalSignificance")]
    #[serde(rename = "clinicalSignificance")]
    ClinicalSignificance,
    #[strum(serialize = "clinicalConfirmedStatus")]
    #[serde(rename = "clinicalConfirmedStatus")]
    ClinicalConfirmedStatus,
    #[strum(serialize = "proteinSubstitution")]
    #[serde(rename = "proteinSubstitution")]
    ProteinSubstitution,
    #[strum(serialize = "includeSample")]
    #[serde(rename = "includeSample")]
    IncludeSample,
    #[strum(serialize = "includeFile")]
    #[serde(rename = "includeFile")]
    IncludeFile,
    #[strum(serialize = "includeGenotype")]
    #[serde(rename = "includeGenotype")]
    IncludeGenotype,
}

/// A declarative variant query, mapping parameters to their raw string values.
///
/// Insertion order is kept so that serialized residual queries are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(
    try_from = "IndexMap<String, String>",
    into = "IndexMap<String, String>"
)]
pub struct VariantQuery {
    params: IndexMap<QueryParam, String>,
}

impl TryFrom<IndexMap<String, String>> for VariantQuery {
    type Error = Error;

    fn try_from(value: IndexMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_pairs(value)
    }
}

impl From<VariantQuery> for IndexMap<String, String> {
    fn from(value: VariantQuery) -> Self {
        value
            .params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

impl VariantQuery {
    /// Build a query from raw `(name, value)` pairs.
    ///
    /// # Errors
    ///
    /// Fails with `Error::UnknownParam` on the first name that is not part of the
    /// vocabulary.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = IndexMap::new();
        for (key, value) in pairs {
            let param = key
                .as_ref()
                .parse::<QueryParam>()
                .map_err(|_| Error::UnknownParam(key.as_ref().to_string()))?;
            params.insert(param, value.into());
        }
        Ok(Self { params })
    }

    /// Builder-style setter.
    pub fn with(mut self, param: QueryParam, value: impl Into<String>) -> Self {
        self.params.insert(param, value.into());
        self
    }

    /// Set a parameter in place.
    pub fn put(&mut self, param: QueryParam, value: impl Into<String>) {
        self.params.insert(param, value.into());
    }

    /// Remove a parameter in place, keeping the order of the remaining ones.
    pub fn remove(&mut self, param: QueryParam) -> Option<String> {
        self.params.shift_remove(&param)
    }

    pub fn get(&self, param: QueryParam) -> Option<&str> {
        self.params.get(&param).map(String::as_str)
    }

    /// Whether the parameter is present with a non-empty value.
    pub fn is_valid(&self, param: QueryParam) -> bool {
        self.get(param).map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn params(&self) -> impl Iterator<Item = (QueryParam, &str)> {
        self.params.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Split the value of `param` into its `,`/`;` separated parts.
    pub fn split_values(&self, param: QueryParam) -> Result<Values<String>, Error> {
        match self.get(param) {
            Some(value) => ops::split_value(param.as_ref(), value),
            None => Ok(Values::empty()),
        }
    }

    /// Values of a list-valued parameter that only supports OR, e.g. `type`.
    pub fn as_string_list(&self, param: QueryParam) -> Vec<String> {
        self.get(param)
            .map(|value| {
                value
                    .split(QueryOperation::Or.separator())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy of the query that only keeps the given parameters.
    pub fn sub_query(&self, params: &[QueryParam]) -> VariantQuery {
        VariantQuery {
            params: self
                .params
                .iter()
                .filter(|(k, _)| params.contains(k))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{QueryParam, VariantQuery};
    use crate::query::Error;

    #[rstest]
    #[case("genotype", QueryParam::Genotype)]
    #[case("ct", QueryParam::ConsequenceType)]
    #[case("populationFrequencyAlt", QueryParam::PopulationFrequencyAlt)]
    #[case("geneRegions", QueryParam::GeneRegions)]
    fn param_names(#[case] name: &str, #[case] expected: QueryParam) -> Result<(), anyhow::Error> {
        assert_eq!(name.parse::<QueryParam>()?, expected);
        assert_eq!(expected.to_string(), name);
        Ok(())
    }

    #[test]
    fn from_pairs_rejects_unknown_param() {
        let res = VariantQuery::from_pairs([("genotype", "s1:0/1"), ("genotpye", "s1:1/1")]);
        assert_eq!(res, Err(Error::UnknownParam("genotpye".into())));
    }

    #[test]
    fn json_roundtrip_keeps_order() -> Result<(), anyhow::Error> {
        let json = r#"{"type":"SNV","genotype":"s1:0/1","region":"1:100-200"}"#;
        let query: VariantQuery = serde_json::from_str(json)?;
        assert_eq!(query.get(QueryParam::Type), Some("SNV"));
        assert_eq!(serde_json::to_string(&query)?, json);
        Ok(())
    }

    #[test]
    fn json_rejects_unknown_param() {
        let res: Result<VariantQuery, _> = serde_json::from_str(r#"{"foo":"bar"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn is_valid_and_lists() {
        let query = VariantQuery::default()
            .with(QueryParam::Type, "SNV,INDEL")
            .with(QueryParam::Gene, "");
        assert!(query.is_valid(QueryParam::Type));
        assert!(!query.is_valid(QueryParam::Gene));
        assert!(!query.is_valid(QueryParam::Region));
        assert_eq!(
            query.as_string_list(QueryParam::Type),
            vec!["SNV".to_string(), "INDEL".to_string()]
        );
    }
}
