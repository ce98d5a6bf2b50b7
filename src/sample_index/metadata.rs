//! Study and sample metadata consulted by the planner and the builder.

use indexmap::IndexMap;

use crate::query::genotype::DEFAULT_LOADED_GENOTYPES;
use crate::query::{QueryParam, VariantQuery};

use super::Error;

/// Status of a secondary index build for one sample.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum IndexStatus {
    #[default]
    None,
    Running,
    Ready,
    Error,
}

/// One sample of a study.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SampleMetadata {
    pub name: String,
    /// Files holding calls of the sample, in load order.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub father: Option<String>,
    #[serde(default)]
    pub mother: Option<String>,
    /// Status of the parents stream.
    #[serde(default)]
    pub family_index: IndexStatus,
    /// Status of the annotation streams.
    #[serde(default)]
    pub annotation_index: IndexStatus,
    /// Sample index version the annotation streams were built for.
    #[serde(default)]
    pub annotation_index_version: u32,
    /// Whether calls of the sample are split over several files for the same
    /// variants.
    #[serde(default)]
    pub multi_file: bool,
}

impl SampleMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(|f| f.to_string()).collect();
        self.multi_file = self.files.len() > 1;
        self
    }

    pub fn with_parents(mut self, father: Option<&str>, mother: Option<&str>) -> Self {
        self.father = father.map(str::to_string);
        self.mother = mother.map(str::to_string);
        self.family_index = IndexStatus::Ready;
        self
    }

    pub fn with_annotation_index(mut self, status: IndexStatus, version: u32) -> Self {
        self.annotation_index = status;
        self.annotation_index_version = version;
        self
    }

    /// Annotation index status for the given sample index version.
    pub fn annotation_status(&self, version: u32) -> IndexStatus {
        if self.annotation_index_version == version {
            self.annotation_index
        } else {
            IndexStatus::None
        }
    }

    /// Position of `file` among the files of the sample.
    pub fn file_position(&self, file: &str) -> Option<usize> {
        self.files.iter().position(|f| f == file)
    }
}

/// One study with its samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StudyMetadata {
    pub name: String,
    /// Genotypes loaded into the study; empty for the defaults.
    #[serde(default)]
    pub loaded_genotypes: Vec<String>,
    /// Current version of the sample index configuration.
    #[serde(default)]
    pub sample_index_version: u32,
    #[serde(default)]
    pub samples: IndexMap<String, SampleMetadata>,
}

impl StudyMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_sample(mut self, sample: SampleMetadata) -> Self {
        self.samples.insert(sample.name.clone(), sample);
        self
    }

    pub fn sample(&self, name: &str) -> Result<&SampleMetadata, Error> {
        self.samples.get(name).ok_or_else(|| Error::UnknownSample {
            study: self.name.clone(),
            sample: name.to_string(),
        })
    }

    /// Loaded genotypes, falling back to the defaults.
    pub fn loaded_genotypes(&self) -> Vec<String> {
        if self.loaded_genotypes.is_empty() {
            DEFAULT_LOADED_GENOTYPES
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.loaded_genotypes.clone()
        }
    }
}

/// Metadata of all studies.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub studies: IndexMap<String, StudyMetadata>,
}

impl Metadata {
    pub fn with_study(mut self, study: StudyMetadata) -> Self {
        self.studies.insert(study.name.clone(), study);
        self
    }

    /// The study named by the query, or the only study.
    pub fn default_study(&self, query: &VariantQuery) -> Result<&StudyMetadata, Error> {
        match query.get(QueryParam::Study) {
            Some(name) => self
                .studies
                .get(name)
                .ok_or_else(|| Error::UnknownStudy(name.to_string())),
            None if self.studies.len() == 1 => self
                .studies
                .values()
                .next()
                .ok_or(Error::MissingStudy(0)),
            None => Err(Error::MissingStudy(self.studies.len())),
        }
    }

    /// Load the metadata from a JSON file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, anyhow::Error> {
        let reader = std::io::BufReader::new(std::fs::File::open(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not open metadata {}: {}", path.as_ref().display(), e)
        })?);
        serde_json::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("could not parse metadata {}: {}", path.as_ref().display(), e))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn metadata() -> Metadata {
        Metadata::default().with_study(
            StudyMetadata::new("s1")
                .with_sample(SampleMetadata::new("child").with_files(&["f1"]))
                .with_sample(SampleMetadata::new("other").with_files(&["f2"])),
        )
    }

    #[test]
    fn default_study() -> Result<(), anyhow::Error> {
        let metadata = metadata();
        assert_eq!(metadata.default_study(&VariantQuery::default())?.name, "s1");
        assert!(matches!(
            metadata.default_study(&VariantQuery::default().with(QueryParam::Study, "s2")),
            Err(Error::UnknownStudy(_))
        ));
        let two = metadata.with_study(StudyMetadata::new("s2"));
        assert_eq!(
            two.default_study(&VariantQuery::default()),
            Err(Error::MissingStudy(2))
        );
        Ok(())
    }

    #[test]
    fn annotation_status_follows_version() {
        let sample = SampleMetadata::new("a").with_annotation_index(IndexStatus::Ready, 2);
        assert_eq!(sample.annotation_status(2), IndexStatus::Ready);
        assert_eq!(sample.annotation_status(3), IndexStatus::None);
    }

    #[test]
    fn json_roundtrip() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::TempDir::new()?;
        let path = tmp_dir.path().join("metadata.json");
        std::fs::write(&path, serde_json::to_string(&metadata())?)?;
        let loaded = Metadata::load(&path)?;
        assert_eq!(loaded, metadata());
        Ok(())
    }

    #[test]
    fn loaded_genotypes_default() {
        let study = StudyMetadata::new("s");
        assert!(study.loaded_genotypes().contains(&"0/1".to_string()));
    }
}
