//! File level conditions (`file`, `fileData`, `filter`, `qual`, `sampleData`)
//! translated into filters over the file index entries of each sample.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::index::config::Source;
use crate::index::schema::FileIndexSchema;
use crate::index::{IndexField, IndexFieldFilter};
use crate::query::ops::{self, is_negated, parse_key_values, remove_negation, FilterOp};
use crate::query::{
    KeyValues, ParsedKeyValues, QueryOperation, QueryParam, Values, VariantQuery, VariantType,
};
use crate::sample_index::metadata::{SampleMetadata, StudyMetadata};
use crate::sample_index::query::{FileQueryShape, QueryCoverage, SampleFileIndexQuery};
use crate::sample_index::Error;

/// Parameters answered through the file index.
const FILE_PARAMS: [QueryParam; 5] = [
    QueryParam::File,
    QueryParam::FileData,
    QueryParam::Filter,
    QueryParam::Qual,
    QueryParam::SampleData,
];

const FILTER_KEY: &str = "FILTER";
const QUAL_KEY: &str = "QUAL";

fn key_values(query: &VariantQuery, param: QueryParam) -> Result<ParsedKeyValues, Error> {
    match query.get(param) {
        Some(value) if !value.is_empty() => Ok(parse_key_values(param.as_ref(), value)?),
        _ => Ok(ParsedKeyValues::empty()),
    }
}

/// Filter of one field for a list of values.
///
/// A single negated value becomes a `!=` filter; other negations are not
/// indexed.
fn values_filter(
    field: &IndexField,
    op: FilterOp,
    values: &Values<String>,
) -> Result<IndexFieldFilter, Error> {
    if !values.iter().any(|v| is_negated(v)) {
        return Ok(field.build_filter_values(op, values)?);
    }
    match (op, values.values.as_slice()) {
        (FilterOp::Eq, [single]) => Ok(field.build_filter(FilterOp::NotEq, remove_negation(single))?),
        _ => Ok(field.no_op_filter(false)),
    }
}

/// Plans the file level part of a query.
pub(super) struct FilesPlanner<'a> {
    schema: &'a FileIndexSchema,
    study: &'a StudyMetadata,
    /// Set when samples outside of the planned ones take part in the query
    /// with files the planned samples do not share.
    partial: bool,
}

impl<'a> FilesPlanner<'a> {
    pub fn new(schema: &'a FileIndexSchema, study: &'a StudyMetadata, partial: bool) -> Self {
        Self {
            schema,
            study,
            partial,
        }
    }

    /// File filters of `samples` and the coverage of the file level
    /// parameters of `input`.
    pub fn plan(
        &self,
        input: &VariantQuery,
        samples: &[&str],
        operation: Option<QueryOperation>,
        types: &[VariantType],
    ) -> Result<(IndexMap<String, FileQueryShape>, QueryCoverage), Error> {
        let (per_sample, non_covered, unprocessed_groups) =
            self.queries_per_sample(input, samples, operation)?;

        let mut result = IndexMap::new();
        let mut remaining = Vec::new();
        for (sample, mut query) in per_sample {
            let meta = self.study.sample(&sample)?;
            let shape = self.parse_files_query(&mut query, meta, types)?;
            tracing::debug!("file filter of {}: {:?}", sample, shape);
            result.insert(sample, shape);
            remaining.push(query);
        }

        let mut coverage = QueryCoverage::default();
        let file_data = key_values(input, QueryParam::FileData)?;
        for param in FILE_PARAMS {
            if input.get(param).is_none() {
                continue;
            }
            let pending = remaining.iter().any(|q| q.get(param).is_some());
            if !pending && !non_covered.contains(&param) {
                coverage.remove(param);
            } else if param == QueryParam::FileData
                && file_data.operation != Some(QueryOperation::Or)
            {
                let mut left = Vec::new();
                for query in &remaining {
                    left.extend(key_values(query, QueryParam::FileData)?.values);
                }
                left.extend(unprocessed_groups.iter().cloned());
                let groups = file_data.filter(|g| left.contains(g));
                if groups.len() < file_data.len() {
                    coverage.replace(QueryParam::FileData, groups.to_query_string());
                }
            }
        }
        Ok((result, coverage))
    }

    /// Copies of the file level parameters for each sample.
    ///
    /// When all samples have to match, `file` and `fileData` are restricted
    /// to the files of each sample and `sampleData` to its own group. Values
    /// no sample picked up are reported as not covered.
    #[allow(clippy::type_complexity)]
    fn queries_per_sample(
        &self,
        input: &VariantQuery,
        samples: &[&str],
        operation: Option<QueryOperation>,
    ) -> Result<(IndexMap<String, VariantQuery>, BTreeSet<QueryParam>, Vec<KeyValues>), Error> {
        let files = input.split_values(QueryParam::File)?;
        let file_data = key_values(input, QueryParam::FileData)?;
        let sample_data = key_values(input, QueryParam::SampleData)?;
        let restrict = operation != Some(QueryOperation::Or);
        let restrict_files = restrict
            && files.operation != Some(QueryOperation::Or)
            && !files.iter().any(|f| is_negated(f));
        let restrict_file_data = restrict && file_data.operation != Some(QueryOperation::Or);
        let restrict_sample_data = restrict && sample_data.operation != Some(QueryOperation::Or);

        let mut processed_files = BTreeSet::new();
        let mut processed_groups = Vec::new();
        let mut processed_samples = BTreeSet::new();
        let mut result = IndexMap::new();
        for sample in samples {
            let meta = self.study.sample(sample)?;
            let mut query = input.sub_query(&FILE_PARAMS);
            if restrict_files && !files.is_empty() {
                let own = files.filter(|f| meta.files.contains(f));
                processed_files.extend(own.iter().cloned());
                if own.is_empty() {
                    query.remove(QueryParam::File);
                } else {
                    query.put(QueryParam::File, own.to_query_string());
                }
            }
            if restrict_file_data && !file_data.is_empty() {
                let own = file_data.filter(|g| {
                    g.key
                        .as_ref()
                        .map_or(true, |file| meta.files.contains(file))
                });
                processed_groups.extend(own.iter().cloned());
                if own.is_empty() {
                    query.remove(QueryParam::FileData);
                } else {
                    query.put(QueryParam::FileData, own.to_query_string());
                }
            }
            if restrict_sample_data && !sample_data.is_empty() {
                match sample_data.get_group(sample) {
                    Some(group) => {
                        processed_samples.insert(sample.to_string());
                        query.put(QueryParam::SampleData, group.to_query_string());
                    }
                    None => {
                        query.remove(QueryParam::SampleData);
                    }
                }
            }
            result.insert(sample.to_string(), query);
        }

        let mut non_covered = BTreeSet::new();
        if restrict_files && files.iter().any(|f| !processed_files.contains(f)) {
            non_covered.insert(QueryParam::File);
        }
        let unprocessed_groups = if restrict_file_data {
            file_data
                .iter()
                .filter(|g| !processed_groups.contains(*g))
                .cloned()
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };
        if !unprocessed_groups.is_empty() {
            non_covered.insert(QueryParam::FileData);
        }
        if restrict_sample_data
            && sample_data.iter().any(|g| {
                g.key
                    .as_ref()
                    .map_or(true, |key| !processed_samples.contains(key))
            })
        {
            non_covered.insert(QueryParam::SampleData);
        }
        Ok((result, non_covered, unprocessed_groups))
    }

    /// File filter of one sample, splitting `fileData` into one query per
    /// file where the groups can not share one query.
    fn parse_files_query(
        &self,
        query: &mut VariantQuery,
        meta: &SampleMetadata,
        types: &[VariantType],
    ) -> Result<FileQueryShape, Error> {
        let file_data = key_values(query, QueryParam::FileData)?;
        let operation = match file_data.operation {
            Some(QueryOperation::And) if file_data.len() > 1 => QueryOperation::And,
            Some(QueryOperation::Or)
                if file_data.len() > 1
                    && meta.multi_file
                    && file_data.iter().all(|g| {
                        g.key
                            .as_ref()
                            .map_or(false, |file| meta.files.contains(file))
                    }) =>
            {
                QueryOperation::Or
            }
            _ => {
                let filters = self.parse_file_query(query, meta, types)?;
                let single = SampleFileIndexQuery::new(&meta.name, filters);
                return Ok(if single.is_empty() {
                    FileQueryShape::Empty
                } else {
                    FileQueryShape::Single(single)
                });
            }
        };

        let mut queries = Vec::new();
        let mut uncovered = Vec::new();
        let mut pending = BTreeSet::new();
        for group in file_data.iter() {
            let mut sub = query.clone();
            sub.put(QueryParam::FileData, group.to_query_string());
            let filters = self.parse_file_query(&mut sub, meta, types)?;
            if sub.get(QueryParam::FileData).is_some() {
                uncovered.push(group.clone());
            }
            for param in FILE_PARAMS {
                if sub.get(param).is_some() {
                    pending.insert(param);
                }
            }
            queries.push(SampleFileIndexQuery::new(&meta.name, filters));
        }
        for param in FILE_PARAMS {
            if param != QueryParam::FileData && !pending.contains(&param) {
                query.remove(param);
            }
        }
        match operation {
            _ if uncovered.is_empty() => {
                query.remove(QueryParam::FileData);
            }
            QueryOperation::And => {
                let operation = (uncovered.len() > 1).then_some(QueryOperation::And);
                query.put(
                    QueryParam::FileData,
                    Values::new(operation, uncovered).to_query_string(),
                );
            }
            QueryOperation::Or => (),
        }
        Ok(FileQueryShape::Split { operation, queries })
    }

    /// Filters of one sample for one set of file level conditions.
    ///
    /// Conditions answered exactly are removed from `query`.
    fn parse_file_query(
        &self,
        query: &mut VariantQuery,
        meta: &SampleMetadata,
        types: &[VariantType],
    ) -> Result<Vec<IndexFieldFilter>, Error> {
        let mut filters = Vec::new();

        if !types.is_empty() {
            let operation = (types.len() > 1).then_some(QueryOperation::Or);
            let values = Values::new(
                operation,
                types.iter().map(|t| t.as_ref().to_string()).collect(),
            );
            filters.push(
                self.schema
                    .type_field()
                    .build_filter_values(FilterOp::Eq, &values)?,
            );
        }

        let files = query.split_values(QueryParam::File)?;
        if !files.is_empty()
            && !files.iter().any(|f| is_negated(f))
            && !(files.operation == Some(QueryOperation::And) && files.len() > 1)
        {
            let positions = files
                .iter()
                .filter_map(|f| meta.file_position(f))
                .collect::<Vec<_>>();
            let exact = if meta.multi_file {
                if !positions.is_empty() {
                    filters.push(self.schema.file_position_filter(&positions));
                }
                positions.len() == files.len()
            } else {
                meta.files.len() == 1 && files.iter().any(|f| *f == meta.files[0])
            };
            if exact && !self.partial {
                query.remove(QueryParam::File);
            }
        }

        let filter_values = query.split_values(QueryParam::Filter)?;
        if !filter_values.is_empty() {
            if let Some(field) = self.schema.custom_field(Source::File, FILTER_KEY) {
                let filter = values_filter(field, FilterOp::Eq, &filter_values)?;
                if filter.is_exact() && !self.partial {
                    query.remove(QueryParam::Filter);
                }
                filters.push(filter);
            }
        }

        if let Some(value) = query.get(QueryParam::Qual).filter(|v| !v.is_empty()) {
            let (op, value) = ops::parse_op_value(value)?;
            if let Some(field) = self.schema.custom_field(Source::File, QUAL_KEY) {
                let filter = field.build_filter(op, &value)?;
                if filter.is_exact() && !self.partial {
                    query.remove(QueryParam::Qual);
                }
                filters.push(filter);
            }
        }

        let file_data = key_values(query, QueryParam::FileData)?;
        if !file_data.is_empty() && file_data.operation != Some(QueryOperation::Or) {
            let mut uncovered = Vec::new();
            for group in file_data.iter() {
                let position = match &group.key {
                    None => None,
                    Some(file) => match meta.file_position(file) {
                        Some(position) => Some(position),
                        None => {
                            uncovered.push(group.clone());
                            continue;
                        }
                    },
                };
                if let (Some(position), true) = (position, meta.multi_file) {
                    filters.push(self.schema.file_position_filter(&[position]));
                }
                if !self.group_filters(Source::File, group, &mut filters)? {
                    uncovered.push(group.clone());
                }
            }
            if !self.partial && uncovered.len() < file_data.len() {
                if uncovered.is_empty() {
                    query.remove(QueryParam::FileData);
                } else {
                    let operation = file_data.operation.filter(|_| uncovered.len() > 1);
                    query.put(
                        QueryParam::FileData,
                        Values::new(operation, uncovered).to_query_string(),
                    );
                }
            }
        }

        let sample_data = key_values(query, QueryParam::SampleData)?;
        if !sample_data.is_empty() && sample_data.operation != Some(QueryOperation::Or) {
            if let Some(group) = sample_data.get_group(&meta.name) {
                if self.group_filters(Source::Sample, group, &mut filters)? && !self.partial {
                    let rest = sample_data.filter(|g| g.key.as_deref() != Some(meta.name.as_str()));
                    if rest.is_empty() {
                        query.remove(QueryParam::SampleData);
                    } else {
                        query.put(QueryParam::SampleData, rest.to_query_string());
                    }
                }
            }
        }

        Ok(filters)
    }

    /// Add the filters of one `fileData`/`sampleData` group, returning whether
    /// all of them are exact.
    fn group_filters(
        &self,
        source: Source,
        group: &KeyValues,
        filters: &mut Vec<IndexFieldFilter>,
    ) -> Result<bool, Error> {
        let mut exact = true;
        for kov in &group.values {
            let field = match self.schema.custom_field(source, &kov.key) {
                Some(field) => field,
                None => {
                    exact = false;
                    continue;
                }
            };
            let values = ops::split_value(&kov.key, &kov.value)?;
            let filter = if source == Source::File && kov.key == FILTER_KEY && kov.op != FilterOp::Eq
            {
                field.no_op_filter(false)
            } else {
                values_filter(field, kov.op, &values)?
            };
            exact &= filter.is_exact();
            filters.push(filter);
        }
        Ok(exact)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::index::config::IndexFieldConfiguration;
    use crate::index::SampleIndexConfiguration;
    use crate::index::SampleIndexSchema;
    use crate::sample_index::metadata::SampleMetadata;

    fn schema() -> Result<SampleIndexSchema, anyhow::Error> {
        let mut config = SampleIndexConfiguration::default();
        config.file_index.custom_fields.retain(|f| f.key != "DP" || f.source != Source::File);
        config.file_index.custom_fields.push(
            IndexFieldConfiguration::range(Source::File, "DP", &[11.0, 21.0, 31.0])
                .with_integer(true)
                .with_domain(0.0, f64::INFINITY),
        );
        Ok(SampleIndexSchema::new(&config)?)
    }

    fn study() -> StudyMetadata {
        StudyMetadata::new("s1")
            .with_sample(SampleMetadata::new("single").with_files(&["f1"]))
            .with_sample(SampleMetadata::new("other").with_files(&["f1"]))
            .with_sample(SampleMetadata::new("multi").with_files(&["f1", "f2"]))
    }

    #[test]
    fn single_file_conditions_are_covered() -> Result<(), anyhow::Error> {
        let schema = schema()?;
        let study = study();
        let planner = FilesPlanner::new(schema.file_index(), &study, false);
        let input = VariantQuery::default()
            .with(QueryParam::File, "f1")
            .with(QueryParam::Filter, "PASS")
            .with(QueryParam::Qual, ">=20")
            .with(QueryParam::SampleData, "single:DP>=10");
        let (shapes, coverage) =
            planner.plan(&input, &["single", "other"], Some(QueryOperation::And), &[])?;
        let residual = coverage.apply(&input);
        assert!(residual.is_empty(), "{:?}", residual);
        assert!(matches!(shapes["single"], FileQueryShape::Single(ref q) if q.filters.len() == 3));
        assert!(matches!(shapes["other"], FileQueryShape::Single(ref q) if q.filters.len() == 2));
        Ok(())
    }

    #[test]
    fn inexact_conditions_stay() -> Result<(), anyhow::Error> {
        let schema = schema()?;
        let study = study();
        let planner = FilesPlanner::new(schema.file_index(), &study, false);
        let input = VariantQuery::default()
            .with(QueryParam::Filter, "LowGQ")
            .with(QueryParam::Qual, ">25");
        let (_, coverage) = planner.plan(&input, &["single"], None, &[])?;
        let residual = coverage.apply(&input);
        assert_eq!(residual.get(QueryParam::Filter), Some("LowGQ"));
        assert_eq!(residual.get(QueryParam::Qual), Some(">25"));
        Ok(())
    }

    #[test]
    fn negated_filter() -> Result<(), anyhow::Error> {
        let schema = schema()?;
        let study = study();
        let planner = FilesPlanner::new(schema.file_index(), &study, false);
        let input = VariantQuery::default().with(QueryParam::Filter, "!PASS");
        let (_, coverage) = planner.plan(&input, &["single"], None, &[])?;
        assert!(coverage.apply(&input).is_empty());
        Ok(())
    }

    #[test]
    fn split_file_data_of_multi_file_sample() -> Result<(), anyhow::Error> {
        let schema = schema()?;
        let study = study();
        let planner = FilesPlanner::new(schema.file_index(), &study, false);
        let input = VariantQuery::default().with(QueryParam::FileData, "f1:DP>=11;f2:DP>=25");
        let (shapes, coverage) = planner.plan(&input, &["multi"], None, &[])?;
        let residual = coverage.apply(&input);
        match &shapes["multi"] {
            FileQueryShape::Split { operation, queries } => {
                assert_eq!(*operation, QueryOperation::And);
                assert_eq!(queries.len(), 2);
            }
            shape => panic!("unexpected shape {:?}", shape),
        }
        assert_eq!(residual.get(QueryParam::FileData), Some("f2:DP>=25"));
        Ok(())
    }

    #[test]
    fn or_samples_keep_sample_data() -> Result<(), anyhow::Error> {
        let schema = schema()?;
        let study = study();
        let planner = FilesPlanner::new(schema.file_index(), &study, false);
        let input = VariantQuery::default().with(QueryParam::SampleData, "single:DP>=10");
        let (_, coverage) =
            planner.plan(&input, &["single", "other"], Some(QueryOperation::Or), &[])?;
        let residual = coverage.apply(&input);
        assert_eq!(residual.get(QueryParam::SampleData), Some("single:DP>=10"));
        Ok(())
    }

    #[test]
    fn foreign_file_data_is_not_covered() -> Result<(), anyhow::Error> {
        let schema = schema()?;
        let study = study();
        let planner = FilesPlanner::new(schema.file_index(), &study, false);
        let input = VariantQuery::default().with(QueryParam::FileData, "f9:DP>=11");
        let (shapes, coverage) = planner.plan(&input, &["single"], None, &[])?;
        let residual = coverage.apply(&input);
        assert_eq!(shapes["single"], FileQueryShape::Empty);
        assert_eq!(residual.get(QueryParam::FileData), Some("f9:DP>=11"));
        Ok(())
    }

    #[test]
    fn partial_keeps_everything() -> Result<(), anyhow::Error> {
        let schema = schema()?;
        let study = study();
        let planner = FilesPlanner::new(schema.file_index(), &study, true);
        let input = VariantQuery::default()
            .with(QueryParam::Filter, "PASS")
            .with(QueryParam::FileData, "f1:DP>=11");
        let (_, coverage) = planner.plan(&input, &["single"], None, &[])?;
        assert_eq!(coverage.apply(&input), input);
        Ok(())
    }
}
