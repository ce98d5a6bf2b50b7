use crate::query::ops::{self, KeyOpValue};
use crate::query::{QueryOperation, Variant};

use super::{compare, values_match, LocalFilter};

const FILTER_KEY: &str = "FILTER";
const QUAL_KEY: &str = "QUAL";

/// Determine whether the `Variant` passes the file level filters (`file`,
/// `filter`, `qual`, `fileData`).
pub fn passes(filter: &LocalFilter, variant: &Variant) -> bool {
    let files = variant.file.iter().cloned().collect::<Vec<_>>();
    if !values_match(&filter.files, &files, |f, v| f == v) {
        tracing::trace!("variant {} fails file filter {:?}", variant, &filter.files);
        return false;
    }
    if !values_match(&filter.filter, &record_filters(variant), |f, v| f == v) {
        tracing::trace!("variant {} fails FILTER filter {:?}", variant, &filter.filter);
        return false;
    }
    if let Some((op, value)) = &filter.qual {
        if !compare(*op, variant.file_data.get(QUAL_KEY).map(String::as_str), value) {
            tracing::trace!("variant {} fails QUAL filter {}{}", variant, op, value);
            return false;
        }
    }
    if !filter.file_data.is_empty() {
        let mut groups = filter.file_data.iter().map(|group| {
            let same_file = match &group.key {
                Some(file) => variant.file.as_deref() == Some(file.as_str()),
                None => true,
            };
            same_file && group.values.iter().all(|kov| passes_key_op_value(variant, kov))
        });
        let pass = match filter.file_data.operation {
            Some(QueryOperation::Or) => groups.any(|g| g),
            _ => groups.all(|g| g),
        };
        if !pass {
            tracing::trace!("variant {} fails file data filter", variant);
            return false;
        }
    }
    true
}

/// The `;` separated entries of the FILTER column.
fn record_filters(variant: &Variant) -> Vec<String> {
    variant
        .file_data
        .get(FILTER_KEY)
        .map(|f| f.split(';').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Test one `key<op>value` of a file data group; the value may be a list.
fn passes_key_op_value(variant: &Variant, kov: &KeyOpValue) -> bool {
    let values = match ops::split_value(&kov.key, &kov.value) {
        Ok(values) => values,
        Err(_) => return false,
    };
    if kov.key == FILTER_KEY {
        return values_match(&values, &record_filters(variant), |f, v| f == v);
    }
    let actual = variant.file_data.get(&kov.key).map(String::as_str);
    match values.operation {
        Some(QueryOperation::And) => values.iter().all(|v| compare(kov.op, actual, v)),
        _ => values.iter().any(|v| compare(kov.op, actual, v)),
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::query::local_filter::LocalFilter;
    use crate::query::{QueryParam, Variant, VariantQuery};

    fn variant() -> Variant {
        Variant::new("1", 100, "A", "C")
            .with_file("fileA")
            .with_file_data("FILTER", "PASS")
            .with_file_data("QUAL", "35")
            .with_file_data("DP", "15")
    }

    #[rstest]
    #[case(QueryParam::File, "fileA", true)]
    #[case(QueryParam::File, "fileB", false)]
    #[case(QueryParam::File, "fileA,fileB", true)]
    #[case(QueryParam::File, "!fileA", false)]
    #[case(QueryParam::Filter, "PASS", true)]
    #[case(QueryParam::Filter, "LowGQ", false)]
    #[case(QueryParam::Qual, ">30", true)]
    #[case(QueryParam::Qual, "<=30", false)]
    #[case(QueryParam::FileData, "fileA:DP>10", true)]
    #[case(QueryParam::FileData, "fileA:DP>20", false)]
    #[case(QueryParam::FileData, "DP>10;FILTER=PASS", true)]
    #[case(QueryParam::FileData, "fileA:DP>10,fileB:DP>20", true)]
    #[case(QueryParam::FileData, "fileA:DP>10;fileB:DP>20", false)]
    #[case(QueryParam::FileData, "fileA:FILTER=PASS,LowGQ", true)]
    fn quality(
        #[case] param: QueryParam,
        #[case] value: &str,
        #[case] expected: bool,
    ) -> Result<(), anyhow::Error> {
        let filter = LocalFilter::new(&VariantQuery::default().with(param, value))?;
        assert_eq!(super::passes(&filter, &variant()), expected);
        Ok(())
    }
}
