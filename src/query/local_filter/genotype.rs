use crate::query::genotype::{matches_genotype, Genotype};
use crate::query::ops;
use crate::query::{QueryOperation, Variant};

use super::{compare, LocalFilter};

/// Genotype assumed for samples without a call in the record.
const NO_CALL: &str = "0/0";

/// Determine whether the `Variant` passes the `genotype`, `sample`, and
/// `sampleData` filters.
pub fn passes(filter: &LocalFilter, variant: &Variant) -> bool {
    if let Some(genotypes) = &filter.genotypes {
        let mut results = genotypes
            .samples
            .iter()
            .map(|(sample, gts)| passes_sample(variant, sample, gts));
        let pass = match genotypes.operation {
            Some(QueryOperation::Or) => results.any(|r| r),
            _ => results.all(|r| r),
        };
        if !pass {
            tracing::trace!("variant {} fails genotype filter {:?}", variant, genotypes);
            return false;
        }
    }

    let samples = filter
        .samples
        .iter()
        .filter(|s| !ops::is_negated(s))
        .collect::<Vec<_>>();
    if !samples.is_empty() {
        let has_main_alt = |sample: &String| {
            sample_genotype(variant, sample)
                .map(|gt| gt.has_main_alt())
                .unwrap_or(false)
        };
        let pass = match filter.samples.operation {
            Some(QueryOperation::And) => samples.iter().all(|s| has_main_alt(s)),
            _ => samples.iter().any(|s| has_main_alt(s)),
        };
        if !pass {
            tracing::trace!("variant {} fails sample filter", variant);
            return false;
        }
    }

    if !filter.sample_data.is_empty() {
        let mut groups = filter.sample_data.iter().map(|group| {
            let data = group
                .key
                .as_ref()
                .and_then(|sample| variant.sample_data.get(sample));
            group.values.iter().all(|kov| {
                let actual = data.and_then(|d| d.get(&kov.key)).map(String::as_str);
                match ops::split_value(&kov.key, &kov.value) {
                    Ok(values) => match values.operation {
                        Some(QueryOperation::And) => {
                            values.iter().all(|v| compare(kov.op, actual, v))
                        }
                        _ => values.iter().any(|v| compare(kov.op, actual, v)),
                    },
                    Err(_) => false,
                }
            })
        });
        let pass = match filter.sample_data.operation {
            Some(QueryOperation::Or) => groups.any(|g| g),
            _ => groups.all(|g| g),
        };
        if !pass {
            tracing::trace!("variant {} fails sample data filter", variant);
            return false;
        }
    }
    true
}

fn sample_genotype(variant: &Variant, sample: &str) -> Option<Genotype> {
    variant
        .genotypes
        .get(sample)
        .map(String::as_str)
        .unwrap_or(NO_CALL)
        .parse()
        .ok()
}

/// Match the call of one sample against its genotype list.
///
/// Calls must match one of the plain entries, if any, and none of the negated
/// entries. Genotypes match regardless of phase.
fn passes_sample(variant: &Variant, sample: &str, gts: &[String]) -> bool {
    let gt = match sample_genotype(variant, sample) {
        Some(gt) => gt,
        None => return false,
    };
    let (negated, plain): (Vec<&String>, Vec<&String>) =
        gts.iter().partition(|v| ops::is_negated(v));
    if negated.iter().any(|v| matches_genotype(v, &gt)) {
        return false;
    }
    plain.is_empty() || plain.iter().any(|v| matches_genotype(v, &gt))
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::query::local_filter::LocalFilter;
    use crate::query::{QueryParam, Variant, VariantQuery};

    fn trio_variant() -> Variant {
        Variant::new("1", 100, "A", "C")
            .with_genotype("child", "0/1")
            .with_genotype("father", "0/0")
            .with_genotype("mother", "1|0")
            .with_sample_data("child", "DP", "25")
    }

    #[rstest]
    #[case(QueryParam::Genotype, "child:0/1", true)]
    #[case(QueryParam::Genotype, "child:1/1", false)]
    #[case(QueryParam::Genotype, "child:HET", true)]
    #[case(QueryParam::Genotype, "child:0/1;father:0/0;mother:0/0", false)]
    #[case(QueryParam::Genotype, "child:0/1;father:0/0;mother:0/1", true)]
    #[case(QueryParam::Genotype, "child:1/1,father:0/0", true)]
    #[case(QueryParam::Genotype, "child:!1/1", true)]
    #[case(QueryParam::Genotype, "child:!0/1", false)]
    #[case(QueryParam::Genotype, "sibling:0/0", true)]
    #[case(QueryParam::Sample, "child", true)]
    #[case(QueryParam::Sample, "child;father", false)]
    #[case(QueryParam::Sample, "child,father", true)]
    #[case(QueryParam::Sample, "father", false)]
    #[case(QueryParam::SampleData, "child:DP>20", true)]
    #[case(QueryParam::SampleData, "child:DP>30", false)]
    #[case(QueryParam::SampleData, "father:DP>10", false)]
    #[case(QueryParam::SampleData, "father:DP>10,child:DP>=25", true)]
    fn genotypes(
        #[case] param: QueryParam,
        #[case] value: &str,
        #[case] expected: bool,
    ) -> Result<(), anyhow::Error> {
        let filter = LocalFilter::new(&VariantQuery::default().with(param, value))?;
        assert_eq!(super::passes(&filter, &trio_variant()), expected);
        Ok(())
    }
}
