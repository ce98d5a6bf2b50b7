//! Location conditions and their grouping by index chunk.

use crate::query::param::SKIP_GENE_REGIONS;
use crate::query::region::merge_regions;
use crate::query::{QueryParam, Region, VariantQuery};
use crate::sample_index::entry::{batch_start, BATCH_SIZE};
use crate::sample_index::query::QueryCoverage;
use crate::sample_index::Error;

/// Regions to read from the index.
///
/// Returns the chunk groups and the coverage of `region` and `geneRegions`.
/// Genes without gene regions may lie anywhere, so such queries read the
/// whole genome and keep `region`.
pub(super) fn plan_regions(input: &VariantQuery) -> Result<(Vec<Vec<Region>>, QueryCoverage), Error> {
    let regions = match input.get(QueryParam::Region) {
        Some(value) if !value.is_empty() => Region::parse_regions(value)?,
        _ => Vec::new(),
    };
    let gene_regions = match input.get(QueryParam::GeneRegions) {
        Some(SKIP_GENE_REGIONS) | None => Vec::new(),
        Some(value) => Region::parse_regions(value)?,
    };
    let mut coverage = QueryCoverage::default();
    let has_genes = input.is_valid(QueryParam::Gene);
    if has_genes && gene_regions.is_empty() {
        return Ok((Vec::new(), coverage));
    }

    if !has_genes {
        coverage.remove(QueryParam::Region);
    }
    if !gene_regions.is_empty() {
        if input.is_valid(QueryParam::ConsequenceType) || input.is_valid(QueryParam::Biotype) {
            coverage.replace(QueryParam::GeneRegions, SKIP_GENE_REGIONS);
        } else {
            coverage.remove(QueryParam::GeneRegions);
        }
    }
    let groups = group_regions(regions.into_iter().chain(gene_regions).collect());
    Ok((groups, coverage))
}

/// Merge regions and group them by the index chunks they touch.
///
/// Regions of the same chromosome share a group when they start in the same
/// chunk or lie less than one chunk apart.
pub fn group_regions(regions: Vec<Region>) -> Vec<Vec<Region>> {
    let mut groups: Vec<Vec<Region>> = Vec::new();
    for region in merge_regions(regions) {
        let joins = groups
            .last()
            .and_then(|group| group.last())
            .map(|last| {
                last.same_chromosome(&region.chromosome)
                    && (batch_start(last.start) == batch_start(region.start)
                        || region.start.saturating_sub(last.end) < BATCH_SIZE)
            })
            .unwrap_or(false);
        match groups.last_mut() {
            Some(group) if joins => group.push(region),
            _ => groups.push(vec![region]),
        }
    }
    groups
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn regions(value: &str) -> Vec<Region> {
        Region::parse_regions(value).expect("valid regions")
    }

    #[test]
    fn group_by_chunk() {
        let groups = group_regions(regions(
            "1:100-200,1:150-300,1:5000000-5000100,2:10-20,1:1000100-1000200",
        ));
        assert_eq!(
            groups,
            vec![
                vec![
                    Region::new("1", 100, 300),
                    Region::new("1", 1_000_100, 1_000_200)
                ],
                vec![Region::new("1", 5_000_000, 5_000_100)],
                vec![Region::new("2", 10, 20)],
            ]
        );
    }

    #[test]
    fn regions_are_answered() -> Result<(), anyhow::Error> {
        let input = VariantQuery::default()
            .with(QueryParam::Region, "1:100-200")
            .with(QueryParam::GeneRegions, "2:10-20");
        let (groups, coverage) = plan_regions(&input)?;
        assert_eq!(groups.len(), 2);
        assert!(coverage.apply(&input).is_empty());
        Ok(())
    }

    #[test]
    fn gene_regions_skipped_with_consequence_types() -> Result<(), anyhow::Error> {
        let input = VariantQuery::default()
            .with(QueryParam::GeneRegions, "2:10-20")
            .with(QueryParam::ConsequenceType, "missense_variant");
        let (_, coverage) = plan_regions(&input)?;
        let residual = coverage.apply(&input);
        assert_eq!(residual.get(QueryParam::GeneRegions), Some(SKIP_GENE_REGIONS));
        Ok(())
    }

    #[test]
    fn genes_without_gene_regions() -> Result<(), anyhow::Error> {
        let input = VariantQuery::default()
            .with(QueryParam::Region, "1:100-200")
            .with(QueryParam::Gene, "BRCA1");
        let (groups, coverage) = plan_regions(&input)?;
        assert!(groups.is_empty());
        assert_eq!(coverage.apply(&input), input);
        Ok(())
    }

    #[test]
    fn genes_with_gene_regions_keep_region() -> Result<(), anyhow::Error> {
        let input = VariantQuery::default()
            .with(QueryParam::Region, "1:100-200")
            .with(QueryParam::Gene, "BRCA1")
            .with(QueryParam::GeneRegions, "17:1000-2000");
        let (groups, coverage) = plan_regions(&input)?;
        let residual = coverage.apply(&input);
        assert_eq!(groups.len(), 2);
        assert_eq!(residual.get(QueryParam::Region), Some("1:100-200"));
        assert_eq!(residual.get(QueryParam::Gene), Some("BRCA1"));
        assert_eq!(residual.get(QueryParam::GeneRegions), None);
        Ok(())
    }
}
