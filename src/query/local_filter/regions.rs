use crate::query::Variant;

use super::LocalFilter;

/// Determine whether the `Variant` passes the location filters.
///
/// Regions contain a variant when they contain its start position. A variant
/// passes when it is in any region or annotated to any of the genes. Gene
/// regions narrow the gene match down to the given extents.
pub fn passes(filter: &LocalFilter, variant: &Variant) -> bool {
    if !passes_location(filter, variant) {
        tracing::trace!("variant {} fails location filter", variant);
        return false;
    }
    if !passes_type(filter, variant) {
        tracing::trace!("variant {} fails type filter {:?}", variant, &filter.types);
        return false;
    }
    if !filter.ids.is_empty()
        && !filter.ids.iter().any(|id| {
            variant.id.as_deref() == Some(id.as_str()) || variant.to_string() == *id
        })
    {
        tracing::trace!("variant {} fails id filter", variant);
        return false;
    }
    true
}

fn passes_location(filter: &LocalFilter, variant: &Variant) -> bool {
    if filter.regions.is_empty() && filter.genes.is_empty() && filter.gene_regions.is_empty() {
        return true;
    }
    let contained = |regions: &[crate::query::Region]| {
        regions
            .iter()
            .any(|r| r.contains(&variant.chromosome, variant.start))
    };
    let in_gene_regions = filter.gene_regions.is_empty() || contained(&filter.gene_regions);
    let in_gene = if filter.genes.is_empty() {
        !filter.gene_regions.is_empty() && in_gene_regions
    } else {
        in_gene_regions
            && variant
                .annotation
                .as_ref()
                .map(|a| {
                    a.consequence_types.iter().any(|ct| {
                        ct.gene
                            .as_ref()
                            .map(|g| filter.genes.contains(g))
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false)
    };
    contained(&filter.regions) || in_gene
}

/// `COPY_NUMBER` also selects copy number gains and losses.
fn passes_type(filter: &LocalFilter, variant: &Variant) -> bool {
    if filter.types.is_empty() {
        return true;
    }
    let variant_type = variant.variant_type();
    filter
        .types
        .iter()
        .any(|t| *t == variant_type || *t == variant_type.index_type())
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::query::local_filter::LocalFilter;
    use crate::query::variant::{ConsequenceType, VariantAnnotation};
    use crate::query::{QueryParam, Variant, VariantQuery};

    fn variant() -> Variant {
        Variant::new("chr1", 1000, "A", "C")
            .with_id("rs1")
            .with_annotation(VariantAnnotation {
                consequence_types: vec![ConsequenceType {
                    gene: Some("BRCA1".into()),
                    ..Default::default()
                }],
                ..Default::default()
            })
    }

    #[rstest]
    #[case(QueryParam::Region, "1:900-1000", true)]
    #[case(QueryParam::Region, "1:1001-2000", false)]
    #[case(QueryParam::Region, "2", false)]
    #[case(QueryParam::GeneRegions, "1:1-5000", true)]
    #[case(QueryParam::GeneRegions, "SKIP", true)]
    #[case(QueryParam::Gene, "BRCA1", true)]
    #[case(QueryParam::Gene, "TP53", false)]
    #[case(QueryParam::GeneRegions, "1:2000-5000", false)]
    #[case(QueryParam::Type, "SNV,INDEL", true)]
    #[case(QueryParam::Type, "INDEL", false)]
    #[case(QueryParam::Id, "rs1", true)]
    #[case(QueryParam::Id, "chr1:1000:A:C", true)]
    #[case(QueryParam::Id, "rs2", false)]
    fn location(
        #[case] param: QueryParam,
        #[case] value: &str,
        #[case] expected: bool,
    ) -> Result<(), anyhow::Error> {
        let filter = LocalFilter::new(&VariantQuery::default().with(param, value))?;
        assert_eq!(super::passes(&filter, &variant()), expected);
        Ok(())
    }

    #[rstest]
    #[case("BRCA1", "1:1-5000", true)]
    #[case("BRCA1", "1:2000-5000", false)]
    #[case("TP53", "1:1-5000", false)]
    #[case("BRCA1", "SKIP", true)]
    fn gene_with_gene_regions(
        #[case] gene: &str,
        #[case] gene_regions: &str,
        #[case] expected: bool,
    ) -> Result<(), anyhow::Error> {
        let query = VariantQuery::default()
            .with(QueryParam::Gene, gene)
            .with(QueryParam::GeneRegions, gene_regions);
        let filter = LocalFilter::new(&query)?;
        assert_eq!(super::passes(&filter, &variant()), expected);
        Ok(())
    }

    #[test]
    fn copy_number_type() -> Result<(), anyhow::Error> {
        let gain = Variant::new("1", 100, "N", "<CN4>");
        let filter = LocalFilter::new(&VariantQuery::default().with(QueryParam::Type, "COPY_NUMBER"))?;
        assert!(super::passes(&filter, &gain));
        let filter =
            LocalFilter::new(&VariantQuery::default().with(QueryParam::Type, "COPY_NUMBER_LOSS"))?;
        assert!(!super::passes(&filter, &gain));
        Ok(())
    }
}
