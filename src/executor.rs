//! Common interface of the query executors.

use crate::query::{Variant, VariantQuery};

/// Default number of variants fetched to estimate counts.
pub const DEFAULT_APPROXIMATE_COUNT_SAMPLING_SIZE: usize = 1000;

/// Paging and counting options of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximal number of results; `None` for all.
    pub limit: Option<usize>,
    pub skip: usize,
    /// Whether to compute the number of matches.
    pub count: bool,
    pub approximate_count_sampling_size: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: None,
            skip: 0,
            count: false,
            approximate_count_sampling_size: DEFAULT_APPROXIMATE_COUNT_SAMPLING_SIZE,
        }
    }
}

impl QueryOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_count(mut self, count: bool) -> Self {
        self.count = count;
        self
    }

    /// Apply `skip` and `limit` to `variants`.
    pub fn page(&self, variants: Vec<Variant>) -> Vec<Variant> {
        variants
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Result page of a query.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct VariantQueryResult {
    pub variants: Vec<Variant>,
    /// Number of matches, if counted.
    pub num_matches: Option<usize>,
    /// Whether `num_matches` is an estimate.
    pub approximate_count: bool,
}

/// Something that answers variant queries.
pub trait VariantQueryExecutor: Sync {
    type Error;

    /// Whether this executor can answer `query`.
    fn can_use_this_executor(
        &self,
        query: &VariantQuery,
        options: &QueryOptions,
    ) -> Result<bool, Self::Error>;

    fn query(
        &self,
        query: &VariantQuery,
        options: &QueryOptions,
    ) -> Result<VariantQueryResult, Self::Error>;
}
