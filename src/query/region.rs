//! Genomic regions (1-based, inclusive).

use std::cmp::Ordering;

use crate::common;

use super::Error;

/// A genomic region with 1-based inclusive coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub chromosome: String,
    pub start: i32,
    pub end: i32,
}

impl Region {
    pub fn new(chromosome: impl Into<String>, start: i32, end: i32) -> Self {
        Self {
            chromosome: chromosome.into(),
            start,
            end,
        }
    }

    /// Region spanning the whole chromosome.
    pub fn whole_chromosome(chromosome: impl Into<String>) -> Self {
        Self::new(chromosome, 1, i32::MAX)
    }

    pub fn same_chromosome(&self, chromosome: &str) -> bool {
        common::canonicalize(&self.chromosome) == common::canonicalize(chromosome)
    }

    pub fn contains(&self, chromosome: &str, position: i32) -> bool {
        self.same_chromosome(chromosome) && self.start <= position && position <= self.end
    }

    /// Whether the interval `[start, end]` on `chromosome` overlaps this region.
    pub fn overlaps(&self, chromosome: &str, start: i32, end: i32) -> bool {
        self.same_chromosome(chromosome) && self.start <= end && start <= self.end
    }

    /// Parse a comma-separated list of regions.
    pub fn parse_regions(value: &str) -> Result<Vec<Region>, Error> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start <= 1 && self.end == i32::MAX {
            write!(f, "{}", self.chromosome)
        } else {
            write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
        }
    }
}

impl std::str::FromStr for Region {
    type Err = Error;

    /// Parse `chr`, `chr:pos`, or `chr:start-end`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || Error::InvalidRegion(s.to_string());
        let s = s.trim();
        match s.rsplit_once(':') {
            None if !s.is_empty() => Ok(Region::whole_chromosome(s)),
            None => Err(err()),
            Some((chrom, range)) => {
                if chrom.is_empty() {
                    return Err(err());
                }
                let parse = |x: &str| x.trim().replace(',', "").parse::<i32>().map_err(|_| err());
                let (start, end) = match range.split_once('-') {
                    Some((start, end)) => (parse(start)?, parse(end)?),
                    None => {
                        let pos = parse(range)?;
                        (pos, pos)
                    }
                };
                if start > end {
                    return Err(err());
                }
                Ok(Region::new(chrom, start.max(1), end))
            }
        }
    }
}

/// Genomic order of regions: chromosome, start, end.
pub fn region_cmp(lhs: &Region, rhs: &Region) -> Ordering {
    common::chrom_cmp(&lhs.chromosome, &rhs.chromosome)
        .then(lhs.start.cmp(&rhs.start))
        .then(lhs.end.cmp(&rhs.end))
}

/// Sort regions and merge the overlapping or adjacent ones.
pub fn merge_regions(regions: Vec<Region>) -> Vec<Region> {
    let mut regions = regions;
    regions.sort_by(region_cmp);
    let mut result: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        match result.last_mut() {
            Some(last)
                if last.same_chromosome(&region.chromosome)
                    && region.start <= last.end.saturating_add(1) =>
            {
                last.end = last.end.max(region.end);
            }
            _ => result.push(region),
        }
    }
    result
}
