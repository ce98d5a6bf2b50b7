//! Genotype strings, genotype classes, and the `genotype` filter grammar.

use indexmap::IndexMap;

use super::{ops, Error, QueryOperation};

/// Genotypes loaded by default when the study does not list them.
pub const DEFAULT_LOADED_GENOTYPES: &[&str] =
    &["0/1", "1/1", "0|1", "1|0", "1|1", "./1", "1/2", "0/2"];

/// A parsed genotype call, e.g. `0/1` or `1|0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Genotype {
    /// Allele indices; `None` for missing (`.`) alleles.
    pub alleles: Vec<Option<u32>>,
    pub phased: bool,
}

impl std::str::FromStr for Genotype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = ops::remove_negation(s.trim());
        if s.is_empty() {
            return Err(Error::InvalidGenotype(s.to_string()));
        }
        let phased = s.contains('|');
        let alleles = s
            .split(['/', '|'])
            .map(|a| match a {
                "." => Ok(None),
                _ => a
                    .parse::<u32>()
                    .map(Some)
                    .map_err(|_| Error::InvalidGenotype(s.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { alleles, phased })
    }
}

impl Genotype {
    pub fn is_missing(&self) -> bool {
        self.alleles.iter().any(Option::is_none)
    }

    pub fn is_hom_ref(&self) -> bool {
        self.alleles.iter().all(|a| *a == Some(0))
    }

    pub fn is_hom_alt(&self) -> bool {
        match self.alleles.first() {
            Some(Some(first)) if *first > 0 => self.alleles.iter().all(|a| *a == Some(*first)),
            _ => false,
        }
    }

    pub fn is_het(&self) -> bool {
        !self.is_missing()
            && self.alleles.len() > 1
            && self.alleles.iter().any(|a| *a != Some(0))
            && self.alleles.windows(2).any(|w| w[0] != w[1])
    }

    pub fn has_alt(&self) -> bool {
        self.alleles.iter().any(|a| matches!(a, Some(x) if *x > 0))
    }

    pub fn has_main_alt(&self) -> bool {
        self.alleles.contains(&Some(1))
    }

    /// Alleles sorted, ignoring phase.
    fn unphased_key(&self) -> Vec<Option<u32>> {
        let mut alleles = self.alleles.clone();
        alleles.sort();
        alleles
    }

    /// Whether both calls describe the same alleles regardless of phase and order.
    pub fn same_alleles(&self, other: &Genotype) -> bool {
        self.unphased_key() == other.unphased_key()
    }
}

/// Named classes of genotypes usable in genotype filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GenotypeClass {
    HomRef,
    Het,
    HomAlt,
    #[strum(serialize = "MISS")]
    Miss,
    MainAlt,
}

impl GenotypeClass {
    pub fn matches(&self, gt: &Genotype) -> bool {
        match self {
            GenotypeClass::HomRef => gt.is_hom_ref(),
            GenotypeClass::Het => gt.is_het(),
            GenotypeClass::HomAlt => gt.is_hom_alt(),
            GenotypeClass::Miss => gt.is_missing(),
            GenotypeClass::MainAlt => gt.has_main_alt(),
        }
    }

    /// Members of `loaded` belonging to this class, in their original order.
    pub fn filter(&self, loaded: &[String]) -> Vec<String> {
        loaded
            .iter()
            .filter(|s| {
                s.parse::<Genotype>()
                    .map(|gt| self.matches(&gt))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

/// Whether the call `gt` is matched by one genotype filter entry, either a
/// class or a literal genotype compared regardless of phase.
pub fn matches_genotype(value: &str, gt: &Genotype) -> bool {
    let value = ops::remove_negation(value);
    match value.parse::<GenotypeClass>() {
        Ok(class) => class.matches(gt),
        Err(_) => value
            .parse::<Genotype>()
            .map(|other| other.same_alleles(gt))
            .unwrap_or(false),
    }
}

/// Expand genotype classes and phase variants against the loaded genotypes.
///
/// Literal genotypes are kept and extended by the loaded genotypes carrying the
/// same alleles. Negated entries keep their `!` on every expanded value.
pub fn expand_genotypes(gts: &[String], loaded: &[String]) -> Result<Vec<String>, Error> {
    let mut result: Vec<String> = Vec::new();
    let push = |value: String, result: &mut Vec<String>| {
        if !result.contains(&value) {
            result.push(value);
        }
    };
    for raw in gts {
        let negated = ops::is_negated(raw);
        let gt = ops::remove_negation(raw);
        let prefix = if negated { "!" } else { "" };
        if let Ok(class) = gt.parse::<GenotypeClass>() {
            for member in class.filter(loaded) {
                push(format!("{}{}", prefix, member), &mut result);
            }
        } else {
            let parsed = gt.parse::<Genotype>()?;
            push(raw.clone(), &mut result);
            for other in loaded {
                if other != gt
                    && other
                        .parse::<Genotype>()
                        .map(|o| o.same_alleles(&parsed))
                        .unwrap_or(false)
                {
                    push(format!("{}{}", prefix, other), &mut result);
                }
            }
        }
    }
    Ok(result)
}

/// Parsed `genotype` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeFilter {
    /// Operator between samples; `None` for a single sample.
    pub operation: Option<QueryOperation>,
    /// Sample name to its raw genotype list, in query order.
    pub samples: IndexMap<String, Vec<String>>,
}

/// Parse the `genotype` parameter, e.g. `s1:0/1,1/1;s2:0/0`.
///
/// A token carrying `sample:` starts a new sample and the separator in front of
/// it is the operator between samples. Other tokens add genotypes to the last
/// sample and must be `,` separated.
pub fn parse_genotype_filter(value: &str) -> Result<GenotypeFilter, Error> {
    let mut samples: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut operation = None;
    let mut current: Option<String> = None;
    let mut sep = None;
    let mut rest = value;

    loop {
        let end = rest.find([',', ';']).unwrap_or(rest.len());
        let token = rest[..end].trim();
        if let Some((sample, gt)) = token.split_once(':') {
            if current.is_some() {
                let op = match sep {
                    Some(';') => QueryOperation::And,
                    _ => QueryOperation::Or,
                };
                if operation.map(|prev| prev != op).unwrap_or(false) {
                    return Err(Error::MixedOperators {
                        param: "genotype".into(),
                        value: value.into(),
                    });
                }
                operation = Some(op);
            }
            let sample = sample.trim().to_string();
            samples
                .entry(sample.clone())
                .or_default()
                .push(gt.trim().to_string());
            current = Some(sample);
        } else if !token.is_empty() {
            match (&current, sep) {
                (Some(sample), Some(',')) => samples
                    .entry(sample.clone())
                    .or_default()
                    .push(token.to_string()),
                _ => return Err(Error::InvalidGenotype(value.to_string())),
            }
        }
        if end == rest.len() {
            break;
        }
        sep = rest[end..].chars().next();
        rest = &rest[end + 1..];
    }

    if samples.is_empty() {
        return Err(Error::InvalidGenotype(value.to_string()));
    }
    Ok(GenotypeFilter { operation, samples })
}
