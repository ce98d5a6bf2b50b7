//! Index fields: value encoding and translation of query conditions into
//! filters over the encoded codes.

use std::collections::{HashMap, HashSet};

use crate::query::ops::FilterOp;
use crate::query::{QueryOperation, Values};

use super::config::{IndexFieldConfiguration, IndexFieldType, Source};
use super::filter::{FieldLocation, IndexFieldFilter};
use super::{BitBuffer, Error};

/// Offset added to open bounds of non-integer range queries.
pub const DELTA: f64 = 1e-7;

/// Number of bits needed to store `num_codes` distinct codes.
pub fn bits_for(num_codes: usize) -> usize {
    let mut bits = 1;
    while (1usize << bits) < num_codes {
        bits += 1;
    }
    bits
}

/// Configured values, each standing for a group of raw values.
#[derive(Debug, Clone)]
struct ValueGroups {
    groups: Vec<Vec<String>>,
    lookup: HashMap<String, usize>,
}

impl ValueGroups {
    fn new(config: &IndexFieldConfiguration) -> Result<Self, Error> {
        let mut groups = Vec::with_capacity(config.values.len());
        let mut lookup = HashMap::new();
        for (i, value) in config.values.iter().enumerate() {
            let members = config
                .values_mapping
                .get(value)
                .cloned()
                .unwrap_or_else(|| vec![value.clone()]);
            for member in &members {
                if lookup.insert(member.clone(), i).is_some() {
                    return Err(Error::InvalidField {
                        key: config.key.clone(),
                        reason: format!("value {} mapped twice", member),
                    });
                }
            }
            groups.push(members);
        }
        Ok(Self { groups, lookup })
    }

    fn len(&self) -> usize {
        self.groups.len()
    }

    fn group_of(&self, value: &str) -> Option<usize> {
        self.lookup.get(value).copied()
    }

    /// Whether all members of the group are in `values`.
    fn covered_by(&self, group: usize, values: &HashSet<&str>) -> bool {
        self.groups[group].iter().all(|m| values.contains(m.as_str()))
    }
}

#[derive(Debug, Clone)]
enum FieldKind {
    Categorical(ValueGroups),
    MultiValue(ValueGroups),
    Range(Vec<f64>),
}

/// One field of an index entry.
#[derive(Debug, Clone)]
pub struct IndexField {
    config: IndexFieldConfiguration,
    location: FieldLocation,
    kind: FieldKind,
}

impl IndexField {
    /// Lay out a field at `offset` bits.
    pub fn new(config: IndexFieldConfiguration, offset: usize) -> Result<Self, Error> {
        let kind = match config.field_type {
            IndexFieldType::Categorical => FieldKind::Categorical(ValueGroups::new(&config)?),
            IndexFieldType::CategoricalMultiValue => {
                let groups = ValueGroups::new(&config)?;
                if groups.len() == 0 || groups.len() > 32 {
                    return Err(Error::InvalidField {
                        key: config.key.clone(),
                        reason: format!("{} values do not fit 1..=32 bits", groups.len()),
                    });
                }
                FieldKind::MultiValue(groups)
            }
            IndexFieldType::Range => {
                if config.thresholds.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::InvalidField {
                        key: config.key.clone(),
                        reason: "thresholds must be strictly increasing".into(),
                    });
                }
                FieldKind::Range(config.thresholds.clone())
            }
        };
        let length = match &kind {
            FieldKind::Categorical(groups) => {
                bits_for(groups.len() + 1 + usize::from(config.nullable))
            }
            FieldKind::MultiValue(groups) => groups.len(),
            FieldKind::Range(thresholds) => {
                bits_for(thresholds.len() + 1 + usize::from(config.nullable))
            }
        };
        if length > 32 {
            return Err(Error::InvalidField {
                key: config.key.clone(),
                reason: format!("{} bits exceed 32", length),
            });
        }
        Ok(Self {
            config,
            location: FieldLocation { offset, length },
            kind,
        })
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn source(&self) -> Source {
        self.config.source
    }

    pub fn config(&self) -> &IndexFieldConfiguration {
        &self.config
    }

    pub fn location(&self) -> FieldLocation {
        self.location
    }

    pub fn bit_length(&self) -> usize {
        self.location.length
    }

    fn null_offset(&self) -> u32 {
        u32::from(self.config.nullable)
    }

    /// Number of distinct codes of a categorical or range field.
    fn num_codes(&self) -> u32 {
        match &self.kind {
            FieldKind::Categorical(groups) => groups.len() as u32 + 1 + self.null_offset(),
            FieldKind::Range(thresholds) => thresholds.len() as u32 + 1 + self.null_offset(),
            FieldKind::MultiValue(groups) => groups.len() as u32,
        }
    }

    /// Encode a raw value; `None` (or `.`) is a missing value.
    ///
    /// Multi-valued fields take a `,` separated list.
    pub fn encode(&self, value: Option<&str>) -> Result<u32, Error> {
        let value = value.filter(|v| !v.is_empty() && *v != ".");
        match &self.kind {
            FieldKind::Categorical(groups) => Ok(match value {
                None if self.config.nullable => 0,
                None => self.num_codes() - 1,
                Some(v) => match groups.group_of(v) {
                    Some(g) => g as u32 + self.null_offset(),
                    None => self.num_codes() - 1,
                },
            }),
            FieldKind::MultiValue(_) => {
                let values = value
                    .map(|v| v.split(',').map(str::trim).collect::<Vec<_>>())
                    .unwrap_or_default();
                Ok(self.encode_all(&values))
            }
            FieldKind::Range(_) => {
                let number = match value {
                    None => None,
                    Some(v) => Some(v.parse::<f64>().map_err(|_| Error::InvalidOperand {
                        key: self.config.key.clone(),
                        value: v.to_string(),
                    })?),
                };
                Ok(self.encode_number(number))
            }
        }
    }

    /// Bit set of all values of a multi-valued field; unknown values are ignored.
    pub fn encode_all<S: AsRef<str>>(&self, values: &[S]) -> u32 {
        match &self.kind {
            FieldKind::MultiValue(groups) => values
                .iter()
                .filter_map(|v| groups.group_of(v.as_ref()))
                .fold(0u32, |acc, g| acc | (1 << g)),
            _ => values
                .first()
                .and_then(|v| self.encode(Some(v.as_ref())).ok())
                .unwrap_or(0),
        }
    }

    /// Encode a number for a range field.
    pub fn encode_number(&self, value: Option<f64>) -> u32 {
        match &self.kind {
            FieldKind::Range(thresholds) => match value {
                None => 0,
                Some(v) => {
                    self.null_offset() + thresholds.iter().filter(|t| **t <= v).count() as u32
                }
            },
            _ => 0,
        }
    }

    /// Bit index of a value of a multi-valued field.
    pub fn bit_of(&self, value: &str) -> Option<usize> {
        match &self.kind {
            FieldKind::MultiValue(groups) => groups.group_of(value),
            _ => None,
        }
    }

    /// Raw members of the value stored at `bit` of a multi-valued field.
    pub fn bit_members(&self, bit: usize) -> &[String] {
        match &self.kind {
            FieldKind::MultiValue(groups) | FieldKind::Categorical(groups) => {
                groups.groups.get(bit).map(Vec::as_slice).unwrap_or(&[])
            }
            FieldKind::Range(_) => &[],
        }
    }

    pub fn read(&self, entry: &BitBuffer) -> Result<u32, Error> {
        entry.read(self.location.offset, self.location.length)
    }

    pub fn write(&self, entry: &mut BitBuffer, code: u32) -> Result<(), Error> {
        entry.write(self.location.offset, self.location.length, code)
    }

    pub fn no_op_filter(&self, exact: bool) -> IndexFieldFilter {
        IndexFieldFilter::no_op(&self.config.key, exact)
    }

    /// Build a filter from a single `op value` condition.
    pub fn build_filter(&self, op: FilterOp, value: &str) -> Result<IndexFieldFilter, Error> {
        self.build_filter_values(op, &Values::single(value.to_string()))
    }

    /// Build a filter from a list of values sharing one operator.
    ///
    /// Values of a list combine with the list operator; an `OR` list is the
    /// union of its values.
    pub fn build_filter_values(
        &self,
        op: FilterOp,
        values: &Values<String>,
    ) -> Result<IndexFieldFilter, Error> {
        if values.is_empty() {
            return Ok(self.no_op_filter(false));
        }
        match &self.kind {
            FieldKind::Categorical(groups) => Ok(self.categorical_filter(groups, op, values)),
            FieldKind::MultiValue(groups) => Ok(self.multi_value_filter(groups, op, values)),
            FieldKind::Range(thresholds) => {
                if values.len() > 1 && op != FilterOp::Eq {
                    return Ok(self.no_op_filter(false));
                }
                let mut filters = Vec::new();
                for value in values {
                    let number = value.parse::<f64>().map_err(|_| Error::InvalidOperand {
                        key: self.config.key.clone(),
                        value: value.clone(),
                    })?;
                    filters.push(self.range_filter(thresholds, op, number));
                }
                if filters.len() == 1 {
                    Ok(filters.remove(0))
                } else {
                    Ok(self.no_op_filter(false))
                }
            }
        }
    }

    fn categorical_filter(
        &self,
        groups: &ValueGroups,
        op: FilterOp,
        values: &Values<String>,
    ) -> IndexFieldFilter {
        let query = values.iter().map(String::as_str).collect::<HashSet<_>>();
        if values.len() > 1 && values.operation == Some(QueryOperation::And) {
            return self.no_op_filter(false);
        }
        let mut accepted = 0u64;
        let mut exact = true;
        for value in values {
            let code = match groups.group_of(value) {
                Some(g) => {
                    if !groups.covered_by(g, &query) {
                        exact = false;
                    }
                    g as u32 + self.null_offset()
                }
                None => {
                    exact = false;
                    self.num_codes() - 1
                }
            };
            accepted |= 1u64 << code;
        }
        let location = self.location;
        match op {
            FilterOp::Eq => IndexFieldFilter::Codes {
                key: self.config.key.clone(),
                location,
                accepted,
                exact,
            },
            FilterOp::NotEq if values.len() == 1 && exact => {
                let all = (1u64 << self.num_codes()) - 1;
                IndexFieldFilter::Codes {
                    key: self.config.key.clone(),
                    location,
                    accepted: all & !accepted,
                    exact,
                }
            }
            _ => self.no_op_filter(false),
        }
    }

    fn multi_value_filter(
        &self,
        groups: &ValueGroups,
        op: FilterOp,
        values: &Values<String>,
    ) -> IndexFieldFilter {
        if op != FilterOp::Eq {
            return self.no_op_filter(false);
        }
        let all = values.operation == Some(QueryOperation::And);
        let query = values.iter().map(String::as_str).collect::<HashSet<_>>();
        let mut mask = 0u32;
        let mut exact = true;
        for value in values {
            match groups.group_of(value) {
                Some(g) => {
                    mask |= 1 << g;
                    if all {
                        if groups.groups[g].len() != 1 {
                            exact = false;
                        }
                    } else if !groups.covered_by(g, &query) {
                        exact = false;
                    }
                }
                None if all => exact = false,
                // an unknown value under OR may be present in any variant
                None => return self.no_op_filter(false),
            }
        }
        if mask == 0 {
            return self.no_op_filter(false);
        }
        IndexFieldFilter::Bits {
            key: self.config.key.clone(),
            location: self.location,
            mask,
            all,
            exact,
        }
    }

    /// Whether `value` lies on a code boundary of the field.
    fn is_boundary(&self, thresholds: &[f64], value: f64, lower: bool) -> bool {
        let bound = if lower { self.config.min } else { self.config.max };
        if value.is_infinite() {
            return true;
        }
        if let Some(bound) = bound {
            if (lower && value <= bound) || (!lower && value >= bound) {
                return true;
            }
        }
        thresholds.iter().any(|t| (t - value).abs() < DELTA / 10.0)
    }

    fn range_filter(&self, thresholds: &[f64], op: FilterOp, value: f64) -> IndexFieldFilter {
        let step = |v: f64| {
            if self.config.integer {
                v.floor() + 1.0
            } else {
                v + DELTA
            }
        };
        let (lo, hi) = match op {
            FilterOp::Lt | FilterOp::LtLt => (f64::NEG_INFINITY, value),
            FilterOp::Le => (f64::NEG_INFINITY, step(value)),
            FilterOp::Gt | FilterOp::GtGt => (step(value), f64::INFINITY),
            FilterOp::Ge => (value, f64::INFINITY),
            FilterOp::Eq => (value, step(value)),
            FilterOp::NotEq => return self.no_op_filter(false),
        };
        let offset = self.null_offset();
        let min_code = if lo.is_finite() {
            offset + thresholds.iter().filter(|t| **t <= lo).count() as u32
        } else {
            offset
        };
        let max_code = if hi.is_finite() {
            offset + thresholds.iter().filter(|t| **t < hi).count() as u32 + 1
        } else {
            self.num_codes()
        };
        let include_null = self.config.nullable && matches!(op, FilterOp::LtLt | FilterOp::GtGt);
        let exact =
            self.is_boundary(thresholds, lo, true) && self.is_boundary(thresholds, hi, false);
        IndexFieldFilter::Range {
            key: self.config.key.clone(),
            location: self.location,
            min_code: min_code.min(max_code),
            max_code,
            include_null,
            exact,
        }
    }
}
