//! Filters over the codes of one index field.

use super::{BitBuffer, Error};

/// Bit position of a field within an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct FieldLocation {
    pub offset: usize,
    pub length: usize,
}

/// A filter over the code of one index field.
///
/// A filter is *exact* when every code it accepts only holds values matching
/// the query, so the originating query condition can be dropped.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum IndexFieldFilter {
    /// Accepts every code.
    NoOp { key: String, exact: bool },
    /// Accepts the codes in the bit set `accepted` (categorical fields).
    Codes {
        key: String,
        location: FieldLocation,
        accepted: u64,
        exact: bool,
    },
    /// Accepts codes sharing any (or all, with `all`) bits with `mask`.
    Bits {
        key: String,
        location: FieldLocation,
        mask: u32,
        all: bool,
        exact: bool,
    },
    /// Accepts codes in `[min_code, max_code)`, and the null code 0 if
    /// `include_null` is set (range fields).
    Range {
        key: String,
        location: FieldLocation,
        min_code: u32,
        max_code: u32,
        include_null: bool,
        exact: bool,
    },
}

impl IndexFieldFilter {
    pub fn no_op(key: &str, exact: bool) -> Self {
        IndexFieldFilter::NoOp {
            key: key.to_string(),
            exact,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            IndexFieldFilter::NoOp { key, .. }
            | IndexFieldFilter::Codes { key, .. }
            | IndexFieldFilter::Bits { key, .. }
            | IndexFieldFilter::Range { key, .. } => key,
        }
    }

    pub fn is_exact(&self) -> bool {
        match self {
            IndexFieldFilter::NoOp { exact, .. }
            | IndexFieldFilter::Codes { exact, .. }
            | IndexFieldFilter::Bits { exact, .. }
            | IndexFieldFilter::Range { exact, .. } => *exact,
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self, IndexFieldFilter::NoOp { .. })
    }

    pub fn location(&self) -> Option<FieldLocation> {
        match self {
            IndexFieldFilter::NoOp { .. } => None,
            IndexFieldFilter::Codes { location, .. }
            | IndexFieldFilter::Bits { location, .. }
            | IndexFieldFilter::Range { location, .. } => Some(*location),
        }
    }

    /// Test a field code.
    pub fn test(&self, code: u32) -> bool {
        match self {
            IndexFieldFilter::NoOp { .. } => true,
            IndexFieldFilter::Codes { accepted, .. } => code < 64 && accepted & (1u64 << code) != 0,
            IndexFieldFilter::Bits { mask, all, .. } => {
                if *all {
                    code & mask == *mask
                } else {
                    code & mask != 0
                }
            }
            IndexFieldFilter::Range {
                min_code,
                max_code,
                include_null,
                ..
            } => (*include_null && code == 0) || (*min_code <= code && code < *max_code),
        }
    }

    /// Read the field from an index entry and test its code.
    pub fn read_and_test(&self, entry: &BitBuffer) -> Result<bool, Error> {
        match self.location() {
            None => Ok(true),
            Some(location) => Ok(self.test(entry.read(location.offset, location.length)?)),
        }
    }

    /// Test the field within a value packing several fields, such as the
    /// clinical or population frequency codes of one variant.
    pub fn test_packed(&self, packed: u32) -> bool {
        match self.location() {
            None => true,
            Some(FieldLocation { offset, length }) => {
                let mask = if length >= 32 {
                    u32::MAX
                } else {
                    (1u32 << length) - 1
                };
                self.test(packed.checked_shr(offset as u32).unwrap_or(0) & mask)
            }
        }
    }

    /// Whether the filter selects the bit at `bit` of a multi-valued field.
    ///
    /// Used for the per-value rows and columns of the combination matrices.
    pub fn matches_bit(&self, bit: usize) -> bool {
        match self {
            IndexFieldFilter::NoOp { .. } => true,
            IndexFieldFilter::Bits { mask, .. } => bit < 32 && mask & (1 << bit) != 0,
            _ => bit < 32 && self.test(1 << bit),
        }
    }

    /// Mask of a bit filter, all ones for a no-op.
    pub fn mask(&self) -> u32 {
        match self {
            IndexFieldFilter::Bits { mask, .. } => *mask,
            _ => u32::MAX,
        }
    }
}

impl std::fmt::Display for IndexFieldFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let exact = if self.is_exact() { "exact" } else { "inexact" };
        match self {
            IndexFieldFilter::NoOp { key, .. } => write!(f, "{} NOOP ({})", key, exact),
            IndexFieldFilter::Codes { key, accepted, .. } => {
                write!(f, "{} IN {:#b} ({})", key, accepted, exact)
            }
            IndexFieldFilter::Bits { key, mask, all, .. } => write!(
                f,
                "{} {} {:#b} ({})",
                key,
                if *all { "ALL" } else { "ANY" },
                mask,
                exact
            ),
            IndexFieldFilter::Range {
                key,
                min_code,
                max_code,
                include_null,
                ..
            } => write!(
                f,
                "{} IN [{}, {}){} ({})",
                key,
                min_code,
                max_code,
                if *include_null { " OR NULL" } else { "" },
                exact
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    const LOCATION: FieldLocation = FieldLocation {
        offset: 2,
        length: 4,
    };

    #[rstest]
    // codes 1 and 3
    #[case(IndexFieldFilter::Codes { key: "f".into(), location: LOCATION, accepted: 0b1010, exact: true }, vec![1, 3])]
    // any of bits 0 and 2
    #[case(IndexFieldFilter::Bits { key: "f".into(), location: LOCATION, mask: 0b101, all: false, exact: true }, vec![1, 3, 4, 5, 6, 7, 9, 11, 12, 13, 14, 15])]
    // both bits 0 and 2
    #[case(IndexFieldFilter::Bits { key: "f".into(), location: LOCATION, mask: 0b101, all: true, exact: true }, vec![5, 7, 13, 15])]
    // codes 2..5 and null
    #[case(IndexFieldFilter::Range { key: "f".into(), location: LOCATION, min_code: 2, max_code: 5, include_null: true, exact: true }, vec![0, 2, 3, 4])]
    #[case(IndexFieldFilter::no_op("f", false), (0..16).collect())]
    fn accepted_codes(#[case] filter: IndexFieldFilter, #[case] expected: Vec<u32>) {
        let accepted = (0..16).filter(|c| filter.test(*c)).collect::<Vec<_>>();
        assert_eq!(accepted, expected);
    }

    #[test]
    fn read_and_test() -> Result<(), anyhow::Error> {
        let filter = IndexFieldFilter::Codes {
            key: "f".into(),
            location: LOCATION,
            accepted: 0b1000,
            exact: true,
        };
        let mut entry = BitBuffer::new(8);
        entry.write(2, 4, 3)?;
        assert!(filter.read_and_test(&entry)?);
        entry.write(2, 4, 2)?;
        assert!(!filter.read_and_test(&entry)?);
        assert!(filter.read_and_test(&BitBuffer::new(4)).is_err());
        Ok(())
    }

    #[test]
    fn test_packed() {
        // code 3 at offset 2, other bits set around it
        let packed = 0b1_0011_01;
        let filter = IndexFieldFilter::Codes {
            key: "f".into(),
            location: LOCATION,
            accepted: 0b1000,
            exact: true,
        };
        assert!(filter.test_packed(packed));
        assert!(!filter.test_packed(0b1_0010_01));
    }

    #[test]
    fn matches_bit() {
        let filter = IndexFieldFilter::Bits {
            key: "ct".into(),
            location: LOCATION,
            mask: 0b0110,
            all: false,
            exact: true,
        };
        let bits = (0..4).filter(|b| filter.matches_bit(*b)).collect::<Vec<_>>();
        assert_eq!(bits, vec![1, 2]);
        assert!(IndexFieldFilter::no_op("ct", false).matches_bit(31));
    }

    #[test]
    fn display() {
        let filter = IndexFieldFilter::Range {
            key: "QUAL".into(),
            location: LOCATION,
            min_code: 2,
            max_code: 4,
            include_null: false,
            exact: true,
        };
        assert_eq!(filter.to_string(), "QUAL IN [2, 4) (exact)");
    }
}
