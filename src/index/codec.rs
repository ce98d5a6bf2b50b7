//! Four-bit genotype codes used by the parents stream.
//!
//! The parents byte of a child variant holds the father code in the upper and
//! the mother code in the lower nibble.

use crate::query::genotype::Genotype;

pub const NUM_CODES: usize = 16;

pub const HOM_REF_UNPHASED: u8 = 0;
pub const HET_REF_UNPHASED: u8 = 1;
pub const HOM_ALT_UNPHASED: u8 = 2;
pub const HOM_REF_PHASED: u8 = 3;
pub const HET_REF_01_PHASED: u8 = 4;
pub const HET_REF_10_PHASED: u8 = 5;
pub const HOM_ALT_PHASED: u8 = 6;
pub const HEMI_REF: u8 = 7;
pub const HEMI_ALT: u8 = 8;
pub const MULTI_HOM: u8 = 9;
pub const MULTI_HET: u8 = 10;
pub const MISSING_HOM: u8 = 11;
pub const MISSING_HET: u8 = 12;
/// Parent has different calls in different files, all of them simple.
pub const DISCREPANCY_SIMPLE: u8 = 13;
/// Parent has different calls in different files.
pub const DISCREPANCY_ANY: u8 = 14;
/// Parent call not known, e.g. parent loaded in a separate file.
pub const UNKNOWN: u8 = 15;

/// Codes that stand for more than one genotype.
const AMBIGUOUS: [bool; NUM_CODES] = [
    false, false, false, false, false, false, false, false, false, // 0-8
    true, true, // multi-allelic
    false, true, // missing
    true, true, true, // discrepancies and unknown
];

/// Encode a genotype string.
pub fn encode(gt: &str) -> u8 {
    let gt = match gt.parse::<Genotype>() {
        Ok(gt) => gt,
        Err(_) => return UNKNOWN,
    };
    if gt.alleles.len() == 1 {
        return match gt.alleles[0] {
            Some(0) => HEMI_REF,
            Some(1) => HEMI_ALT,
            Some(_) => MULTI_HOM,
            None => MISSING_HOM,
        };
    }
    if gt.alleles.len() != 2 {
        return UNKNOWN;
    }
    match (gt.alleles[0], gt.alleles[1]) {
        (None, None) => MISSING_HOM,
        (None, _) | (_, None) => MISSING_HET,
        (Some(a), Some(b)) if a > 1 || b > 1 => {
            if a == b {
                MULTI_HOM
            } else {
                MULTI_HET
            }
        }
        (Some(0), Some(0)) if gt.phased => HOM_REF_PHASED,
        (Some(0), Some(0)) => HOM_REF_UNPHASED,
        (Some(1), Some(1)) if gt.phased => HOM_ALT_PHASED,
        (Some(1), Some(1)) => HOM_ALT_UNPHASED,
        (Some(0), Some(1)) if gt.phased => HET_REF_01_PHASED,
        (Some(1), Some(0)) if gt.phased => HET_REF_10_PHASED,
        _ => HET_REF_UNPHASED,
    }
}

pub fn is_ambiguous_code(code: usize) -> bool {
    AMBIGUOUS.get(code).copied().unwrap_or(true)
}

/// Combine father and mother codes into one parents byte.
pub fn join_parents_code(father: u8, mother: u8) -> u8 {
    (father << 4) | (mother & 0x0f)
}

/// Split a parents byte into `(father, mother)` codes.
pub fn split_parents_code(code: u8) -> (u8, u8) {
    (code >> 4, code & 0x0f)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0/0", HOM_REF_UNPHASED)]
    #[case("0|0", HOM_REF_PHASED)]
    #[case("0/1", HET_REF_UNPHASED)]
    #[case("1/0", HET_REF_UNPHASED)]
    #[case("0|1", HET_REF_01_PHASED)]
    #[case("1|0", HET_REF_10_PHASED)]
    #[case("1/1", HOM_ALT_UNPHASED)]
    #[case("1|1", HOM_ALT_PHASED)]
    #[case("0", HEMI_REF)]
    #[case("1", HEMI_ALT)]
    #[case("2/2", MULTI_HOM)]
    #[case("1/2", MULTI_HET)]
    #[case("./.", MISSING_HOM)]
    #[case(".", MISSING_HOM)]
    #[case("./1", MISSING_HET)]
    #[case("0/1/1", UNKNOWN)]
    #[case("NA", UNKNOWN)]
    fn encode_genotypes(#[case] gt: &str, #[case] expected: u8) {
        assert_eq!(encode(gt), expected);
    }

    #[test]
    fn ambiguous_codes() {
        let ambiguous = (0..NUM_CODES)
            .filter(|c| is_ambiguous_code(*c))
            .collect::<Vec<_>>();
        assert_eq!(ambiguous, vec![9, 10, 12, 13, 14, 15]);
    }

    #[test]
    fn parents_code() {
        let code = join_parents_code(HOM_REF_UNPHASED, HET_REF_UNPHASED);
        assert_eq!(code, 0x01);
        assert_eq!(split_parents_code(code), (0, 1));
        assert_eq!(split_parents_code(join_parents_code(UNKNOWN, MISSING_HOM)), (15, 11));
    }
}
