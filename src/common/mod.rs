//! Common functionality.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

/// Definition of canonical chromosome names.
pub const CHROMS: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "M",
];

/// Strip the `chr` prefix from a chromosome name and normalize the mitochondrial name.
pub fn canonicalize(chrom: &str) -> &str {
    let chrom = chrom.strip_prefix("chr").unwrap_or(chrom);
    if chrom == "M" {
        "MT"
    } else {
        chrom
    }
}

/// Sort key for chromosome names.
///
/// Canonical chromosomes sort by their position in `CHROMS`, everything else
/// sorts after them by name.
pub fn chrom_sort_key(chrom: &str) -> (usize, &str) {
    let canonical = canonicalize(chrom);
    let rank = match canonical {
        "X" => 22,
        "Y" => 23,
        "MT" => 24,
        _ => match canonical.parse::<usize>() {
            Ok(n) if (1..=22).contains(&n) => n - 1,
            _ => CHROMS.len(),
        },
    };
    if rank < CHROMS.len() {
        (rank, "")
    } else {
        (rank, canonical)
    }
}

/// Compare two chromosome names by genomic order.
pub fn chrom_cmp(lhs: &str, rhs: &str) -> std::cmp::Ordering {
    chrom_sort_key(lhs).cmp(&chrom_sort_key(rhs))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("chr1", "1")]
    #[case("1", "1")]
    #[case("chrM", "MT")]
    #[case("MT", "MT")]
    #[case("chrX", "X")]
    fn canonicalize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(super::canonicalize(input), expected);
    }

    #[rstest]
    #[case("1", "2", std::cmp::Ordering::Less)]
    #[case("chr2", "10", std::cmp::Ordering::Less)]
    #[case("X", "22", std::cmp::Ordering::Greater)]
    #[case("chrM", "MT", std::cmp::Ordering::Equal)]
    #[case("GL000192.1", "Y", std::cmp::Ordering::Greater)]
    #[case("GL000191.1", "GL000192.1", std::cmp::Ordering::Less)]
    fn chrom_cmp(#[case] lhs: &str, #[case] rhs: &str, #[case] expected: std::cmp::Ordering) {
        assert_eq!(super::chrom_cmp(lhs, rhs), expected);
    }
}
