//! Sector skew (interleave) tables
//!
//! Physical media interleave logical sectors so the controller can keep up
//! with the spinning disk. A skew table maps a logical sector to its
//! physical position on the track.

/// Build a skew table for `sector_count` sectors stepping by `skew`.
///
/// Starting at sector 0, each logical sector takes the slot `skew` beyond the
/// previous one. When that slot is taken the next free slot is used instead,
/// so the result is always a permutation of `0..sector_count`.
pub fn create_skew_table(skew: usize, sector_count: usize) -> Vec<u16> {
    let mut table = Vec::with_capacity(sector_count);
    let mut taken = vec![false; sector_count];
    let mut slot = 0;

    for _ in 0..sector_count {
        while taken[slot] {
            slot = (slot + 1) % sector_count;
        }
        taken[slot] = true;
        table.push(slot as u16);
        slot = (slot + skew) % sector_count;
    }

    table
}

/// Check that a table maps `0..len` onto itself exactly once
pub fn is_permutation(table: &[u16]) -> bool {
    let mut seen = vec![false; table.len()];
    for &sector in table {
        match seen.get_mut(sector as usize) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_osborne_skew() {
        // Osborne 1 interleave, 0-based
        assert_eq!(
            create_skew_table(2, 10),
            vec![0, 2, 4, 6, 8, 1, 3, 5, 7, 9]
        );
    }

    #[test]
    fn test_cpm1_skew() {
        // Standard 8" single density skew of 6 over 26 sectors
        let expected: Vec<u16> = [
            1, 7, 13, 19, 25, 5, 11, 17, 23, 3, 9, 15, 21, 2, 8, 14, 20, 26, 6, 12, 18, 24, 4, 10,
            16, 22,
        ]
        .iter()
        .map(|s| s - 1)
        .collect();
        assert_eq!(create_skew_table(6, 26), expected);
    }

    #[test]
    fn test_degenerate_skews() {
        assert!(create_skew_table(3, 0).is_empty());
        assert_eq!(create_skew_table(0, 4), vec![0, 1, 2, 3]);
        assert_eq!(create_skew_table(1, 4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_is_permutation() {
        assert!(is_permutation(&[2, 0, 1]));
        assert!(!is_permutation(&[0, 0, 1]));
        assert!(!is_permutation(&[0, 3, 1]));
    }

    proptest! {
        #[test]
        fn skew_table_is_permutation(skew in 0usize..64, count in 1usize..64) {
            let table = create_skew_table(skew, count);
            prop_assert_eq!(table.len(), count);
            prop_assert!(is_permutation(&table));
        }
    }
}
