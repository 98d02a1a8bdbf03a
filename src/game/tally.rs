//! Strict-Maximum Tally
//!
//! Shared by meeting votes and contest clicks. A key wins only if its
//! count is strictly greater than every other count; a shared maximum
//! or an empty tally has no winner.

use std::collections::BTreeMap;

/// Count occurrences of each key.
pub fn count<K: Ord + Copy>(items: impl IntoIterator<Item = K>) -> BTreeMap<K, u32> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}

/// Return the key holding the strict maximum count.
pub fn strict_max<K: Copy>(counts: impl IntoIterator<Item = (K, u32)>) -> Option<K> {
    let mut leader: Option<(K, u32)> = None;
    let mut tied = false;

    for (key, n) in counts {
        match leader {
            Some((_, best)) if n < best => {}
            Some((_, best)) if n == best => tied = true,
            _ => {
                leader = Some((key, n));
                tied = false;
            }
        }
    }

    match leader {
        Some((key, _)) if !tied => Some(key),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_count() {
        let counts = count([3u64, 1, 3, 3, 2]);
        assert_eq!(counts.get(&3), Some(&3));
        assert_eq!(counts.get(&1), Some(&1));
        assert_eq!(counts.get(&2), Some(&1));
    }

    #[test]
    fn test_strict_max_winner() {
        assert_eq!(strict_max([(1u64, 2), (2, 5), (3, 1)]), Some(2));
    }

    #[test]
    fn test_tie_for_max_has_no_winner() {
        assert_eq!(strict_max([(1u64, 4), (2, 4), (3, 1)]), None);
    }

    #[test]
    fn test_tie_below_max_still_wins() {
        assert_eq!(strict_max([(1u64, 1), (2, 1), (3, 2)]), Some(3));
    }

    #[test]
    fn test_empty_has_no_winner() {
        assert_eq!(strict_max(Vec::<(u64, u32)>::new()), None);
    }

    proptest! {
        #[test]
        fn prop_winner_strictly_beats_all_others(
            counts in proptest::collection::btree_map(0u64..20, 1u32..10, 0..12)
        ) {
            let max = counts.values().copied().max();
            let leaders: Vec<u64> = counts.iter()
                .filter(|(_, n)| Some(**n) == max)
                .map(|(k, _)| *k)
                .collect();

            let winner = strict_max(counts.iter().map(|(k, n)| (*k, *n)));
            if leaders.len() == 1 {
                prop_assert_eq!(winner, Some(leaders[0]));
            } else {
                prop_assert_eq!(winner, None);
            }
        }
    }
}
