//! Label counting shared by dialogue reads, profiles, trophies and the catalog.

use std::{cmp::Reverse, collections::HashMap};

use crate::dao::models::LabelTally;

/// Count `labels` and order the result by count descending, then label ascending.
pub fn tally_labels<'a, I>(labels: I) -> LabelTally
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for label in labels {
        *counts.entry(label).or_default() += 1;
    }
    let mut entries: Vec<(&str, u64)> = counts.into_iter().collect();
    entries.sort_by(|(a_label, a_count), (b_label, b_count)| {
        b_count.cmp(a_count).then_with(|| a_label.cmp(b_label))
    });
    entries
        .into_iter()
        .map(|(label, count)| (label.to_owned(), count))
        .collect()
}

/// Sum of every count in `tally`.
pub fn total(tally: &LabelTally) -> u64 {
    tally.values().sum()
}

/// First `n` labels of an ordered tally.
pub fn top_labels(tally: &LabelTally, n: usize) -> Vec<String> {
    tally.keys().take(n).cloned().collect()
}

/// Order `(key, total)` pairs by total descending, breaking ties on the key.
pub fn rank_by_total<K: Ord>(entries: &mut [(K, u64)]) {
    entries.sort_by(|(a_key, a_total), (b_key, b_total)| {
        Reverse(a_total)
            .cmp(&Reverse(b_total))
            .then_with(|| a_key.cmp(b_key))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_are_broken_alphabetically() {
        let tally = tally_labels(["🔥", "solid", "🔥", "clear", "solid", "weak"]);
        let ordered: Vec<(&str, u64)> = tally.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(
            ordered,
            vec![("solid", 2), ("🔥", 2), ("clear", 1), ("weak", 1)]
        );
        assert_eq!(total(&tally), 6);
        assert_eq!(top_labels(&tally, 3), vec!["solid", "🔥", "clear"]);
    }

    #[test]
    fn empty_input_gives_empty_tally() {
        let tally = tally_labels(std::iter::empty());
        assert!(tally.is_empty());
        assert_eq!(total(&tally), 0);
        assert!(top_labels(&tally, 3).is_empty());
    }

    #[test]
    fn ranking_prefers_larger_totals_then_keys() {
        let mut entries = vec![("b", 3), ("c", 5), ("a", 3)];
        rank_by_total(&mut entries);
        assert_eq!(entries, vec![("c", 5), ("a", 3), ("b", 3)]);
    }
}
