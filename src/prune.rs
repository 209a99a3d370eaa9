//! Duplicate product pruning and resequencing.
//!
//! Level-2 products are just the input exposures, so the same product can
//! come out of several candidates. Only the association of the highest
//! candidate level survives.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::association::Association;
use crate::diff::product_names;
use crate::sequence::SequenceCounter;

/// Order associations by candidate id.
///
/// Candidate ids sort lexicographically by level: `a…` (combined) before
/// `c…` (background) before `o…` (observation). The sort is stable.
pub fn sort_by_candidate(asns: &mut [&Association]) {
    asns.sort_by(|a, b| by_candidate(a, b));
}

fn by_candidate(a: &Association, b: &Association) -> Ordering {
    a.asn_id.cmp(&b.asn_id)
}

/// Remove associations whose product is also produced by a higher candidate.
///
/// Input associations are expected to hold a single product; only the first
/// product is considered. Survivors keep their input order.
#[must_use]
pub fn prune_duplicate_products(asns: Vec<Association>) -> Vec<Association> {
    let (_, dups) = product_names(&asns);
    if dups.is_empty() {
        return asns;
    }
    let dups: HashSet<&str> = dups.iter().map(String::as_str).collect();

    let mut contenders: HashMap<&str, Vec<(usize, &Association)>> = HashMap::new();
    for (idx, asn) in asns.iter().enumerate() {
        if let Some(name) = asn.products.first().map(|p| p.name.as_str()) {
            if dups.contains(name) {
                contenders.entry(name).or_default().push((idx, asn));
            }
        }
    }

    let mut removed = HashSet::new();
    for (name, mut group) in contenders {
        group.sort_by(|(_, a), (_, b)| by_candidate(a, b));
        let kept = group[0].1.asn_id.as_str();
        for (idx, asn) in &group[1..] {
            debug!(product = name, kept, dropped = %asn.asn_id, "pruning duplicate product");
            removed.insert(*idx);
        }
    }

    asns.into_iter()
        .enumerate()
        .filter(|(idx, _)| !removed.contains(idx))
        .map(|(_, asn)| asn)
        .collect()
}

/// Renumber sequences per association type, starting at 1.
pub fn resequence(asns: &mut [Association]) {
    let mut counters: HashMap<String, SequenceCounter> = HashMap::new();
    for asn in asns {
        let counter = counters.entry(asn.asn_type.clone()).or_default();
        asn.sequence = counter.next().unwrap_or(asn.sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{Member, Product};

    fn single(acid: &str, product: &str) -> Association {
        Association::new("image2", acid).with_product(Product {
            name: product.to_string(),
            members: vec![Member::science(format!("{product}_rate.fits"))],
        })
    }

    fn ids(asns: &[Association]) -> Vec<&str> {
        asns.iter().map(|a| a.asn_id.as_str()).collect()
    }

    #[test]
    fn unique_products_pass_through() {
        let asns = vec![single("o001", "a"), single("o002", "b")];
        assert_eq!(prune_duplicate_products(asns.clone()), asns);
    }

    #[test]
    fn background_candidate_beats_observation() {
        let asns = vec![
            single("o001", "p"),
            single("o002", "q"),
            single("c002", "p"),
        ];
        let pruned = prune_duplicate_products(asns);
        assert_eq!(ids(&pruned), ["o002", "c002"]);
    }

    #[test]
    fn combined_beats_background() {
        let asns = vec![single("c1000", "p"), single("a3001", "p"), single("o001", "p")];
        assert_eq!(ids(&prune_duplicate_products(asns)), ["a3001"]);
    }

    #[test]
    fn equal_candidates_keep_first_seen() {
        let mut first = single("o001", "p");
        first.asn_rule = "first".to_string();
        let mut second = single("o001", "p");
        second.asn_rule = "second".to_string();
        let pruned = prune_duplicate_products(vec![first, second]);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].asn_rule, "first");
    }

    #[test]
    fn prune_is_idempotent() {
        let asns = vec![
            single("o001", "p"),
            single("c002", "p"),
            single("o003", "r"),
            single("o004", "r"),
        ];
        let once = prune_duplicate_products(asns);
        assert_eq!(prune_duplicate_products(once.clone()), once);
        assert_eq!(ids(&once), ["c002", "o003"]);
    }

    #[test]
    fn associations_without_products_are_kept() {
        let asns = vec![
            Association::new("image2", "o001"),
            single("o001", "p"),
            single("o002", "p"),
        ];
        assert_eq!(prune_duplicate_products(asns).len(), 2);
    }

    #[test]
    fn sort_by_candidate_orders_levels() {
        let (o, c, a) = (single("o001", "x"), single("c1000", "x"), single("a3001", "x"));
        let mut refs = vec![&o, &c, &a];
        sort_by_candidate(&mut refs);
        let order: Vec<&str> = refs.iter().map(|a| a.asn_id.as_str()).collect();
        assert_eq!(order, ["a3001", "c1000", "o001"]);
    }

    #[test]
    fn resequence_counts_per_type() {
        let mut asns = vec![
            single("o001", "a"),
            Association::new("spec2", "o001"),
            single("o002", "b"),
            Association::new("spec2", "o002"),
            single("o003", "c"),
        ];
        for asn in &mut asns {
            asn.sequence = 42;
        }
        resequence(&mut asns);
        let seqs: Vec<u32> = asns.iter().map(|a| a.sequence).collect();
        assert_eq!(seqs, [1, 1, 2, 2, 3]);
    }
}
