//! Ballot signatures and the transformations that move ballots between them.
//!
//! A signature is the exact ranking written on a ballot. All reasoning in the
//! distance models happens at the signature level: counts are aggregated per
//! signature, and the decision variables move ballots from one signature to
//! another.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::config::{Ballot, CandidateId};

/// A ranking of distinct candidates, most preferred first.
///
/// Invariant: no candidate appears twice.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct Signature(Vec<CandidateId>);

impl Signature {
    /// Builds a signature from a list of choices, keeping only the first
    /// occurrence of every candidate.
    pub fn from_choices(choices: impl IntoIterator<Item = CandidateId>) -> Signature {
        let mut ranks: Vec<CandidateId> = Vec::new();
        for cid in choices {
            if !ranks.contains(&cid) {
                ranks.push(cid);
            }
        }
        Signature(ranks)
    }

    pub fn ranks(&self) -> &[CandidateId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<CandidateId> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<CandidateId> {
        self.0.last().copied()
    }

    pub fn position(&self, cid: CandidateId) -> Option<usize> {
        self.0.iter().position(|c| *c == cid)
    }

    /// The highest ranked candidate that is not eliminated yet.
    /// `eliminated` is indexed by candidate index.
    pub fn top_continuing(&self, eliminated: &[bool]) -> Option<CandidateId> {
        self.0
            .iter()
            .copied()
            .find(|cid| !eliminated.get(cid.index()).copied().unwrap_or(false))
    }

    /// The same ranking without `cid`.
    fn without(&self, cid: CandidateId) -> Vec<CandidateId> {
        self.0.iter().copied().filter(|c| *c != cid).collect()
    }

    /// Compact rendering used in solver variable names: `0-2-1`.
    pub fn compact(&self) -> String {
        self.0
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<String>>()
            .join("-")
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (idx, cid) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", cid)?;
        }
        write!(f, ")")
    }
}

/// Number of votes per signature.
pub type SignatureCounts = BTreeMap<Signature, f64>;

/// For each existing signature, the signatures it may be turned into.
pub type Transitions = BTreeMap<Signature, BTreeSet<Signature>>;

/// Aggregates the ballots by signature. Identical rankings are merged.
pub fn signature_counts(ballots: &[Ballot]) -> SignatureCounts {
    let mut counts = SignatureCounts::new();
    for b in ballots.iter() {
        *counts.entry(b.prefs.clone()).or_insert(0.0) += b.votes;
    }
    counts
}

fn insert_at(base: &[CandidateId], pos: usize, cid: CandidateId) -> Signature {
    let mut ranks = base.to_vec();
    ranks.insert(pos, cid);
    Signature(ranks)
}

/// All the signatures obtained by moving `target` up by one or more positions.
///
/// A signature that does not rank the target gets it inserted anywhere but
/// after its last candidate. Signatures with the target already on top have
/// no promotion and are left out.
pub fn promotion_set(target: CandidateId, counts: &SignatureCounts) -> Transitions {
    let mut res = Transitions::new();
    for sig in counts.keys() {
        let target_pos = sig.position(target).unwrap_or(sig.len());
        let shortened = sig.without(target);
        let promoted: BTreeSet<Signature> = (0..target_pos)
            .rev()
            .map(|pos| insert_at(&shortened, pos, target))
            .collect();
        if !promoted.is_empty() {
            res.insert(sig.clone(), promoted);
        }
    }
    res
}

/// All the signatures obtained by moving `target` down by one or more
/// positions, or by removing it from the ranking.
///
/// The removal is only offered when the ranking has at least two entries, so
/// that no ballot becomes empty.
pub fn demotion_set(target: CandidateId, counts: &SignatureCounts) -> Transitions {
    let mut res = Transitions::new();
    for sig in counts.keys() {
        let Some(target_pos) = sig.position(target) else {
            continue;
        };
        let shortened = sig.without(target);
        let mut demoted: BTreeSet<Signature> = (target_pos + 1..sig.len())
            .map(|pos| insert_at(&shortened, pos, target))
            .collect();
        if sig.len() >= 2 {
            demoted.insert(Signature(shortened));
        }
        if !demoted.is_empty() {
            res.insert(sig.clone(), demoted);
        }
    }
    res
}

/// Every full ranking that puts `target` last: all the permutations of the
/// other candidates, followed by the target.
pub fn bottom_patterns(target: CandidateId, num_candidates: usize) -> Vec<Signature> {
    let others: Vec<CandidateId> = (0..num_candidates)
        .map(CandidateId)
        .filter(|c| *c != target)
        .collect();
    let mut res: Vec<Signature> = Vec::new();
    let mut current: Vec<CandidateId> = Vec::with_capacity(num_candidates);
    let mut used = vec![false; others.len()];
    permute(&others, &mut used, &mut current, &mut |prefix: &[CandidateId]| {
        let mut ranks = prefix.to_vec();
        ranks.push(target);
        res.push(Signature(ranks));
    });
    res
}

fn permute(
    items: &[CandidateId],
    used: &mut [bool],
    current: &mut Vec<CandidateId>,
    emit: &mut impl FnMut(&[CandidateId]),
) {
    if current.len() == items.len() {
        emit(current);
        return;
    }
    for idx in 0..items.len() {
        if used[idx] {
            continue;
        }
        used[idx] = true;
        current.push(items[idx]);
        permute(items, used, current, emit);
        current.pop();
        used[idx] = false;
    }
}

/// Existing signatures (with at least two entries and some votes) that rank
/// `target` last.
pub fn bottom_ranked(target: CandidateId, counts: &SignatureCounts) -> Vec<Signature> {
    counts
        .iter()
        .filter(|(sig, votes)| **votes > 0.0 && sig.len() >= 2 && sig.last() == Some(target))
        .map(|(sig, _)| sig.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: CandidateId = CandidateId(0);
    const B: CandidateId = CandidateId(1);
    const C: CandidateId = CandidateId(2);
    const D: CandidateId = CandidateId(3);

    fn sig(ranks: &[CandidateId]) -> Signature {
        Signature::from_choices(ranks.iter().copied())
    }

    fn counts(entries: &[(&[CandidateId], f64)]) -> SignatureCounts {
        entries.iter().map(|(r, n)| (sig(r), *n)).collect()
    }

    #[test]
    fn from_choices_drops_later_duplicates() {
        let s = Signature::from_choices(vec![B, A, B, C, A]);
        assert_eq!(s.ranks(), &[B, A, C]);
    }

    #[test]
    fn top_continuing_skips_eliminated() {
        let s = sig(&[C, B, A]);
        assert_eq!(s.top_continuing(&[false, false, false]), Some(C));
        assert_eq!(s.top_continuing(&[false, false, true]), Some(B));
        assert_eq!(s.top_continuing(&[true, true, true]), None);
    }

    #[test]
    fn promotion_moves_target_up() {
        let c = counts(&[(&[A, B, C], 40.0), (&[B, A, C], 35.0), (&[C, B, A], 25.0)]);
        let t = promotion_set(B, &c);
        assert_eq!(t.len(), 2);
        let from_abc: Vec<&Signature> = t[&sig(&[A, B, C])].iter().collect();
        assert_eq!(from_abc, vec![&sig(&[B, A, C])]);
        let from_cba: Vec<&Signature> = t[&sig(&[C, B, A])].iter().collect();
        assert_eq!(from_cba, vec![&sig(&[B, C, A])]);
        assert!(!t.contains_key(&sig(&[B, A, C])));
    }

    #[test]
    fn promotion_of_third_place_reaches_every_higher_position() {
        let c = counts(&[(&[B, C, A], 10.0)]);
        let t = promotion_set(A, &c);
        let targets: BTreeSet<Signature> = t[&sig(&[B, C, A])].clone();
        let expected: BTreeSet<Signature> = [sig(&[B, A, C]), sig(&[A, B, C])].into_iter().collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn promotion_of_absent_target_never_appends_at_the_end() {
        let c = counts(&[(&[B, C], 3.0)]);
        let t = promotion_set(A, &c);
        let targets: BTreeSet<Signature> = t[&sig(&[B, C])].clone();
        let expected: BTreeSet<Signature> = [sig(&[A, B, C]), sig(&[B, A, C])].into_iter().collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn demotion_moves_target_down_and_removes_it() {
        let c = counts(&[(&[A, B, C], 49.0)]);
        let t = demotion_set(A, &c);
        let expected: BTreeSet<Signature> = [sig(&[B, A, C]), sig(&[B, C, A]), sig(&[B, C])]
            .into_iter()
            .collect();
        assert_eq!(t[&sig(&[A, B, C])], expected);
    }

    #[test]
    fn demotion_of_last_ranked_target_only_removes_it() {
        let c = counts(&[(&[B, C, A], 25.0)]);
        let t = demotion_set(A, &c);
        let expected: BTreeSet<Signature> = [sig(&[B, C])].into_iter().collect();
        assert_eq!(t[&sig(&[B, C, A])], expected);
    }

    // The removal rule never empties a ballot: a signature made of the target
    // alone has no demotion at all. This mirrors the behaviour of the
    // reference tool, which is itself flagged as a questionable choice.
    #[test]
    fn demotion_never_empties_a_single_entry_ballot() {
        let c = counts(&[(&[A], 7.0), (&[B, C], 2.0)]);
        let t = demotion_set(A, &c);
        assert!(t.is_empty());
    }

    #[test]
    fn bottom_patterns_enumerate_all_permutations_of_the_others() {
        let patterns = bottom_patterns(B, 4);
        assert_eq!(patterns.len(), 6);
        assert!(patterns.iter().all(|p| p.last() == Some(B) && p.len() == 4));
        let distinct: BTreeSet<&Signature> = patterns.iter().collect();
        assert_eq!(distinct.len(), 6);
        assert!(patterns.contains(&sig(&[D, C, A, B])));
    }

    #[test]
    fn bottom_ranked_requires_two_entries() {
        let c = counts(&[(&[B, C, A], 25.0), (&[A], 4.0), (&[C, A], 0.0), (&[A, B], 3.0)]);
        assert_eq!(bottom_ranked(A, &c), vec![sig(&[B, C, A])]);
    }
}
