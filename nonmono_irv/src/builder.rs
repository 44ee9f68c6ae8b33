pub use crate::config::*;

use std::collections::HashMap;

use log::debug;
use snafu::prelude::*;

use crate::signature::Signature;

/// A builder for loading an election.
///
/// Ballots with identical rankings are merged into one signature as they are
/// added.
///
/// ```
/// use nonmono_irv::builder::Builder;
/// # use nonmono_irv::AuditError;
///
/// let mut builder = Builder::new()
///     .candidates(&["Anna".to_string(), "Bob".to_string()])?;
///
/// builder.add_ballot(&["Anna".to_string(), "Bob".to_string()], 3.0)?;
/// builder.add_ballot(&["Anna".to_string(), "Bob".to_string()], 2.0)?;
/// let election = builder.build()?;
/// assert_eq!(election.ballots().len(), 1);
/// assert_eq!(election.total_votes(), 5.0);
///
/// # Ok::<(), AuditError>(())
/// ```
#[derive(Default)]
pub struct Builder {
    pub(crate) _candidates: Vec<Candidate>,
    pub(crate) _names: HashMap<String, CandidateId>,
    pub(crate) _ballots: Vec<Ballot>,
    pub(crate) _ballot_ids: HashMap<Signature, usize>,
    pub(crate) _total_votes: f64,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Sets the candidates, in index order. Resets any ballot already added.
    pub fn candidates(self, names: &[String]) -> AuditResult<Builder> {
        let mut candidates: Vec<Candidate> = Vec::with_capacity(names.len());
        let mut by_name: HashMap<String, CandidateId> = HashMap::new();
        for (idx, name) in names.iter().enumerate() {
            let cid = CandidateId(idx);
            ensure!(
                by_name.insert(name.clone(), cid).is_none(),
                DuplicateCandidateSnafu { name: name.clone() }
            );
            candidates.push(Candidate {
                id: cid,
                name: name.clone(),
                party: String::new(),
                ballots: Vec::new(),
                first_preferences: 0.0,
            });
        }
        Ok(Builder {
            _candidates: candidates,
            _names: by_name,
            ..Builder::default()
        })
    }

    /// Sets the party affiliations, one per candidate and in the same order.
    pub fn parties(mut self, parties: &[String]) -> AuditResult<Builder> {
        ensure!(
            parties.len() == self._candidates.len(),
            PartyMismatchSnafu {
                parties: parties.len(),
                candidates: self._candidates.len(),
            }
        );
        for (cand, party) in self._candidates.iter_mut().zip(parties.iter()) {
            cand.party = party.clone();
        }
        Ok(self)
    }

    /// Adds a ballot with a weight of one.
    pub fn add_ballot_simple(&mut self, names: &[String]) -> AuditResult<()> {
        self.add_ballot(names, 1.0)
    }

    /// Adds a ballot given by candidate names, most preferred first.
    ///
    /// Repeated names are ignored after their first occurrence. A ballot
    /// without any name is dropped.
    pub fn add_ballot(&mut self, names: &[String], votes: f64) -> AuditResult<()> {
        let mut choices: Vec<CandidateId> = Vec::with_capacity(names.len());
        for name in names.iter() {
            let cid = self
                ._names
                .get(name)
                .copied()
                .context(UnknownCandidateSnafu { name: name.clone() })?;
            choices.push(cid);
        }
        self.add_signature(Signature::from_choices(choices), votes)
    }

    /// Adds `votes` ballots with the given ranking.
    pub fn add_signature(&mut self, prefs: Signature, votes: f64) -> AuditResult<()> {
        ensure!(
            votes.is_finite() && votes >= 0.0,
            InvalidVoteCountSnafu { votes }
        );
        let Some(first) = prefs.first() else {
            debug!("add_signature: dropping empty ballot");
            return Ok(());
        };
        ensure!(
            first.index() < self._candidates.len(),
            CandidateOutOfRangeSnafu {
                index: first.index(),
                count: self._candidates.len(),
            }
        );
        if let Some(bad) = prefs
            .ranks()
            .iter()
            .find(|cid| cid.index() >= self._candidates.len())
        {
            return CandidateOutOfRangeSnafu {
                index: bad.index(),
                count: self._candidates.len(),
            }
            .fail();
        }

        self._total_votes += votes;
        let cand = &mut self._candidates[first.index()];
        cand.first_preferences += votes;
        if let Some(&bid) = self._ballot_ids.get(&prefs) {
            self._ballots[bid].votes += votes;
            return Ok(());
        }
        let bid = self._ballots.len();
        cand.ballots.push(bid);
        self._ballot_ids.insert(prefs.clone(), bid);
        self._ballots.push(Ballot {
            id: bid,
            prefs,
            votes,
        });
        Ok(())
    }

    pub fn build(self) -> AuditResult<Election> {
        ensure!(!self._candidates.is_empty(), EmptyElectionSnafu {});
        debug!(
            "build: {} candidates, {} signatures, {} votes",
            self._candidates.len(),
            self._ballots.len(),
            self._total_votes
        );
        Ok(Election {
            candidates: self._candidates,
            ballots: self._ballots,
            total_votes: self._total_votes,
            name_to_id: self._names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn abc() -> Builder {
        Builder::new()
            .candidates(&names(&["A", "B", "C"]))
            .expect("three distinct candidates")
    }

    #[test]
    fn simple_ballots_count_once() {
        let mut b = abc();
        b.add_ballot_simple(&names(&["B", "A"])).unwrap();
        b.add_ballot_simple(&names(&["B", "A"])).unwrap();
        let e = b.build().unwrap();
        assert_eq!(e.ballots().len(), 1);
        assert_eq!(e.ballots()[0].votes, 2.0);
        assert_eq!(e.candidates()[1].first_preferences, 2.0);
    }

    #[test]
    fn identical_rankings_are_merged() {
        let mut b = abc();
        b.add_ballot(&names(&["A", "B"]), 4.0).unwrap();
        b.add_ballot(&names(&["B", "A"]), 1.0).unwrap();
        b.add_ballot(&names(&["A", "B"]), 6.0).unwrap();
        let e = b.build().unwrap();
        assert_eq!(e.ballots().len(), 2);
        assert_eq!(e.ballots()[0].votes, 10.0);
        assert_eq!(e.total_votes(), 11.0);
        assert_eq!(e.candidates()[0].first_preferences, 10.0);
        assert_eq!(e.candidates()[0].ballots, vec![0]);
        assert_eq!(e.candidates()[1].ballots, vec![1]);
    }

    #[test]
    fn repeated_names_on_one_ballot_are_ignored() {
        let mut b = abc();
        b.add_ballot(&names(&["C", "A", "C", "B", "A"]), 1.0).unwrap();
        let e = b.build().unwrap();
        let ranks: Vec<usize> = e.ballots()[0].prefs.ranks().iter().map(|c| c.index()).collect();
        assert_eq!(ranks, vec![2, 0, 1]);
    }

    #[test]
    fn empty_ballots_are_dropped() {
        let mut b = abc();
        b.add_ballot(&[], 5.0).unwrap();
        let e = b.build().unwrap();
        assert!(e.ballots().is_empty());
        assert_eq!(e.total_votes(), 0.0);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut b = abc();
        let err = b.add_ballot(&names(&["A", "Zed"]), 1.0).unwrap_err();
        assert!(matches!(err, AuditError::UnknownCandidate { name } if name == "Zed"));
    }

    #[test]
    fn party_count_must_match() {
        let err = abc().parties(&names(&["X", "Y"])).err().unwrap();
        assert!(matches!(
            err,
            AuditError::PartyMismatch {
                parties: 2,
                candidates: 3
            }
        ));
        let e = abc().parties(&names(&["X", "Y", "Z"])).unwrap().build().unwrap();
        assert_eq!(e.candidates()[2].party, "Z");
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut b = abc();
        assert!(b.add_ballot(&names(&["A"]), -1.0).is_err());
    }

    #[test]
    fn no_candidates_is_an_error() {
        assert!(matches!(
            Builder::new().build(),
            Err(AuditError::EmptyElection {})
        ));
    }

    proptest! {
        // Two lines with the same ranking are the same as one line with the
        // summed count.
        #[test]
        fn merging_matches_summed_counts(
            ranking in proptest::sample::subsequence(vec![0usize, 1, 2, 3], 1..=4).prop_shuffle(),
            first in 0u32..1000,
            second in 0u32..1000,
        ) {
            let cands = names(&["A", "B", "C", "D"]);
            let ranking: Vec<String> = ranking.iter().map(|i| cands[*i].clone()).collect();

            let mut split = Builder::new().candidates(&cands).unwrap();
            split.add_ballot(&ranking, first as f64).unwrap();
            split.add_ballot(&ranking, second as f64).unwrap();
            let split = split.build().unwrap();

            let mut merged = Builder::new().candidates(&cands).unwrap();
            merged.add_ballot(&ranking, (first + second) as f64).unwrap();
            let merged = merged.build().unwrap();

            prop_assert_eq!(split.ballots(), merged.ballots());
            prop_assert_eq!(split.total_votes(), merged.total_votes());
        }
    }
}
