// ********* Input data structures ***********

use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;

use snafu::Snafu;

use crate::signature::Signature;

/// The position of a candidate in the candidate list of the ballot file.
///
/// Indices are dense (`0..n`) and never change once an election is loaded.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct CandidateId(pub usize);

impl CandidateId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub party: String,
    /// The ballots (by id) that rank this candidate first.
    pub ballots: Vec<usize>,
    /// Total of first preferences.
    pub first_preferences: f64,
}

/// One distinct ranking with its aggregated number of votes.
#[derive(PartialEq, Debug, Clone)]
pub struct Ballot {
    pub id: usize,
    pub prefs: Signature,
    pub votes: f64,
}

/// A loaded election: the candidates and the aggregated ballot profile.
///
/// Built with [`crate::builder::Builder`]. Immutable afterwards.
#[derive(PartialEq, Debug, Clone)]
pub struct Election {
    pub(crate) candidates: Vec<Candidate>,
    pub(crate) ballots: Vec<Ballot>,
    pub(crate) total_votes: f64,
    pub(crate) name_to_id: HashMap<String, CandidateId>,
}

impl Election {
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    pub fn num_candidates(&self) -> usize {
        self.candidates.len()
    }

    pub fn total_votes(&self) -> f64 {
        self.total_votes
    }

    pub fn candidate_ids(&self) -> impl Iterator<Item = CandidateId> + '_ {
        self.candidates.iter().map(|c| c.id)
    }

    pub fn candidate_by_name(&self, name: &str) -> Option<CandidateId> {
        self.name_to_id.get(name).copied()
    }

    pub fn name(&self, cid: CandidateId) -> &str {
        self.candidates
            .get(cid.index())
            .map(|c| c.name.as_str())
            .unwrap_or("?")
    }

    /// True when every vote count is a whole number.
    pub fn is_integral(&self) -> bool {
        self.ballots.iter().all(|b| b.votes.fract() == 0.0)
    }

    /// Renders an elimination order with candidate names: `C -> B -> A`.
    pub fn format_order(&self, order: &[CandidateId]) -> String {
        order
            .iter()
            .map(|cid| self.name(*cid))
            .collect::<Vec<&str>>()
            .join(" -> ")
    }

    pub fn format_signature(&self, sig: &Signature) -> String {
        let names: Vec<&str> = sig.ranks().iter().map(|cid| self.name(*cid)).collect();
        format!("({})", names.join(","))
    }

    pub(crate) fn check_candidate(&self, cid: CandidateId) -> AuditResult<()> {
        if cid.index() < self.candidates.len() {
            Ok(())
        } else {
            CandidateOutOfRangeSnafu {
                index: cid.index(),
                count: self.candidates.len(),
            }
            .fail()
        }
    }
}

// ********* Configuration **********

/// Run-wide switches. Passed by reference into every part of the search.
#[derive(PartialEq, Debug, Clone)]
pub struct AuditRules {
    /// Accept ties between the eliminated candidate and a continuing one.
    pub allow_ties: bool,
    /// For the per-loser tasks, keep going after the first anomaly is found.
    pub test_all_losers: bool,
    /// Wall-clock budget of one branch-and-bound run.
    pub time_limit: Option<Duration>,
    /// Dumps the models and the fringe at trace level.
    pub debug: bool,
    /// Logs the solver statistics and the non-zero decision variables.
    pub optimizer_log: bool,
}

impl AuditRules {
    pub const DEFAULT_RULES: AuditRules = AuditRules {
        allow_ties: false,
        test_all_losers: false,
        time_limit: None,
        debug: false,
        optimizer_log: false,
    };
}

impl Default for AuditRules {
    fn default() -> Self {
        AuditRules::DEFAULT_RULES
    }
}

/// The anomaly being looked for.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Task {
    /// Ranking the winner higher on some ballots makes them lose.
    Promotion,
    /// Ranking a loser lower on some ballots makes them win.
    Demotion,
    /// Adding ballots that rank a loser last makes them win.
    AddLoserBottom,
    /// Removing ballots that rank the winner last makes them lose.
    RemoveWinnerBottom,
}

impl Task {
    pub fn label(&self) -> &'static str {
        match self {
            Task::Promotion => "promotion",
            Task::Demotion => "demotion",
            Task::AddLoserBottom => "participation (add loser at bottom)",
            Task::RemoveWinnerBottom => "participation (remove winner at bottom)",
        }
    }
}

impl TryFrom<u8> for Task {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Task::Promotion),
            1 => Ok(Task::Demotion),
            2 => Ok(Task::AddLoserBottom),
            3 => Ok(Task::RemoveWinnerBottom),
            x => Err(x),
        }
    }
}

// ******** Output data structures *********

/// Statistics for one round of the plain IRV count.
#[derive(PartialEq, Debug, Clone)]
pub struct RoundStats {
    pub round: u32,
    /// Continuing candidates with their votes, in candidate order.
    pub tally: Vec<(CandidateId, f64)>,
    pub eliminated: CandidateId,
}

/// The result of the plain IRV count.
#[derive(PartialEq, Debug, Clone)]
pub struct IrvSimulation {
    pub winner: CandidateId,
    /// Every candidate, earliest eliminated first. The winner comes last.
    pub order: Vec<CandidateId>,
    pub round_stats: Vec<RoundStats>,
    /// Votes between the two candidates of the final round.
    pub last_round_margin: f64,
}

impl IrvSimulation {
    /// Number of ballots to change in the final round to flip the result.
    pub fn lrm(&self) -> f64 {
        (self.last_round_margin / 2.0).ceil()
    }
}

/// How a single branch-and-bound run ended.
#[derive(PartialEq, Debug, Clone)]
pub enum SearchOutcome {
    /// Only one candidate: nothing to search.
    Trivial,
    /// The search was exhausted and found a manipulation of this cost.
    Exact {
        distance: f64,
        order: Vec<CandidateId>,
    },
    /// The search was exhausted without finding any manipulation.
    NoManipulation,
    /// The time budget ran out. The true margin lies in `[lower, upper]`.
    TimedOut {
        lower: f64,
        upper: f64,
        order: Option<Vec<CandidateId>>,
    },
    /// The solver could not be used at all.
    NotApplicable { reason: String },
}

impl SearchOutcome {
    /// The exact margin, when one is known.
    pub fn margin(&self) -> Option<f64> {
        match self {
            SearchOutcome::Trivial => Some(0.0),
            SearchOutcome::Exact { distance, .. } => Some(*distance),
            _ => None,
        }
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            SearchOutcome::Trivial | SearchOutcome::NoManipulation => Verdict::Pass,
            SearchOutcome::Exact { .. } => Verdict::Fail,
            SearchOutcome::TimedOut { order: Some(_), .. } => Verdict::Fail,
            SearchOutcome::TimedOut { order: None, .. } => Verdict::Inconclusive,
            SearchOutcome::NotApplicable { .. } => Verdict::NotApplicable,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Verdict {
    Pass,
    Fail,
    NotApplicable,
    Inconclusive,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::NotApplicable => "NOT-APPLICABLE",
            Verdict::Inconclusive => "INCONCLUSIVE",
        };
        write!(f, "{}", s)
    }
}

/// Statistics for one branch-and-bound run
#[derive(PartialEq, Debug, Clone)]
pub struct SearchReport {
    pub target: CandidateId,
    pub outcome: SearchOutcome,
    pub ips_solved: u64,
    pub elapsed: Duration,
}

/// Errors that prevent an audit from completing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuditError {
    #[snafu(display("The election has no candidates"))]
    EmptyElection {},
    #[snafu(display("Unknown candidate name {name:?}"))]
    UnknownCandidate { name: String },
    #[snafu(display("Duplicate candidate name {name:?}"))]
    DuplicateCandidate { name: String },
    #[snafu(display("Candidate index {index} is out of range ({count} candidates)"))]
    CandidateOutOfRange { index: usize, count: usize },
    #[snafu(display("Found {parties} party affiliations for {candidates} candidates"))]
    PartyMismatch { parties: usize, candidates: usize },
    #[snafu(display("Invalid vote count {votes} (must be a finite non-negative number)"))]
    InvalidVoteCount { votes: f64 },
    #[snafu(display("Invalid elimination order: {reason}"))]
    InvalidOrder { reason: String },
    #[snafu(display("Malformed distance model: {message}"))]
    MalformedModel { message: String },
    #[snafu(display("Solver error in distance calculation: {message}"))]
    Solver { message: String },
}

pub type AuditResult<T> = Result<T, AuditError>;
