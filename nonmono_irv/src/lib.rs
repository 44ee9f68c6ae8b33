mod config;
use log::{debug, info};
use snafu::prelude::*;

pub use crate::config::*;

pub mod builder;
pub mod manual;
pub mod model;
pub mod search;
pub mod signature;
pub mod solver;
pub mod tasks;

pub use crate::model::{build_distance_model, Transformation};
pub use crate::search::run_search;
pub use crate::solver::{GoodLpSolver, IlpSolver, SolveOutcome};
pub use crate::tasks::{evaluate_order, run_task, OrderEvaluation, TaskReport};

/// Runs the plain IRV count on the election.
///
/// Every round, each ballot counts for its highest ranked continuing
/// candidate and the candidate with the fewest votes is eliminated. Ties for
/// the fewest votes eliminate the candidate listed last in the candidate list.
///
/// Rounds are logged at `info` level when `log_rounds` is set.
pub fn simulate_irv(election: &Election, log_rounds: bool) -> AuditResult<IrvSimulation> {
    let n = election.num_candidates();
    if n == 0 {
        return EmptyElectionSnafu {}.fail();
    }

    let mut eliminated = vec![false; n];
    let mut order: Vec<CandidateId> = Vec::with_capacity(n);
    let mut round_stats: Vec<RoundStats> = Vec::with_capacity(n.saturating_sub(1));
    let mut last_round_margin = election.total_votes();

    while order.len() + 1 < n {
        let round_id = (round_stats.len() + 1) as u32;
        let tally = compute_tally(election, &eliminated);

        // The continuing candidate with the fewest votes. Later candidates
        // win ties so that the last listed one goes.
        let mut loser: Option<(CandidateId, f64)> = None;
        for (cid, votes) in tally.iter() {
            match loser {
                Some((_, min)) if *votes > min => {}
                _ => loser = Some((*cid, *votes)),
            }
        }
        let Some((loser, _)) = loser else {
            break;
        };

        if tally.len() == 2 {
            last_round_margin = (tally[0].1 - tally[1].1).abs();
        }
        if log_rounds {
            let described: Vec<String> = tally
                .iter()
                .map(|(cid, v)| format!("{}: {}", election.name(*cid), v))
                .collect();
            info!(
                "Round {}: {} -> eliminated {}",
                round_id,
                described.join(", "),
                election.name(loser)
            );
        }
        debug!("simulate_irv: round {} tally {:?}", round_id, tally);

        eliminated[loser.index()] = true;
        order.push(loser);
        round_stats.push(RoundStats {
            round: round_id,
            tally,
            eliminated: loser,
        });
    }

    let winner = election
        .candidate_ids()
        .find(|cid| !eliminated[cid.index()])
        .context(EmptyElectionSnafu {})?;
    order.push(winner);
    info!(
        "simulate_irv: winner {} (order {}), last round margin {}",
        election.name(winner),
        election.format_order(&order),
        last_round_margin
    );
    Ok(IrvSimulation {
        winner,
        order,
        round_stats,
        last_round_margin,
    })
}

/// The votes of every continuing candidate, in candidate order.
fn compute_tally(election: &Election, eliminated: &[bool]) -> Vec<(CandidateId, f64)> {
    let mut tally: Vec<f64> = vec![0.0; election.num_candidates()];
    for b in election.ballots().iter() {
        if let Some(top) = b.prefs.top_continuing(eliminated) {
            tally[top.index()] += b.votes;
        }
    }
    election
        .candidate_ids()
        .filter(|cid| !eliminated[cid.index()])
        .map(|cid| (cid, tally[cid.index()]))
        .collect()
}
