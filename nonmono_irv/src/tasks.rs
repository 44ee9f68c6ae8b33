//! Drivers for the four checks: one search, or one search per loser.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use snafu::prelude::*;

use crate::config::*;
use crate::model::*;
use crate::search::*;
use crate::solver::*;
use crate::simulate_irv;

/// The result of a check on an election.
#[derive(PartialEq, Debug, Clone)]
pub struct TaskReport {
    pub task: Task,
    pub simulation: IrvSimulation,
    pub outcome: SearchOutcome,
    /// The candidate of the run behind `outcome`, if any.
    pub target: Option<CandidateId>,
    /// One entry per branch-and-bound run, in the order they ran.
    pub runs: Vec<SearchReport>,
    pub ips_solved: u64,
    pub elapsed: Duration,
}

impl TaskReport {
    pub fn verdict(&self) -> Verdict {
        self.outcome.verdict()
    }
}

/// The distance of a single, fixed elimination order.
#[derive(PartialEq, Debug, Clone)]
pub struct OrderEvaluation {
    pub transformation: Transformation,
    pub order: Vec<CandidateId>,
    pub outcome: SolveOutcome,
    pub ips_solved: u64,
}

impl OrderEvaluation {
    /// The number of ballots to change, when the order can be reached.
    ///
    /// After a timeout this is the best value found, which may be above the
    /// true distance.
    pub fn distance(&self) -> Option<f64> {
        match self.outcome {
            SolveOutcome::Optimal { objective }
            | SolveOutcome::TimedOut {
                objective: Some(objective),
            } => Some(ceil_distance(objective)),
            _ => None,
        }
    }
}

fn transformation(task: Task, target: CandidateId) -> Transformation {
    match task {
        Task::Promotion => Transformation::Promote(target),
        Task::Demotion => Transformation::Demote(target),
        Task::AddLoserBottom => Transformation::AddBottom(target),
        Task::RemoveWinnerBottom => Transformation::RemoveBottom(target),
    }
}

/// Runs one check on the election.
///
/// The promotion and remove-winner checks run one search against the IRV
/// winner. The demotion and add-loser checks run one search per loser, in
/// candidate order, and stop at the first loser that can be made to win
/// unless `test_all_losers` is set. Each search gets the full time budget.
pub fn run_task(
    election: &Election,
    rules: &AuditRules,
    solver: &mut dyn IlpSolver,
    task: Task,
) -> AuditResult<TaskReport> {
    let start = Instant::now();
    let simulation = simulate_irv(election, false)?;
    let winner = simulation.winner;
    info!(
        "run_task: {} check, IRV winner {}",
        task.label(),
        election.name(winner)
    );

    if election.num_candidates() == 1 {
        return Ok(TaskReport {
            task,
            simulation,
            outcome: SearchOutcome::Trivial,
            target: Some(winner),
            runs: Vec::new(),
            ips_solved: 0,
            elapsed: start.elapsed(),
        });
    }

    let runs: Vec<SearchReport> = match task {
        Task::Promotion | Task::RemoveWinnerBottom => {
            vec![run_search(
                election,
                rules,
                solver,
                transformation(task, winner),
            )?]
        }
        Task::Demotion | Task::AddLoserBottom => {
            let mut runs: Vec<SearchReport> = Vec::new();
            for loser in election.candidate_ids().filter(|c| *c != winner) {
                debug!("run_task: checking loser {}", election.name(loser));
                let run = run_search(election, rules, solver, transformation(task, loser))?;
                let stop = match &run.outcome {
                    SearchOutcome::NotApplicable { .. } => true,
                    SearchOutcome::Exact { distance, .. } => {
                        info!(
                            "run_task: {} can be made to win with {} changes",
                            election.name(loser),
                            distance
                        );
                        !rules.test_all_losers
                    }
                    SearchOutcome::TimedOut {
                        upper,
                        order: Some(_),
                        ..
                    } => {
                        info!(
                            "run_task: {} can be made to win with at most {} changes",
                            election.name(loser),
                            upper
                        );
                        !rules.test_all_losers
                    }
                    _ => false,
                };
                runs.push(run);
                if stop {
                    break;
                }
            }
            runs
        }
    };

    let (outcome, target) = aggregate(&runs);
    if let SearchOutcome::TimedOut { lower, upper, .. } = &outcome {
        warn!(
            "run_task: time limit reached, margin in [{}, {}]",
            lower, upper
        );
    }
    let ips_solved = runs.iter().map(|r| r.ips_solved).sum();
    Ok(TaskReport {
        task,
        simulation,
        outcome,
        target,
        runs,
        ips_solved,
        elapsed: start.elapsed(),
    })
}

/// Combines the runs of a check into one outcome.
///
/// An unusable solver decides everything. Otherwise the smallest exact
/// distance wins, unless a run timed out: the margin is then only known to
/// lie between the smallest lower bound and the smallest upper bound.
fn aggregate(runs: &[SearchReport]) -> (SearchOutcome, Option<CandidateId>) {
    if let Some(r) = runs
        .iter()
        .find(|r| matches!(r.outcome, SearchOutcome::NotApplicable { .. }))
    {
        return (r.outcome.clone(), Some(r.target));
    }

    // (lower, upper, order, target) of the runs that can still succeed.
    let mut candidates: Vec<(f64, f64, Option<&Vec<CandidateId>>, CandidateId)> = Vec::new();
    let mut timed_out = false;
    for r in runs.iter() {
        match &r.outcome {
            SearchOutcome::Trivial => return (SearchOutcome::Trivial, Some(r.target)),
            SearchOutcome::Exact { distance, order } => {
                candidates.push((*distance, *distance, Some(order), r.target))
            }
            SearchOutcome::TimedOut {
                lower,
                upper,
                order,
            } => {
                timed_out = true;
                candidates.push((*lower, *upper, order.as_ref(), r.target));
            }
            SearchOutcome::NoManipulation | SearchOutcome::NotApplicable { .. } => {}
        }
    }

    let best = candidates
        .iter()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .copied();
    let Some((_, upper, order, target)) = best else {
        return (SearchOutcome::NoManipulation, None);
    };
    if timed_out {
        let lower = candidates
            .iter()
            .map(|c| c.0)
            .fold(upper, f64::min);
        return (
            SearchOutcome::TimedOut {
                lower,
                upper,
                order: order.cloned(),
            },
            Some(target),
        );
    }
    match order {
        Some(order) => (
            SearchOutcome::Exact {
                distance: upper,
                order: order.clone(),
            },
            Some(target),
        ),
        None => (SearchOutcome::NoManipulation, None),
    }
}

/// Evaluates the distance of one fixed elimination order, without searching.
///
/// For the demotion and add-loser checks the candidate to make win is the
/// last one of `order`, which must then be complete.
pub fn evaluate_order(
    election: &Election,
    rules: &AuditRules,
    solver: &mut dyn IlpSolver,
    task: Task,
    order: &[CandidateId],
) -> AuditResult<OrderEvaluation> {
    let target = match task {
        Task::Promotion | Task::RemoveWinnerBottom => simulate_irv(election, false)?.winner,
        Task::Demotion | Task::AddLoserBottom => {
            ensure!(
                order.len() == election.num_candidates(),
                InvalidOrderSnafu {
                    reason: format!(
                        "the {} check needs a complete order to pick the winner",
                        task.label()
                    )
                }
            );
            *order.last().context(InvalidOrderSnafu {
                reason: "empty order".to_string(),
            })?
        }
    };
    let transformation = transformation(task, target);
    let model = build_distance_model(election, rules, &transformation, order, 0.0, None)?;
    let outcome = solver.solve(&model, rules.time_limit, rules.optimizer_log)?;
    info!(
        "evaluate_order: [{}] {:?}",
        election.format_order(order),
        outcome
    );
    Ok(OrderEvaluation {
        transformation,
        order: order.to_vec(),
        outcome,
        ips_solved: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(target: usize, outcome: SearchOutcome) -> SearchReport {
        SearchReport {
            target: CandidateId(target),
            outcome,
            ips_solved: 1,
            elapsed: Duration::ZERO,
        }
    }

    fn exact(distance: f64) -> SearchOutcome {
        SearchOutcome::Exact {
            distance,
            order: vec![CandidateId(0)],
        }
    }

    #[test]
    fn smallest_exact_distance_wins() {
        let runs = vec![
            report(1, exact(7.0)),
            report(2, SearchOutcome::NoManipulation),
            report(3, exact(4.0)),
        ];
        let (outcome, target) = aggregate(&runs);
        assert_eq!(outcome, exact(4.0));
        assert_eq!(target, Some(CandidateId(3)));
    }

    #[test]
    fn nothing_found() {
        let runs = vec![
            report(1, SearchOutcome::NoManipulation),
            report(2, SearchOutcome::NoManipulation),
        ];
        assert_eq!(aggregate(&runs), (SearchOutcome::NoManipulation, None));
        assert_eq!(aggregate(&[]), (SearchOutcome::NoManipulation, None));
    }

    #[test]
    fn a_timeout_turns_the_result_into_a_bracket() {
        let runs = vec![
            report(
                1,
                SearchOutcome::TimedOut {
                    lower: 2.0,
                    upper: 100.0,
                    order: None,
                },
            ),
            report(2, exact(9.0)),
        ];
        let (outcome, target) = aggregate(&runs);
        assert_eq!(
            outcome,
            SearchOutcome::TimedOut {
                lower: 2.0,
                upper: 9.0,
                order: Some(vec![CandidateId(0)])
            }
        );
        assert_eq!(outcome.verdict(), Verdict::Fail);
        assert_eq!(target, Some(CandidateId(2)));
    }

    #[test]
    fn a_timeout_without_witness_is_inconclusive() {
        let runs = vec![
            report(1, SearchOutcome::NoManipulation),
            report(
                2,
                SearchOutcome::TimedOut {
                    lower: 0.0,
                    upper: 50.0,
                    order: None,
                },
            ),
        ];
        let (outcome, _) = aggregate(&runs);
        assert_eq!(outcome.verdict(), Verdict::Inconclusive);
    }

    #[test]
    fn unusable_solver_wins_over_everything() {
        let runs = vec![
            report(1, exact(3.0)),
            report(
                2,
                SearchOutcome::NotApplicable {
                    reason: "restricted".to_string(),
                },
            ),
        ];
        let (outcome, target) = aggregate(&runs);
        assert_eq!(outcome.verdict(), Verdict::NotApplicable);
        assert_eq!(target, Some(CandidateId(2)));
    }
}
