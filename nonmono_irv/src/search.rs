//! Branch-and-bound search over elimination orders.
//!
//! Every node of the tree is a partial elimination order. The distance of a
//! node is the optimum of the program built for its order: a lower bound for
//! every completion of the order. Leaves (complete orders) give upper bounds.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::config::*;
use crate::model::*;
use crate::solver::*;

/// Absorbs the round-off of the solver before taking the ceiling.
const ROUNDING_SLACK: f64 = 1e-6;

/// The number of ballots behind a fractional objective value.
pub fn ceil_distance(objective: f64) -> f64 {
    (objective - ROUNDING_SLACK).ceil().max(0.0)
}

/// A partial elimination order.
#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    /// Eliminated candidates, earliest first.
    pub order: Vec<CandidateId>,
    /// Candidates not placed yet, by index.
    pub remaining: Vec<CandidateId>,
    pub target: CandidateId,
    /// Lower bound on the distance of every completion.
    pub dist: f64,
}

impl Node {
    fn root(election: &Election, target: CandidateId) -> Node {
        Node {
            order: Vec::new(),
            remaining: election.candidate_ids().collect(),
            target,
            dist: 0.0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.remaining.is_empty()
    }

    /// The order extended with `cid`. A single candidate left over is placed
    /// right away.
    fn extended(&self, cid: CandidateId) -> Node {
        let mut order = self.order.clone();
        order.push(cid);
        let mut remaining: Vec<CandidateId> =
            self.remaining.iter().copied().filter(|c| *c != cid).collect();
        if remaining.len() == 1 {
            order.append(&mut remaining);
        }
        Node {
            order,
            remaining,
            target: self.target,
            dist: self.dist,
        }
    }
}

/// Where the target may end up in the elimination order.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PlacementPolicy {
    /// The target must not be the last one standing: it has to lose.
    ForbidTargetLast,
    /// The target must be the last one standing: it has to win.
    RequireTargetLast,
}

impl PlacementPolicy {
    pub fn for_transformation(transformation: &Transformation) -> PlacementPolicy {
        match transformation {
            Transformation::Promote(_) | Transformation::RemoveBottom(_) => {
                PlacementPolicy::ForbidTargetLast
            }
            Transformation::Demote(_) | Transformation::AddBottom(_) => {
                PlacementPolicy::RequireTargetLast
            }
        }
    }

    /// The children of a node. The children of the empty order are the first
    /// eliminations the search starts from.
    pub fn children(&self, node: &Node) -> Vec<Node> {
        match self {
            PlacementPolicy::ForbidTargetLast => node
                .remaining
                .iter()
                .map(|cid| node.extended(*cid))
                .filter(|child| !(child.is_leaf() && child.order.last() == Some(&node.target)))
                .collect(),
            PlacementPolicy::RequireTargetLast => {
                if node.remaining.as_slice() == [node.target] {
                    return vec![node.extended(node.target)];
                }
                node.remaining
                    .iter()
                    .filter(|cid| **cid != node.target)
                    .map(|cid| node.extended(*cid))
                    .collect()
            }
        }
    }
}

/// The open nodes, best first.
///
/// Nodes are sorted by increasing distance. Among equal distances, longer
/// orders come first so that leaves are reached sooner.
#[derive(Debug, Default)]
pub struct Fringe {
    nodes: VecDeque<Node>,
}

impl Fringe {
    pub fn new() -> Fringe {
        Fringe::default()
    }

    pub fn insert(&mut self, node: Node) {
        let pos = self.nodes.iter().position(|it| {
            node.dist < it.dist || (node.dist == it.dist && node.order.len() > it.order.len())
        });
        match pos {
            Some(idx) => self.nodes.insert(idx, node),
            None => self.nodes.push_back(node),
        }
    }

    pub fn pop_best(&mut self) -> Option<Node> {
        self.nodes.pop_front()
    }

    /// Drops the nodes that cannot beat `upper`. Returns how many were dropped.
    pub fn prune(&mut self, upper: f64) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.dist < upper);
        before - self.nodes.len()
    }

    pub fn min_dist(&self) -> Option<f64> {
        self.nodes.front().map(|n| n.dist)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter()
    }
}

fn dump_fringe(election: &Election, fringe: &Fringe) {
    trace!("fringe ({} nodes):", fringe.len());
    for n in fringe.iter() {
        trace!("  [{}] dist {}", election.format_order(&n.order), n.dist);
    }
}

/// Runs one branch-and-bound search for the smallest transformation that
/// gives an elimination order allowed by the placement policy of
/// `transformation`.
///
/// The time budget of `rules` applies to this run alone. It is checked before
/// every solve.
pub fn run_search(
    election: &Election,
    rules: &AuditRules,
    solver: &mut dyn IlpSolver,
    transformation: Transformation,
) -> AuditResult<SearchReport> {
    let start = Instant::now();
    let target = transformation.target();
    election.check_candidate(target)?;

    let report = |outcome: SearchOutcome, ips: u64| SearchReport {
        target,
        outcome,
        ips_solved: ips,
        elapsed: start.elapsed(),
    };

    if election.num_candidates() == 1 {
        debug!("run_search: single candidate, nothing to search");
        return Ok(report(SearchOutcome::Trivial, 0));
    }

    let policy = PlacementPolicy::for_transformation(&transformation);
    let mut upper = election.total_votes();
    let mut best_order: Option<Vec<CandidateId>> = None;
    let mut ips: u64 = 0;
    let mut timed_out = false;
    let mut fringe = Fringe::new();
    fringe.insert(Node::root(election, target));

    debug!(
        "run_search: {:?} target {} ({:?}), initial upper bound {}",
        transformation,
        election.name(target),
        policy,
        upper
    );

    'search: while let Some(node) = fringe.pop_best() {
        if rules.debug {
            trace!(
                "expanding [{}] dist {}",
                election.format_order(&node.order),
                node.dist
            );
        }
        for mut child in policy.children(&node) {
            let left = match rules.time_limit {
                Some(limit) => {
                    let left = limit.saturating_sub(start.elapsed());
                    if left == Duration::ZERO {
                        timed_out = true;
                        fringe.insert(node);
                        break 'search;
                    }
                    Some(left)
                }
                None => None,
            };
            if child.dist >= upper {
                continue;
            }

            let model = build_distance_model(
                election,
                rules,
                &transformation,
                &child.order,
                child.dist,
                Some(upper),
            )?;
            let outcome = solver.solve(&model, left, rules.optimizer_log)?;
            ips += 1;

            match outcome {
                SolveOutcome::Infeasible => {
                    if rules.debug {
                        trace!("  [{}] infeasible", election.format_order(&child.order));
                    }
                    continue;
                }
                SolveOutcome::Unusable { reason } => {
                    warn!("run_search: solver unusable: {}", reason);
                    return Ok(report(SearchOutcome::NotApplicable { reason }, ips));
                }
                SolveOutcome::TimedOut { objective } => {
                    debug!(
                        "run_search: solve timed out at [{}] (objective {:?})",
                        election.format_order(&child.order),
                        objective
                    );
                    timed_out = true;
                    fringe.insert(node);
                    break 'search;
                }
                SolveOutcome::Optimal { objective } => {
                    child.dist = ceil_distance(objective);
                }
            }

            if rules.debug {
                trace!(
                    "  [{}] dist {}",
                    election.format_order(&child.order),
                    child.dist
                );
            }
            if child.dist >= upper {
                continue;
            }
            if child.is_leaf() {
                upper = child.dist;
                debug!(
                    "run_search: new upper bound {} with order {}",
                    upper,
                    election.format_order(&child.order)
                );
                best_order = Some(child.order);
                let pruned = fringe.prune(upper);
                debug!("run_search: pruned {} nodes", pruned);
            } else {
                fringe.insert(child);
            }
        }
        if rules.debug {
            dump_fringe(election, &fringe);
        }
    }

    let outcome = if timed_out {
        let lower = fringe.min_dist().unwrap_or(upper).min(upper);
        warn!(
            "run_search: time limit reached, distance in [{}, {}]",
            lower, upper
        );
        SearchOutcome::TimedOut {
            lower,
            upper,
            order: best_order,
        }
    } else {
        match best_order {
            Some(order) => SearchOutcome::Exact {
                distance: upper,
                order,
            },
            None => SearchOutcome::NoManipulation,
        }
    };
    info!(
        "run_search: target {} done after {} IPs: {:?}",
        election.name(target),
        ips,
        outcome
    );
    Ok(report(outcome, ips))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use proptest::prelude::*;

    const A: CandidateId = CandidateId(0);
    const B: CandidateId = CandidateId(1);
    const C: CandidateId = CandidateId(2);

    fn election(n: usize) -> Election {
        let names: Vec<String> = (0..n).map(|i| format!("c{}", i)).collect();
        let mut b = Builder::new().candidates(&names).unwrap();
        b.add_ballot(&names, 10.0).unwrap();
        b.build().unwrap()
    }

    fn node(order: &[CandidateId], dist: f64) -> Node {
        Node {
            order: order.to_vec(),
            remaining: Vec::new(),
            target: A,
            dist,
        }
    }

    /// Replays a fixed list of outcomes, one per solve.
    struct Scripted {
        outcomes: Vec<SolveOutcome>,
        calls: usize,
    }

    impl IlpSolver for Scripted {
        fn solve(
            &mut self,
            _model: &LinearModel,
            _time_limit: Option<Duration>,
            _verbose: bool,
        ) -> AuditResult<SolveOutcome> {
            let out = self
                .outcomes
                .get(self.calls)
                .cloned()
                .unwrap_or(SolveOutcome::Infeasible);
            self.calls += 1;
            Ok(out)
        }
    }

    #[test]
    fn ceiling_absorbs_round_off() {
        assert_eq!(ceil_distance(2.0000001), 2.0);
        assert_eq!(ceil_distance(2.01), 3.0);
        assert_eq!(ceil_distance(-0.3), 0.0);
        assert_eq!(ceil_distance(0.0), 0.0);
    }

    #[test]
    fn fringe_prefers_longer_orders_on_ties() {
        let mut f = Fringe::new();
        f.insert(node(&[A], 3.0));
        f.insert(node(&[B], 1.0));
        f.insert(node(&[A, B], 3.0));
        f.insert(node(&[C], 3.0));
        let popped: Vec<(usize, f64)> = std::iter::from_fn(|| f.pop_best())
            .map(|n| (n.order.len(), n.dist))
            .collect();
        assert_eq!(popped, vec![(1, 1.0), (2, 3.0), (1, 3.0), (1, 3.0)]);
    }

    #[test]
    fn prune_drops_nodes_that_cannot_improve() {
        let mut f = Fringe::new();
        for d in [1.0, 4.0, 5.0, 7.0] {
            f.insert(node(&[A], d));
        }
        assert_eq!(f.prune(5.0), 2);
        assert_eq!(f.len(), 2);
        assert_eq!(f.min_dist(), Some(1.0));
    }

    #[test]
    fn forbid_policy_never_lets_the_target_win() {
        let e = election(3);
        let root = Node::root(&e, A);
        let policy = PlacementPolicy::ForbidTargetLast;
        let seeds = policy.children(&root);
        assert_eq!(seeds.len(), 3);
        // Two left with the target among them: only the target can go next.
        let after_c = seeds.iter().find(|n| n.order == vec![C]).unwrap();
        let children = policy.children(after_c);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].order, vec![C, A, B]);
        assert!(children[0].is_leaf());
    }

    #[test]
    fn forbid_policy_with_two_candidates() {
        let e = election(2);
        let seeds = PlacementPolicy::ForbidTargetLast.children(&Node::root(&e, A));
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].order, vec![A, B]);
    }

    #[test]
    fn require_policy_keeps_the_target_for_last() {
        let e = election(4);
        let policy = PlacementPolicy::RequireTargetLast;
        let seeds = policy.children(&Node::root(&e, B));
        let firsts: Vec<CandidateId> = seeds.iter().map(|n| n.order[0]).collect();
        assert_eq!(firsts, vec![A, C, CandidateId(3)]);
        let children = policy.children(&seeds[0]);
        assert_eq!(children.len(), 2);
        for child in children {
            assert!(!child.is_leaf());
            let last = policy.children(&child);
            assert_eq!(last.len(), 1);
            assert!(last[0].is_leaf());
            assert_eq!(last[0].order.last(), Some(&B));
        }
    }

    #[test]
    fn unusable_solver_aborts_the_run() {
        let e = election(3);
        let mut solver = Scripted {
            outcomes: vec![
                SolveOutcome::Optimal { objective: 0.0 },
                SolveOutcome::Unusable {
                    reason: "size limit".to_string(),
                },
            ],
            calls: 0,
        };
        let r = run_search(
            &e,
            &AuditRules::DEFAULT_RULES,
            &mut solver,
            Transformation::Promote(A),
        )
        .unwrap();
        assert_eq!(
            r.outcome,
            SearchOutcome::NotApplicable {
                reason: "size limit".to_string()
            }
        );
        assert_eq!(r.ips_solved, 2);
    }

    #[test]
    fn solver_timeout_reports_a_bracket() {
        let e = election(3);
        let mut solver = Scripted {
            outcomes: vec![
                SolveOutcome::Optimal { objective: 2.0 },
                SolveOutcome::Optimal { objective: 4.0 },
                SolveOutcome::TimedOut {
                    objective: Some(3.0),
                },
            ],
            calls: 0,
        };
        let r = run_search(
            &e,
            &AuditRules::DEFAULT_RULES,
            &mut solver,
            Transformation::Promote(A),
        )
        .unwrap();
        // The root is back in the fringe with distance zero.
        assert_eq!(
            r.outcome,
            SearchOutcome::TimedOut {
                lower: 0.0,
                upper: 10.0,
                order: None
            }
        );
        assert_eq!(r.ips_solved, 3);
    }

    #[test]
    fn first_leaf_sets_the_upper_bound() {
        let e = election(2);
        let mut solver = Scripted {
            outcomes: vec![SolveOutcome::Optimal { objective: 0.4 }],
            calls: 0,
        };
        let r = run_search(
            &e,
            &AuditRules::DEFAULT_RULES,
            &mut solver,
            Transformation::Promote(A),
        )
        .unwrap();
        assert_eq!(
            r.outcome,
            SearchOutcome::Exact {
                distance: 1.0,
                order: vec![A, B]
            }
        );
        assert_eq!(r.ips_solved, 1);
    }

    fn optimal(values: &[f64]) -> Vec<SolveOutcome> {
        values
            .iter()
            .map(|v| SolveOutcome::Optimal { objective: *v })
            .collect()
    }

    // Seeds [A], [B], [C] at 1, 2, 3. The two leaves under [A] come back at
    // 5 then 7, the leaf under [B] at 3.
    #[test]
    fn upper_bound_only_decreases() {
        let e = election(3);
        let mut solver = Scripted {
            outcomes: optimal(&[1.0, 2.0, 3.0, 5.0, 7.0, 3.0]),
            calls: 0,
        };
        let r = run_search(
            &e,
            &AuditRules::DEFAULT_RULES,
            &mut solver,
            Transformation::Promote(A),
        )
        .unwrap();
        assert_eq!(
            r.outcome,
            SearchOutcome::Exact {
                distance: 3.0,
                order: vec![B, A, C]
            }
        );
        // [C] is pruned once the bound reaches 3.
        assert_eq!(r.ips_solved, 6);
    }

    #[test]
    fn worse_leaves_keep_the_first_witness() {
        let e = election(3);
        let mut solver = Scripted {
            outcomes: optimal(&[1.0, 2.0, 3.0, 5.0, 7.0, 6.0]),
            calls: 0,
        };
        let r = run_search(
            &e,
            &AuditRules::DEFAULT_RULES,
            &mut solver,
            Transformation::Promote(A),
        )
        .unwrap();
        match r.outcome {
            SearchOutcome::Exact { distance, order } => {
                assert_eq!(distance, 5.0);
                assert_eq!(order.len(), 3);
                assert_eq!(order[0], A);
            }
            x => panic!("unexpected outcome {:?}", x),
        }
    }

    proptest! {
        #[test]
        fn fringe_pops_in_order(dists in proptest::collection::vec((0u8..20, 1usize..5), 0..40)) {
            let mut f = Fringe::new();
            for (d, len) in dists.iter() {
                f.insert(node(&vec![A; *len], *d as f64));
            }
            let mut prev: Option<Node> = None;
            while let Some(n) = f.pop_best() {
                if let Some(p) = prev {
                    prop_assert!(p.dist <= n.dist);
                    if p.dist == n.dist {
                        prop_assert!(p.order.len() >= n.order.len());
                    }
                }
                prev = Some(n);
            }
        }
    }
}
