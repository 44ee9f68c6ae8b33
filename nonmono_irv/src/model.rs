//! Construction of the distance programs.
//!
//! A [`LinearModel`] is plain data: bounded non-negative variables, linear
//! constraints and a linear objective to minimise. Solver types never appear
//! here; the translation happens in [`crate::solver`].

use std::collections::BTreeMap;
use std::fmt::Display;

use log::trace;
use snafu::prelude::*;

use crate::config::*;
use crate::signature::*;

/// Margin by which an eliminated candidate must trail every opponent when
/// ties are not allowed.
pub const STRICT_MARGIN: f64 = 0.01;

/// The way ballots may be changed to reach a given elimination order.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Transformation {
    /// Move the candidate up on some ballots.
    Promote(CandidateId),
    /// Move the candidate down on some ballots, or drop it from them.
    Demote(CandidateId),
    /// Add new ballots that rank the candidate last.
    AddBottom(CandidateId),
    /// Remove existing ballots that rank the candidate last.
    RemoveBottom(CandidateId),
}

impl Transformation {
    pub fn target(&self) -> CandidateId {
        match self {
            Transformation::Promote(c)
            | Transformation::Demote(c)
            | Transformation::AddBottom(c)
            | Transformation::RemoveBottom(c) => *c,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct VarId(pub usize);

#[derive(PartialEq, Debug, Clone)]
pub struct VariableDef {
    pub name: String,
    /// Inclusive upper bound. The lower bound is always zero.
    pub upper: f64,
    pub integer: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Sense {
    LessEq,
    Equal,
    GreaterEq,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ConstraintKind {
    /// Resulting count of a signature.
    FlowBalance,
    /// Ballots leaving a signature.
    OutflowCapacity,
    /// Objective kept inside the bounds given by the search.
    ObjectiveBound,
    /// `eliminated` trails `opponent` in the given round.
    Duel {
        round: usize,
        eliminated: CandidateId,
        opponent: CandidateId,
    },
}

#[derive(PartialEq, Debug, Clone)]
pub struct LinearConstraint {
    pub kind: ConstraintKind,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, coeff)| coeff * values.get(v.0).copied().unwrap_or(0.0))
            .sum()
    }

    /// True if the assignment satisfies the constraint, up to `tol`.
    pub fn holds(&self, values: &[f64], tol: f64) -> bool {
        let lhs = self.lhs(values);
        match self.sense {
            Sense::LessEq => lhs <= self.rhs + tol,
            Sense::Equal => (lhs - self.rhs).abs() <= tol,
            Sense::GreaterEq => lhs >= self.rhs - tol,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct LinearModel {
    pub variables: Vec<VariableDef>,
    pub constraints: Vec<LinearConstraint>,
    /// Minimised.
    pub objective: Vec<(VarId, f64)>,
}

impl LinearModel {
    pub fn add_variable(&mut self, name: String, upper: f64, integer: bool) -> VarId {
        self.variables.push(VariableDef {
            name,
            upper,
            integer,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        kind: ConstraintKind,
        terms: Vec<(VarId, f64)>,
        sense: Sense,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            kind,
            terms,
            sense,
            rhs,
        });
    }

    pub fn variable(&self, var: VarId) -> Option<&VariableDef> {
        self.variables.get(var.0)
    }

    /// The elimination constraints of the model.
    pub fn duels(&self) -> impl Iterator<Item = &LinearConstraint> + '_ {
        self.constraints
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::Duel { .. }))
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .iter()
            .map(|(v, coeff)| coeff * values.get(v.0).copied().unwrap_or(0.0))
            .sum()
    }

    fn write_terms(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        terms: &[(VarId, f64)],
    ) -> std::fmt::Result {
        if terms.is_empty() {
            return write!(f, "0");
        }
        for (idx, (var, coeff)) in terms.iter().enumerate() {
            let name = self
                .variables
                .get(var.0)
                .map(|v| v.name.as_str())
                .unwrap_or("?");
            if idx == 0 {
                write!(f, "{} {}", coeff, name)?;
            } else if *coeff < 0.0 {
                write!(f, " - {} {}", -coeff, name)?;
            } else {
                write!(f, " + {} {}", coeff, name)?;
            }
        }
        Ok(())
    }
}

impl Display for LinearModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "min: ")?;
        self.write_terms(f, &self.objective)?;
        writeln!(f)?;
        for c in self.constraints.iter() {
            write!(f, "  {:?}: ", c.kind)?;
            self.write_terms(f, &c.terms)?;
            let op = match c.sense {
                Sense::LessEq => "<=",
                Sense::Equal => "=",
                Sense::GreaterEq => ">=",
            };
            writeln!(f, " {} {}", op, c.rhs)?;
        }
        for v in self.variables.iter() {
            writeln!(
                f,
                "  {} in [0, {}]{}",
                v.name,
                v.upper,
                if v.integer { " int" } else { "" }
            )?;
        }
        Ok(())
    }
}

/// Checks that `order` is a valid (partial) elimination order.
pub(crate) fn check_order(election: &Election, order: &[CandidateId]) -> AuditResult<()> {
    ensure!(
        order.len() <= election.num_candidates(),
        InvalidOrderSnafu {
            reason: format!(
                "{} entries for {} candidates",
                order.len(),
                election.num_candidates()
            )
        }
    );
    let mut seen = vec![false; election.num_candidates()];
    for cid in order.iter() {
        election.check_candidate(*cid)?;
        ensure!(
            !seen[cid.index()],
            InvalidOrderSnafu {
                reason: format!("{} appears twice", election.name(*cid))
            }
        );
        seen[cid.index()] = true;
    }
    Ok(())
}

/// Builds the program whose optimum is the smallest number of ballot changes
/// (of the given kind) after which IRV eliminates the candidates in `order`.
///
/// `order` lists the eliminated candidates, earliest first. When it contains
/// every candidate, the last one is the winner and the final round carries no
/// constraint. The objective is kept within `[max(lower, 0), max(lower, upper)]`
/// where a missing `upper` stands for the total number of votes.
pub fn build_distance_model(
    election: &Election,
    rules: &AuditRules,
    transformation: &Transformation,
    order: &[CandidateId],
    lower: f64,
    upper: Option<f64>,
) -> AuditResult<LinearModel> {
    election.check_candidate(transformation.target())?;
    check_order(election, order)?;
    ensure!(
        lower.is_finite(),
        MalformedModelSnafu {
            message: format!("lower bound {}", lower)
        }
    );

    let target = transformation.target();
    let total = election.total_votes();
    let integer = election.is_integral();
    let mut counts = signature_counts(election.ballots());
    let mut model = LinearModel::default();

    // Ballots leaving (negative) or entering (positive) each signature.
    let mut flows: BTreeMap<Signature, Vec<(VarId, f64)>> = BTreeMap::new();
    // Ballots leaving each original signature through a transition.
    let mut outflows: Vec<(Signature, Vec<(VarId, f64)>)> = Vec::new();
    // Resulting counts may exceed the original total only when ballots are
    // added.
    let mut count_cap = total;

    match transformation {
        Transformation::Promote(_) | Transformation::Demote(_) => {
            let transitions = match transformation {
                Transformation::Promote(_) => promotion_set(target, &counts),
                _ => demotion_set(target, &counts),
            };
            for (from, tos) in transitions.iter() {
                let available = counts.get(from).copied().unwrap_or(0.0);
                let mut out: Vec<(VarId, f64)> = Vec::with_capacity(tos.len());
                for to in tos.iter() {
                    let var = model.add_variable(
                        format!("t_{}_to_{}", from.compact(), to.compact()),
                        available,
                        integer,
                    );
                    out.push((var, 1.0));
                    flows.entry(from.clone()).or_default().push((var, -1.0));
                    flows.entry(to.clone()).or_default().push((var, 1.0));
                    model.objective.push((var, 1.0));
                }
                outflows.push((from.clone(), out));
            }
            for sigs in transitions.values() {
                for s in sigs.iter() {
                    counts.entry(s.clone()).or_insert(0.0);
                }
            }
        }
        Transformation::AddBottom(_) => {
            count_cap = 2.0 * total;
            for pattern in bottom_patterns(target, election.num_candidates()) {
                let var = model.add_variable(format!("a_{}", pattern.compact()), total, integer);
                flows.entry(pattern.clone()).or_default().push((var, 1.0));
                model.objective.push((var, 1.0));
                counts.entry(pattern).or_insert(0.0);
            }
        }
        Transformation::RemoveBottom(_) => {
            for sig in bottom_ranked(target, &counts) {
                let available = counts.get(&sig).copied().unwrap_or(0.0);
                let var = model.add_variable(format!("r_{}", sig.compact()), available, integer);
                flows.entry(sig).or_default().push((var, -1.0));
                model.objective.push((var, 1.0));
            }
        }
    }

    // Resulting count of every relevant signature, tied to the original count
    // by flow conservation: y_s - inflow + outflow = n_s.
    let mut resulting: Vec<(Signature, VarId)> = Vec::with_capacity(counts.len());
    for (sig, n) in counts.iter() {
        let y = model.add_variable(format!("y_{}", sig.compact()), count_cap, integer);
        let mut terms = vec![(y, 1.0)];
        if let Some(fl) = flows.get(sig) {
            terms.extend(fl.iter().map(|(v, coeff)| (*v, -coeff)));
        }
        model.add_constraint(ConstraintKind::FlowBalance, terms, Sense::Equal, *n);
        resulting.push((sig.clone(), y));
    }

    for (from, out) in outflows {
        let available = counts.get(&from).copied().unwrap_or(0.0);
        model.add_constraint(ConstraintKind::OutflowCapacity, out, Sense::LessEq, available);
    }

    add_elimination_constraints(&mut model, election, rules, order, &resulting);

    let lb = lower.max(0.0);
    let ub = lower.max(upper.unwrap_or(total));
    model.add_constraint(
        ConstraintKind::ObjectiveBound,
        model.objective.clone(),
        Sense::GreaterEq,
        lb,
    );
    model.add_constraint(
        ConstraintKind::ObjectiveBound,
        model.objective.clone(),
        Sense::LessEq,
        ub,
    );

    if rules.debug {
        trace!(
            "build_distance_model: {:?} order [{}]\n{}",
            transformation,
            election.format_order(order),
            model
        );
        for (sig, _) in resulting.iter() {
            trace!("  {} = {}", sig.compact(), election.format_signature(sig));
        }
    }
    Ok(model)
}

/// One constraint per round and standing opponent:
/// `tally(eliminated) - tally(opponent) <= -margin`.
fn add_elimination_constraints(
    model: &mut LinearModel,
    election: &Election,
    rules: &AuditRules,
    order: &[CandidateId],
    resulting: &[(Signature, VarId)],
) {
    let n = election.num_candidates();
    let margin = if rules.allow_ties { 0.0 } else { STRICT_MARGIN };
    let rounds = if order.len() == n {
        n.saturating_sub(1)
    } else {
        order.len()
    };

    let mut eliminated = vec![false; n];
    for (round, &loser) in order.iter().enumerate().take(rounds) {
        // Tally terms of every continuing candidate for this round.
        let mut tallies: Vec<Vec<(VarId, f64)>> = vec![Vec::new(); n];
        for (sig, y) in resulting.iter() {
            if let Some(top) = sig.top_continuing(&eliminated) {
                tallies[top.index()].push((*y, 1.0));
            }
        }
        for opponent in (0..n).map(CandidateId) {
            if opponent == loser || eliminated[opponent.index()] {
                continue;
            }
            let mut terms = tallies[loser.index()].clone();
            terms.extend(tallies[opponent.index()].iter().map(|(v, _)| (*v, -1.0)));
            model.add_constraint(
                ConstraintKind::Duel {
                    round,
                    eliminated: loser,
                    opponent,
                },
                terms,
                Sense::LessEq,
                -margin,
            );
        }
        eliminated[loser.index()] = true;
    }
}
