//! Adapter between the plain-data [`LinearModel`] and an integer programming
//! solver.

use std::time::{Duration, Instant};

use good_lp::{
    default_solver, variable, variables, Expression, ResolutionError, Solution, SolutionStatus,
    SolverModel, Variable, WithTimeLimit,
};
use log::{debug, info};

use crate::config::*;
use crate::model::*;

/// Tolerance used when checking constraints without any variable.
const FEASIBILITY_TOL: f64 = 1e-9;

/// The result of a single solve.
#[derive(PartialEq, Debug, Clone)]
pub enum SolveOutcome {
    Optimal { objective: f64 },
    /// The time budget ran out, with the best objective found so far if the
    /// solver reached any feasible point.
    TimedOut { objective: Option<f64> },
    Infeasible,
    /// The solver could not run this model at all.
    Unusable { reason: String },
}

/// Solves a model to optimality, minimising its objective.
pub trait IlpSolver {
    fn solve(
        &mut self,
        model: &LinearModel,
        time_limit: Option<Duration>,
        verbose: bool,
    ) -> AuditResult<SolveOutcome>;
}

/// The bundled pure-Rust MILP backend of `good_lp`.
///
/// The time budget is handed to the backend. A solve it interrupts is
/// reported as [`SolveOutcome::TimedOut`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GoodLpSolver;

impl GoodLpSolver {
    pub fn new() -> GoodLpSolver {
        GoodLpSolver
    }
}

fn expression(handles: &[Variable], terms: &[(VarId, f64)]) -> Expression {
    let mut expr = Expression::with_capacity(terms.len());
    for (var, coeff) in terms.iter() {
        expr.add_mul(*coeff, handles[var.0]);
    }
    expr
}

impl IlpSolver for GoodLpSolver {
    fn solve(
        &mut self,
        model: &LinearModel,
        time_limit: Option<Duration>,
        verbose: bool,
    ) -> AuditResult<SolveOutcome> {
        let start = Instant::now();

        // Constraints with no variable are decided here: the backend rejects
        // them.
        if let Some(c) = model
            .constraints
            .iter()
            .find(|c| c.terms.is_empty() && !c.holds(&[], FEASIBILITY_TOL))
        {
            debug!("solve: constant constraint {:?} cannot hold", c.kind);
            return Ok(SolveOutcome::Infeasible);
        }

        let mut vars = variables!();
        let handles: Vec<Variable> = model
            .variables
            .iter()
            .map(|v| {
                let def = variable().name(v.name.clone()).min(0.0).max(v.upper);
                vars.add(if v.integer { def.integer() } else { def })
            })
            .collect();

        let mut problem = vars
            .minimise(expression(&handles, &model.objective))
            .using(default_solver);
        for c in model.constraints.iter().filter(|c| !c.terms.is_empty()) {
            let lhs = expression(&handles, &c.terms);
            problem = problem.with(match c.sense {
                Sense::LessEq => lhs.leq(c.rhs),
                Sense::Equal => lhs.eq(c.rhs),
                Sense::GreaterEq => lhs.geq(c.rhs),
            });
        }
        if let Some(limit) = time_limit {
            problem = problem.with_time_limit(limit.as_secs_f64());
        }

        let solution = match problem.solve() {
            Ok(s) => s,
            Err(ResolutionError::Infeasible) => {
                if verbose {
                    info!("solver: infeasible after {:?}", start.elapsed());
                }
                return Ok(SolveOutcome::Infeasible);
            }
            Err(ResolutionError::Unbounded) => {
                return MalformedModelSnafu {
                    message: "unbounded objective".to_string(),
                }
                .fail();
            }
            // The backend reports an interrupted solve without any feasible
            // point this way.
            Err(ResolutionError::Other(reason)) if time_limit.is_some() => {
                debug!("solve: {} after {:?}", reason, start.elapsed());
                return Ok(SolveOutcome::TimedOut { objective: None });
            }
            Err(ResolutionError::Other(reason)) => {
                return Ok(SolveOutcome::Unusable {
                    reason: reason.to_string(),
                });
            }
            Err(ResolutionError::Str(reason)) => {
                return Ok(SolveOutcome::Unusable { reason });
            }
            Err(e) => {
                return SolverSnafu {
                    message: e.to_string(),
                }
                .fail();
            }
        };

        let status = solution.status();
        let values: Vec<f64> = handles.iter().map(|h| solution.value(*h)).collect();
        let objective = model.objective_value(&values);
        let elapsed = start.elapsed();
        if verbose {
            info!(
                "solver: {:?} objective {} ({} variables, {} constraints) in {:?}",
                status,
                objective,
                model.variables.len(),
                model.constraints.len(),
                elapsed
            );
            for (def, value) in model.variables.iter().zip(values.iter()) {
                if value.abs() > FEASIBILITY_TOL {
                    info!("  {} = {}", def.name, value);
                }
            }
        }
        match status {
            SolutionStatus::TimeLimit => Ok(SolveOutcome::TimedOut {
                objective: Some(objective),
            }),
            SolutionStatus::Optimal | SolutionStatus::GapLimit => {
                Ok(SolveOutcome::Optimal { objective })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // min a + b  s.t.  a + b >= 2.5, a <= 1
    fn small_model(integer: bool) -> LinearModel {
        let mut m = LinearModel::default();
        let a = m.add_variable("a".to_string(), 1.0, integer);
        let b = m.add_variable("b".to_string(), 10.0, integer);
        m.objective = vec![(a, 1.0), (b, 1.0)];
        m.add_constraint(
            ConstraintKind::FlowBalance,
            vec![(a, 1.0), (b, 1.0)],
            Sense::GreaterEq,
            2.5,
        );
        m
    }

    #[test]
    fn continuous_optimum() {
        init();
        let out = GoodLpSolver::new()
            .solve(&small_model(false), None, true)
            .unwrap();
        match out {
            SolveOutcome::Optimal { objective } => assert!((objective - 2.5).abs() < 1e-6),
            x => panic!("unexpected outcome {:?}", x),
        }
    }

    #[test]
    fn integer_optimum_rounds_up() {
        init();
        let out = GoodLpSolver::new()
            .solve(&small_model(true), None, false)
            .unwrap();
        match out {
            SolveOutcome::Optimal { objective } => assert!((objective - 3.0).abs() < 1e-6),
            x => panic!("unexpected outcome {:?}", x),
        }
    }

    #[test]
    fn infeasible_model() {
        init();
        let mut m = small_model(false);
        let a = VarId(0);
        m.add_constraint(
            ConstraintKind::ObjectiveBound,
            vec![(a, 1.0), (VarId(1), 1.0)],
            Sense::LessEq,
            1.0,
        );
        let out = GoodLpSolver::new().solve(&m, None, false).unwrap();
        assert_eq!(out, SolveOutcome::Infeasible);
    }

    #[test]
    fn constant_constraints_are_checked_before_solving() {
        let mut m = small_model(false);
        m.add_constraint(ConstraintKind::ObjectiveBound, vec![], Sense::GreaterEq, 1.0);
        let out = GoodLpSolver::new().solve(&m, None, false).unwrap();
        assert_eq!(out, SolveOutcome::Infeasible);

        let mut m = small_model(false);
        m.add_constraint(ConstraintKind::ObjectiveBound, vec![], Sense::LessEq, 0.0);
        let out = GoodLpSolver::new().solve(&m, None, false).unwrap();
        assert!(matches!(out, SolveOutcome::Optimal { .. }));
    }

    // 2 * (x_0 + ... + x_39) = 41 over binaries: the relaxation is always
    // feasible, so branching has to enumerate before it can conclude.
    fn parity_model() -> LinearModel {
        let mut m = LinearModel::default();
        let terms: Vec<(VarId, f64)> = (0..40)
            .map(|i| (m.add_variable(format!("x_{}", i), 1.0, true), 2.0))
            .collect();
        m.objective = terms.iter().map(|(v, _)| (*v, 1.0)).collect();
        m.add_constraint(ConstraintKind::FlowBalance, terms, Sense::Equal, 41.0);
        m
    }

    #[test]
    fn budget_interrupts_a_hard_solve() {
        init();
        let start = Instant::now();
        let out = GoodLpSolver::new()
            .solve(&parity_model(), Some(Duration::from_millis(1)), true)
            .unwrap();
        assert_eq!(out, SolveOutcome::TimedOut { objective: None });
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn easy_solves_finish_within_the_budget() {
        let out = GoodLpSolver::new()
            .solve(&small_model(true), Some(Duration::from_secs(30)), false)
            .unwrap();
        match out {
            SolveOutcome::Optimal { objective } => assert!((objective - 3.0).abs() < 1e-6),
            x => panic!("unexpected outcome {:?}", x),
        }
    }
}
