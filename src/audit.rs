use log::{debug, info, warn};

use nonmono_irv::*;
use snafu::{prelude::*, Snafu};

use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use serde_json::Value as JSValue;

use crate::args::Args;
use crate::audit::config_reader::*;

pub mod config_reader;
pub mod io_ballots;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error in ballot file {path}, line {lineno}: {message}"))]
    BallotFormat {
        path: String,
        lineno: usize,
        message: String,
    },
    #[snafu(display("Error parsing the JSON configuration {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing the JSON summary"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Invalid setting: {message}"))]
    InvalidSetting { message: String },
    #[snafu(display("{source}"))]
    Audit { source: AuditError },
}

pub type CliResult<T> = Result<T, CliError>;

/// The settings of one audit, after merging the configuration file and the
/// command line.
#[derive(PartialEq, Debug, Clone)]
pub struct Settings {
    pub ballot_file: String,
    pub task: Task,
    pub rules: AuditRules,
    pub log_file: Option<String>,
    pub sim_log: bool,
    pub verbose: bool,
    pub order: Option<Vec<String>>,
    pub out: Option<String>,
}

/// Merges the command line with the optional configuration file. The command
/// line wins.
pub fn resolve_settings(args: &Args, config: Option<(&RunConfig, &Path)>) -> CliResult<Settings> {
    let file = config.map(|(c, _)| c.clone()).unwrap_or_default();
    let file_ballots = config.and_then(|(c, p)| c.ballot_path(p));

    let ballot_file = args
        .ballots
        .clone()
        .or(file_ballots)
        .context(InvalidSettingSnafu {
            message: "no ballot file given (use --ballots or a configuration file)".to_string(),
        })?;

    let task_id = args.task.or(file.task).unwrap_or(0);
    let task = Task::try_from(task_id).ok().context(InvalidSettingSnafu {
        message: format!("unknown task {} (expected 0, 1, 2 or 3)", task_id),
    })?;

    let time_limit = match args.tlimit.or(file.time_limit_seconds) {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => {
            return InvalidSettingSnafu {
                message: format!("invalid time limit {}", secs),
            }
            .fail()
        }
        None => None,
    };

    let rules = AuditRules {
        allow_ties: args.allow_ties || file.allow_ties.unwrap_or(false),
        test_all_losers: args.all_losers || file.test_all_losers.unwrap_or(false),
        time_limit,
        debug: args.debug || file.debug.unwrap_or(false),
        optimizer_log: args.optlog || file.optimizer_log.unwrap_or(false),
    };

    Ok(Settings {
        ballot_file,
        task,
        rules,
        log_file: args.logfile.clone().or(file.log_file),
        sim_log: args.simlog,
        verbose: args.verbose,
        order: args.order.clone(),
        out: args.out.clone().or(file.output),
    })
}

/// Sets up `env_logger`. `RUST_LOG` takes precedence over the verbosity
/// flags.
pub fn init_logging(settings: &Settings) -> CliResult<()> {
    let default_level = if settings.rules.debug {
        "trace"
    } else if settings.verbose {
        "debug"
    } else {
        "info"
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if let Some(path) = &settings.log_file {
        let file = File::create(path).context(WritingFileSnafu { path: path.clone() })?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    if builder.try_init().is_err() {
        warn!("init_logging: a logger is already installed");
    }
    Ok(())
}

fn order_names(election: &Election, order: &[CandidateId]) -> Vec<String> {
    order
        .iter()
        .map(|cid| election.name(*cid).to_string())
        .collect()
}

fn outcome_to_json(election: &Election, outcome: &SearchOutcome) -> JSValue {
    match outcome {
        SearchOutcome::Trivial => json!({"kind": "trivial", "margin": 0.0}),
        SearchOutcome::Exact { distance, order } => json!({
            "kind": "exact",
            "margin": distance,
            "order": order_names(election, order),
        }),
        SearchOutcome::NoManipulation => json!({"kind": "noManipulation"}),
        SearchOutcome::TimedOut {
            lower,
            upper,
            order,
        } => json!({
            "kind": "timedOut",
            "lower": lower,
            "upper": upper,
            "order": order.as_ref().map(|o| order_names(election, o)),
        }),
        SearchOutcome::NotApplicable { reason } => {
            json!({"kind": "notApplicable", "reason": reason})
        }
    }
}

fn build_summary_js(election: &Election, report: &TaskReport) -> JSValue {
    let sim = &report.simulation;
    let runs: Vec<JSValue> = report
        .runs
        .iter()
        .map(|r| {
            json!({
                "target": election.name(r.target),
                "outcome": outcome_to_json(election, &r.outcome),
                "ipsSolved": r.ips_solved,
                "timeSeconds": r.elapsed.as_secs_f64(),
            })
        })
        .collect();
    json!({
        "task": report.task.label(),
        "winner": election.name(sim.winner),
        "eliminationOrder": order_names(election, &sim.order),
        "lastRoundMargin": sim.last_round_margin,
        "lrm": sim.lrm(),
        "target": report.target.map(|cid| election.name(cid).to_string()),
        "outcome": outcome_to_json(election, &report.outcome),
        "runs": runs,
        "ipsSolved": report.ips_solved,
        "totalTimeSeconds": report.elapsed.as_secs_f64(),
        "verdict": report.verdict().to_string(),
    })
}

fn build_evaluation_js(election: &Election, eval: &OrderEvaluation) -> JSValue {
    json!({
        "order": order_names(election, &eval.order),
        "target": election.name(eval.transformation.target()),
        "distance": eval.distance(),
        "timedOut": matches!(eval.outcome, SolveOutcome::TimedOut { .. }),
        "ipsSolved": eval.ips_solved,
    })
}

fn print_summary(election: &Election, report: &TaskReport) {
    let sim = &report.simulation;
    println!("Task: {}", report.task.label());
    println!("IRV winner: {}", election.name(sim.winner));
    println!("Elimination order: {}", election.format_order(&sim.order));
    println!("LRM: {}", sim.lrm());
    match &report.outcome {
        SearchOutcome::Trivial => println!("Margin: 0 (single candidate)"),
        SearchOutcome::Exact { distance, order } => {
            println!("Margin: {}", distance);
            if let Some(target) = report.target {
                println!("Target: {}", election.name(target));
            }
            println!("Manipulated order: {}", election.format_order(order));
        }
        SearchOutcome::NoManipulation => println!("Margin: none (no manipulation exists)"),
        SearchOutcome::TimedOut {
            lower,
            upper,
            order,
        } => {
            println!("Margin LB: {}", lower);
            println!("Margin UB: {}", upper);
            if let Some(order) = order {
                println!("Manipulated order: {}", election.format_order(order));
            }
        }
        SearchOutcome::NotApplicable { reason } => println!("Margin: not applicable ({})", reason),
    }
    if report.runs.len() > 1 {
        for r in report.runs.iter() {
            let margin = match &r.outcome {
                SearchOutcome::Exact { distance, .. } => distance.to_string(),
                SearchOutcome::TimedOut { lower, upper, .. } => format!("[{}, {}]", lower, upper),
                SearchOutcome::NotApplicable { .. } => "not applicable".to_string(),
                _ => "none".to_string(),
            };
            println!(
                "  {}: {} ({} IPs, {:.2}s)",
                election.name(r.target),
                margin,
                r.ips_solved,
                r.elapsed.as_secs_f64()
            );
        }
    }
    println!("IPs solved: {}", report.ips_solved);
    println!("Total time: {:.2}s", report.elapsed.as_secs_f64());
    println!("Verdict: {}", report.verdict());
}

fn write_summary(out: &str, js: &JSValue) -> CliResult<()> {
    let pretty_js = serde_json::to_string_pretty(js).context(WritingJsonSnafu {})?;
    if out == "stdout" {
        println!("{}", pretty_js);
    } else {
        fs::write(out, pretty_js).context(WritingFileSnafu {
            path: out.to_string(),
        })?;
        info!("Summary written to {}", out);
    }
    Ok(())
}

fn resolve_order(election: &Election, names: &[String]) -> CliResult<Vec<CandidateId>> {
    let mut order: Vec<CandidateId> = Vec::with_capacity(names.len());
    for name in names.iter() {
        let cid = election
            .candidate_by_name(name.trim())
            .context(InvalidSettingSnafu {
                message: format!("unknown candidate {:?} in --order", name),
            })?;
        order.push(cid);
    }
    Ok(order)
}

/// Runs one audit from the command line arguments.
pub fn run_audit(args: &Args) -> CliResult<()> {
    let config = match &args.config {
        Some(p) => Some(read_run_config(p)?),
        None => None,
    };
    let settings = resolve_settings(
        args,
        config
            .as_ref()
            .zip(args.config.as_ref())
            .map(|(c, p)| (c, Path::new(p.as_str()))),
    )?;
    init_logging(&settings)?;
    debug!("run_audit: settings {:?}", settings);

    let election = io_ballots::load_election(&settings.ballot_file)?;
    info!(
        "Loaded {} candidates, {} distinct rankings, {} votes",
        election.num_candidates(),
        election.ballots().len(),
        election.total_votes()
    );
    // The count is repeated by the task drivers, this one only logs it.
    if settings.sim_log {
        simulate_irv(&election, true).context(AuditSnafu {})?;
    }

    let mut solver = GoodLpSolver::new();

    if let Some(names) = &settings.order {
        let order = resolve_order(&election, names)?;
        let eval = evaluate_order(
            &election,
            &settings.rules,
            &mut solver,
            settings.task,
            &order,
        )
        .context(AuditSnafu {})?;
        let described = match (&eval.outcome, eval.distance()) {
            (SolveOutcome::TimedOut { .. }, Some(d)) => format!("at most {} (time limit)", d),
            (SolveOutcome::TimedOut { .. }, None) => "unknown (time limit)".to_string(),
            (_, Some(d)) => d.to_string(),
            (_, None) => "infeasible".to_string(),
        };
        println!("Distance of {}: {}", election.format_order(&order), described);
        println!("IPs solved: {}", eval.ips_solved);
        if let Some(out) = &settings.out {
            write_summary(out, &build_evaluation_js(&election, &eval))?;
        }
        return Ok(());
    }

    let report = run_task(&election, &settings.rules, &mut solver, settings.task)
        .context(AuditSnafu {})?;
    if let SearchOutcome::TimedOut { .. } = report.outcome {
        warn!("Time limit reached: the margin is only bracketed");
    }
    print_summary(&election, &report);
    if let Some(out) = &settings.out {
        write_summary(out, &build_summary_js(&election, &report))?;
    }
    Ok(())
}
