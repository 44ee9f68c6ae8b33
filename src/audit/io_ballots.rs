// Primitives for reading ballot files.

use std::fs::File;
use std::io::{BufRead, BufReader};

use nonmono_irv::builder::Builder;

use crate::audit::*;

/// One ranking line of a ballot file.
#[derive(PartialEq, Debug, Clone)]
pub struct ParsedBallot {
    pub lineno: usize,
    pub choices: Vec<String>,
    pub count: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ParsedBallotFile {
    pub candidates: Vec<String>,
    pub parties: Vec<String>,
    pub ballots: Vec<ParsedBallot>,
}

fn split_names(line: &str) -> Vec<String> {
    line.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses `(name,name,...):count`.
fn parse_ranking(line: &str, path: &str, lineno: usize) -> CliResult<ParsedBallot> {
    let (ranking, count) = line.rsplit_once(':').context(BallotFormatSnafu {
        path: path.to_string(),
        lineno,
        message: "expected '(names):count'".to_string(),
    })?;
    let count_s = count.trim();
    let count = count_s.parse::<f64>().ok().context(BallotFormatSnafu {
        path: path.to_string(),
        lineno,
        message: format!("invalid count {:?}", count_s),
    })?;
    ensure!(
        count.is_finite() && count >= 0.0,
        BallotFormatSnafu {
            path: path.to_string(),
            lineno,
            message: format!("negative count {}", count),
        }
    );
    let ranking = ranking.trim();
    let ranking = ranking.strip_prefix('(').unwrap_or(ranking);
    let ranking = ranking.strip_suffix(')').unwrap_or(ranking);
    Ok(ParsedBallot {
        lineno,
        choices: split_names(ranking),
        count,
    })
}

pub fn parse_ballots<R: BufRead>(reader: R, path: &str) -> CliResult<ParsedBallotFile> {
    let mut candidates: Vec<String> = Vec::new();
    let mut parties: Vec<String> = Vec::new();
    let mut ballots: Vec<ParsedBallot> = Vec::new();
    for (idx, line_r) in reader.lines().enumerate() {
        let lineno = idx + 1;
        let line = line_r.context(OpeningFileSnafu {
            path: path.to_string(),
        })?;
        match lineno {
            1 => candidates = split_names(&line),
            2 => parties = split_names(&line),
            // Separator line.
            3 => {}
            _ if line.trim().is_empty() => {}
            _ => ballots.push(parse_ranking(&line, path, lineno)?),
        }
    }
    ensure!(
        !candidates.is_empty(),
        BallotFormatSnafu {
            path: path.to_string(),
            lineno: 1_usize,
            message: "no candidates".to_string(),
        }
    );
    ensure!(
        parties.len() == candidates.len(),
        BallotFormatSnafu {
            path: path.to_string(),
            lineno: 2_usize,
            message: format!(
                "{} parties for {} candidates",
                parties.len(),
                candidates.len()
            ),
        }
    );
    debug!(
        "parse_ballots: {}: {} candidates, {} ranking lines",
        path,
        candidates.len(),
        ballots.len()
    );
    Ok(ParsedBallotFile {
        candidates,
        parties,
        ballots,
    })
}

/// Turns a parsed file into an election. Identical rankings are merged.
pub fn build_election(parsed: &ParsedBallotFile, path: &str) -> CliResult<Election> {
    let mut builder = Builder::new()
        .candidates(&parsed.candidates)
        .context(AuditSnafu {})?
        .parties(&parsed.parties)
        .context(AuditSnafu {})?;
    for b in parsed.ballots.iter() {
        if let Err(e) = builder.add_ballot(&b.choices, b.count) {
            return BallotFormatSnafu {
                path: path.to_string(),
                lineno: b.lineno,
                message: e.to_string(),
            }
            .fail();
        }
    }
    builder.build().context(AuditSnafu {})
}

pub fn load_election(path: &str) -> CliResult<Election> {
    info!("Attempting to read ballot file {:?}", path);
    let file = File::open(path).context(OpeningFileSnafu {
        path: path.to_string(),
    })?;
    let parsed = parse_ballots(BufReader::new(file), path)?;
    build_election(&parsed, path)
}
