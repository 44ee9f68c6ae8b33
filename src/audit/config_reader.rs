use crate::audit::*;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The settings of an audit, as stored in a JSON file.
///
/// Every field is optional: missing values fall back to the command line or
/// to the defaults.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "ballotFile")]
    pub ballot_file: Option<String>,
    pub task: Option<u8>,
    #[serde(rename = "testAllLosers")]
    pub test_all_losers: Option<bool>,
    #[serde(rename = "allowTies")]
    pub allow_ties: Option<bool>,
    #[serde(rename = "timeLimitSeconds")]
    pub time_limit_seconds: Option<f64>,
    #[serde(rename = "logFile")]
    pub log_file: Option<String>,
    #[serde(rename = "optimizerLog")]
    pub optimizer_log: Option<bool>,
    pub debug: Option<bool>,
    pub output: Option<String>,
}

impl RunConfig {
    /// The ballot file, relative to the directory of the configuration file.
    pub fn ballot_path(&self, config_path: &Path) -> Option<String> {
        let file = self.ballot_file.as_ref()?;
        let p = Path::new(file);
        if p.is_absolute() {
            return Some(file.clone());
        }
        let root = config_path.parent().unwrap_or_else(|| Path::new(""));
        Some(root.join(p).display().to_string())
    }
}

pub fn parse_run_config(contents: &str, path: &str) -> CliResult<RunConfig> {
    let config: RunConfig = serde_json::from_str(contents).context(ParsingJsonSnafu {
        path: path.to_string(),
    })?;
    debug!("parse_run_config: {:?}", config);
    Ok(config)
}

pub fn read_run_config(path: &str) -> CliResult<RunConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu {
        path: path.to_string(),
    })?;
    parse_run_config(&contents, path)
}
