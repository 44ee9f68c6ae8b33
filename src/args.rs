use clap::Parser;

/// Computes the margin of monotonicity and participation failures in instant-runoff elections.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The ballot file: candidates on the first line, parties on the second line,
    /// one '(name,name,...):count' ranking per line after the third line.
    #[clap(short, long, value_parser)]
    pub ballots: Option<String>,

    /// (0, 1, 2 or 3, default 0) The check to run: 0 promotion of the winner, 1 demotion of a loser,
    /// 2 ballots added with a loser at the bottom, 3 ballots removed with the winner at the bottom.
    #[clap(short, long, value_parser)]
    pub task: Option<u8>,

    /// For the checks on losers, check every loser instead of stopping at the first anomaly.
    #[clap(long, takes_value = false)]
    pub all_losers: bool,

    /// Accept ties between the eliminated candidate and the continuing candidates.
    #[clap(long, takes_value = false)]
    pub allow_ties: bool,

    /// (seconds) The time budget of each search. When it runs out, the margin is reported as an interval.
    #[clap(long, value_parser)]
    pub tlimit: Option<f64>,

    /// (file path) If specified, the log is written to this file instead of the standard error.
    #[clap(long, value_parser)]
    pub logfile: Option<String>,

    /// If passed as an argument, logs every round of the IRV count.
    #[clap(long, takes_value = false)]
    pub simlog: bool,

    /// If passed as an argument, logs the result of every solve with its non-zero variables.
    #[clap(long, takes_value = false)]
    pub optlog: bool,

    /// (list of comma-separated names or not specified) If specified, only computes the distance of
    /// this elimination order, earliest eliminated first.
    #[clap(long, value_parser, use_value_delimiter = true)]
    pub order: Option<Vec<String>>,

    /// (file path, 'stdout' or empty) If specified, the summary of the audit will be written in JSON format to the
    /// given location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, optional) A JSON file with the settings of the audit. The flags passed on the command line
    /// take precedence over the file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    // Other arguments
    /// If passed as an argument, dumps the programs and the search tree (trace level logging).
    #[clap(long, takes_value = false)]
    pub debug: bool,

    /// If passed as an argument, will turn on verbose logging.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
