use clap::parser::ValueSource;
use clap::{ArgMatches, Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{CalError, CalResult};

/// Default number of solver rounds in each replication.
pub const DEFAULT_ROUNDS: usize = 100;
/// Default epsilon for the heuristic modes (GLOBAL uses zero).
pub const DEFAULT_EPSILON: f64 = 1.0;

/// How the starting point of each replication is produced.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ValueEnum,
)]
pub enum Algorithm {
    /// Start from the supplied initial sample, or a random one.
    #[strum(serialize = "rand")]
    #[serde(rename = "rand")]
    #[value(name = "rand")]
    Random,
    /// Start from the uniform point and run the Cube flight.
    #[default]
    #[strum(serialize = "cube")]
    #[serde(rename = "cube")]
    #[value(name = "cube")]
    Cube,
    /// Single exhaustive branch-and-cut run.
    #[strum(serialize = "global")]
    #[serde(rename = "global")]
    #[value(name = "global")]
    Global,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, ValueEnum,
)]
pub enum OutputFormat {
    /// One line per replication.
    #[default]
    #[strum(serialize = "row")]
    #[serde(rename = "row")]
    #[value(name = "row")]
    Row,
    /// One line per unit and replication.
    #[strum(serialize = "block")]
    #[serde(rename = "block")]
    #[value(name = "block")]
    Block,
}

impl Algorithm {
    /// Comma separated list of the accepted names, for error messages.
    pub fn choices() -> String {
        Algorithm::iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Run limits and modes. Filled from the instance file first, then
/// overridden by whatever was typed on the command line.
#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Stop a replication once the squared objective is below this value
    #[arg(short = 'e', long)]
    pub epsilon: Option<f64>,

    /// LP relaxations allowed in each branch-and-cut run
    #[arg(short = 'i', long = "lp-iter")]
    pub lp_iterations: Option<u64>,

    /// Branch-and-cut runs in each replication
    #[arg(short = 'k', long = "iterations", default_value_t = DEFAULT_ROUNDS)]
    pub rounds: usize,

    /// Node limit of each branch-and-cut run
    #[arg(short = 'b', long = "bb-nodes")]
    pub node_limit: Option<u64>,

    /// Seconds allotted to each branch-and-cut run
    #[arg(short = 't', long = "time")]
    pub time_limit: Option<f64>,

    /// Seconds allotted to the whole run
    #[arg(short = 'T', long = "tot-time")]
    pub total_time_limit: Option<f64>,

    /// Number of replications (GLOBAL runs exactly one)
    #[arg(short = 'R', long, default_value_t = 1)]
    pub replications: usize,

    /// Random seed (taken from the clock when absent)
    #[arg(short = 's', long)]
    pub seed: Option<u64>,

    /// Fraction of N - p flight steps after which the Cube flight stops
    #[arg(short = 'f', long = "int-fixed")]
    pub early_stop: Option<f64>,

    /// Output file (defaults to the instance name with a .sol extension)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output layout. Units outside the sample are written with weight 0
    #[arg(short = 'O', long = "out-format", value_enum, default_value_t = OutputFormat::Row)]
    pub out_format: OutputFormat,

    /// Search strategy
    #[arg(short = 'a', long, value_enum, default_value_t = Algorithm::Cube)]
    pub algorithm: Algorithm,

    /// Skip the Cube heuristic at the root of each branch-and-cut run
    #[arg(long = "no-cube-heuristic", default_value_t = false)]
    pub no_cube_heuristic: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            epsilon: None,
            lp_iterations: None,
            rounds: DEFAULT_ROUNDS,
            node_limit: None,
            time_limit: None,
            total_time_limit: None,
            replications: 1,
            seed: None,
            early_stop: None,
            output: None,
            out_format: OutputFormat::Row,
            algorithm: Algorithm::Cube,
            no_cube_heuristic: false,
        }
    }
}

impl RunSettings {
    /// Overwrites every field the user set explicitly on the command line.
    pub fn merge_from_cli(&mut self, cli: &RunSettings, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($field:ident) => {
                if matches.value_source(stringify!($field)) == Some(ValueSource::CommandLine) {
                    self.$field = cli.$field.clone();
                }
            };
        }

        update_if_present!(epsilon);
        update_if_present!(lp_iterations);
        update_if_present!(rounds);
        update_if_present!(node_limit);
        update_if_present!(time_limit);
        update_if_present!(total_time_limit);
        update_if_present!(replications);
        update_if_present!(seed);
        update_if_present!(early_stop);
        update_if_present!(output);
        update_if_present!(out_format);
        update_if_present!(algorithm);
        update_if_present!(no_cube_heuristic);
    }

    pub fn effective_epsilon(&self) -> f64 {
        match self.epsilon {
            Some(e) => e,
            None if self.algorithm == Algorithm::Global => 0.0,
            None => DEFAULT_EPSILON,
        }
    }

    /// Rounds actually run per replication.
    pub fn round_budget(&self) -> usize {
        if self.algorithm == Algorithm::Global {
            1
        } else {
            self.rounds
        }
    }

    pub fn round_time_budget(&self) -> Option<Duration> {
        self.time_limit.map(|t| Duration::from_secs_f64(t.max(0.0)))
    }

    pub fn total_time_budget(&self) -> Option<Duration> {
        self.total_time_limit
            .map(|t| Duration::from_secs_f64(t.max(0.0)))
    }

    pub fn validate(&self) -> CalResult<()> {
        if let Some(e) = self.epsilon {
            if !e.is_finite() || e < 0.0 {
                return Err(CalError::Config(format!(
                    "epsilon must be a non-negative number, got {}",
                    e
                )));
            }
        }
        for (name, value) in [
            ("time", self.time_limit),
            ("tot-time", self.total_time_limit),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(CalError::Config(format!(
                        "{} must be a non-negative number of seconds, got {}",
                        name, v
                    )));
                }
            }
        }
        if let Some(f) = self.early_stop {
            if !f.is_finite() {
                return Err(CalError::Config("int-fixed must be finite".into()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> CalResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
