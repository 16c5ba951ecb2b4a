use clap::{ArgEnum, Parser, Subcommand};
use std::path::PathBuf;

/// Run DXF export jobs through the job orchestrator
#[derive(Debug, Parser)]
#[clap(name = "jobctl")]
pub struct ArgParser {
    /// Path of the orchestrator config file
    #[clap(
        short = 'c',
        long = "config",
        env = "JOBCTL_CONFIG",
        default_value = "jobs.toml"
    )]
    pub config: PathBuf,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// submit jobs and follow them until they finish
    Run {
        /// JSON files with the job parameters, one job per file
        #[clap(required = true, multiple_values = true)]
        params: Vec<PathBuf>,

        #[clap(long)]
        /// cancel any job still unfinished after this many seconds
        timeout_secs: Option<u64>,

        #[clap(long)]
        /// override scheduler.max_concurrent_jobs
        max_concurrent: Option<usize>,

        #[clap(long = "env", multiple_occurrences = true, parse(try_from_str = var_eq_val))]
        /// extra environment variables for the worker
        envs: Vec<(String, String)>,

        #[clap(long, arg_enum, default_value = "text")]
        /// how to print progress
        format: OutputFormat,
    },
    /// check job parameter files without running anything
    Validate {
        #[clap(required = true, multiple_values = true)]
        params: Vec<PathBuf>,
    },
    /// print the effective configuration
    Config,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ArgEnum)]
pub enum OutputFormat {
    /// one readable line per update
    Text,
    /// one JSON object per update
    Json,
}

/// try_from_str parse function for worker env variables
fn var_eq_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((var, val)) if !var.is_empty() => Ok((var.to_string(), val.to_string())),
        _ => Err("Required format is VAR=VAL".to_string()),
    }
}
