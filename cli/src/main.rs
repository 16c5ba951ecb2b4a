mod arg_parser;
mod job_runner;

use arg_parser::{ArgParser, SubCommand};
use job_runner::{load_params, print_summary, JobRunner};
use joblib::config::OrchestratorConfig;

use clap::Parser;
use std::error;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();

    // logs go to stderr so progress output on stdout stays machine readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut config = OrchestratorConfig::load(&args.config)?;

    match args.sub_command {
        SubCommand::Run {
            params,
            timeout_secs,
            max_concurrent,
            envs,
            format,
        } => {
            if let Some(max) = max_concurrent {
                config.scheduler.max_concurrent_jobs = max.max(1);
            }
            config.worker.envs.extend(envs);

            let mut jobs = Vec::with_capacity(params.len());
            for path in params {
                let parameters = load_params(&path)?;
                jobs.push((path, parameters));
            }

            let runner = JobRunner::launch(&config, format);
            let outcomes = runner
                .run(jobs, timeout_secs.map(Duration::from_secs))
                .await?;
            print_summary(&outcomes, format);

            let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
            if failed > 0 {
                return Err(format!("{} of {} jobs did not complete", failed, outcomes.len()).into());
            }
        }
        SubCommand::Validate { params } => {
            for path in params {
                load_params(&path)?;
                println!("{}: ok", path.display());
            }
        }
        SubCommand::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
