mod cli;
mod report;

use std::process::ExitCode;

use clap::Parser;
use engine_logging::{engine_debug, LogDestination, DEFAULT_LOG_FILE};
use sitegrab_engine::{EngineHandle, Job, JobId};

use crate::cli::Cli;
use crate::report::Reporter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("sitegrab: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Run every requested job to completion. `Ok(false)` when any job failed.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    if cli.background {
        println!("Continuing in background, output will be written to '{DEFAULT_LOG_FILE}'.");
        engine_logging::initialize(LogDestination::default_file(), cli.log_level());
    } else {
        engine_logging::initialize(LogDestination::Terminal, cli.log_level());
    }

    let urls = cli.collect_urls()?;
    let engine = EngineHandle::new(cli.engine_config()?);
    for (index, url) in urls.iter().enumerate() {
        let job = if cli.mirror {
            Job::Mirror { url: url.clone() }
        } else {
            Job::Download {
                url: url.clone(),
                output_name: cli.output_document.clone(),
            }
        };
        engine_debug!("queueing {job:?}");
        engine.enqueue(index as JobId + 1, job);
    }

    let mut reporter = Reporter::new(cli.background);
    let mut remaining = urls.len();
    let mut all_ok = true;
    while remaining > 0 {
        let Some(event) = engine.recv() else {
            anyhow::bail!("download engine stopped unexpectedly");
        };
        if let Some(ok) = reporter.handle(event) {
            remaining -= 1;
            all_ok &= ok;
        }
    }
    Ok(all_ok)
}
