//! Command-line entry point: load a run configuration, execute the
//! requested pipeline, and write the augmented dataset, summary, and state
//! bundle. A non-zero exit and a logged error (with stage name) replace a
//! panic on any pipeline failure.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use plom::config::RunConfig;
use plom::orchestrator::{self, PlomState, RunSummary};
use plom::{io, PlomError};

/// Run a Probabilistic Learning on Manifolds pipeline from a text configuration file.
#[derive(Debug, Parser)]
#[command(name = "plom", version, about)]
struct Cli {
    /// Path to the run configuration file.
    config: PathBuf,

    /// Directory to write the augmented dataset, summary, and state bundle into.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Force verbose (debug-level) logging, overriding the config file's `verbose` key.
    #[arg(long)]
    verbose: bool,

    /// Run only the DMAPS/projection stages, skipping sampling.
    #[arg(long)]
    dmaps_only: bool,

    /// Resume from a previously persisted state bundle instead of re-fitting from `training`;
    /// implies the sampling-only pipeline.
    #[arg(long)]
    resume: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "plom run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), PlomError> {
    let text = fs::read_to_string(&cli.config).map_err(|source| PlomError::Io {
        stage: "cli",
        path: cli.config.clone(),
        source,
    })?;
    let config = RunConfig::parse(&text)?;
    info!(job_desc = %config.job_desc, "configuration loaded");

    fs::create_dir_all(&cli.output_dir).map_err(|source| PlomError::Io {
        stage: "cli",
        path: cli.output_dir.clone(),
        source,
    })?;

    let (state, summary) = if let Some(resume_path) = &cli.resume {
        let mut state: PlomState = io::load_state(resume_path)?;
        let summary = orchestrator::run_sampling_only(&mut state, &config)?;
        (state, summary)
    } else {
        let x = io::load_training(&config.training)?;
        if cli.dmaps_only {
            orchestrator::run_dmaps_only(x.view(), &config)?
        } else {
            orchestrator::run_full(x.view(), &config)?
        }
    };

    write_outputs(cli, &config, &state, &summary)?;
    Ok(())
}

fn write_outputs(cli: &Cli, config: &RunConfig, state: &PlomState, summary: &RunSummary) -> Result<(), PlomError> {
    if let (true, Some(augmented)) = (config.save_samples, &state.augmented) {
        let fname = config.samples_fname.clone().unwrap_or_else(|| format!("{}_samples.txt", config.job_desc));
        let path = cli.output_dir.join(fname);
        io::save_text(&path, augmented)?;
        info!(path = %path.display(), "augmented dataset written");
    }

    let summary_path = cli.output_dir.join(format!("{}_summary.txt", config.job_desc));
    io::write_text_file(&summary_path, &summary.render())?;
    info!(path = %summary_path.display(), "summary written");

    let state_path = cli.output_dir.join(format!("{}_state.bin", config.job_desc));
    io::save_state(&state_path, state)?;
    info!(path = %state_path.display(), "state bundle written");

    Ok(())
}
