use crate::{env::EnvManager, error::CliError, shutdown::ExitCode, shutdown::ShutdownCoordinator};
use clap::Parser;
use commands::Commands;
use engine_config::settings::{
    Config, load_config, overrides::apply_env_overrides, validated::RunSettings,
    validator::SettingsValidator,
};
use engine_processing::integrity::IntegrityChecker;
use engine_runtime::{
    coordinator::RunOptions,
    execution::executor::{self, RunRequest},
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Resumable batch transfer with retries and progress tracking"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Config, environment and validated settings for one invocation.
struct Loaded {
    config: Config,
    settings: RunSettings,
    env: EnvManager,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let code = match dispatch(cli.command, &shutdown).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::GeneralError
        }
    };
    code.into()
}

async fn dispatch(command: Commands, shutdown: &ShutdownCoordinator) -> Result<ExitCode, CliError> {
    match command {
        Commands::Run {
            config,
            target,
            resume,
            clear_checkpoint,
            limit,
            batch_size,
            report,
        } => {
            let loaded = load(&config)?;
            if clear_checkpoint {
                clear_targets(&loaded, target.as_deref()).await?;
                return Ok(ExitCode::Success);
            }

            let options = RunOptions {
                resume: resume || loaded.settings.resume,
                limit,
            };
            run(&loaded, target.as_deref(), options, batch_size, report, shutdown).await
        }
        Commands::Progress {
            config,
            target,
            json,
        } => {
            let loaded = load(&config)?;
            let summary = executor::progress(&loaded.config, &loaded.settings, &target).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                output::print_progress_table(&summary);
            }
            Ok(ExitCode::Success)
        }
        Commands::Clear { config, target } => {
            let loaded = load(&config)?;
            clear_targets(&loaded, Some(&target)).await?;
            Ok(ExitCode::Success)
        }
        Commands::Verify {
            file,
            expected_length,
            require,
        } => {
            let bytes = IntegrityChecker::verify(expected_length, &file, &require).await?;
            println!("{}: verified {bytes} bytes", file.display());
            Ok(ExitCode::Success)
        }
    }
}

fn load(path: &Path) -> Result<Loaded, CliError> {
    let mut env = EnvManager::from_process();
    env.load_beside(path)?;

    let mut config = load_config(path)?;
    apply_env_overrides(&mut config.pipeline, env.all())?;

    let settings = SettingsValidator::new(&config).validate()?;
    Ok(Loaded {
        config,
        settings,
        env,
    })
}

async fn clear_targets(loaded: &Loaded, target: Option<&str>) -> Result<(), CliError> {
    for target in loaded.config.select_targets(target)? {
        executor::clear(&loaded.config, &loaded.settings, &target.name).await?;
        info!(target_name = %target.name, "Progress cleared");
    }
    Ok(())
}

async fn run(
    loaded: &Loaded,
    target: Option<&str>,
    options: RunOptions,
    batch_size: Option<usize>,
    report: Option<PathBuf>,
    shutdown: &ShutdownCoordinator,
) -> Result<ExitCode, CliError> {
    let request = RunRequest {
        config: &loaded.config,
        settings: &loaded.settings,
        env: loaded.env.all(),
        target,
        options,
        batch_size,
    };
    let summary = executor::run(request, shutdown.cancel_token()).await?;

    match &report {
        Some(path) => output::write_report(&summary.reports, path).await?,
        None => output::print_report(&summary.reports)?,
    }

    if let Some(abort) = &summary.aborted {
        error!("{abort}");
    }
    for r in summary.reports.iter().filter(|r| !r.is_success()) {
        if let Some(hint) = &r.hint {
            warn!(target_name = %r.target, "{hint}");
        }
    }

    let code = ExitCode::for_summary(&summary);
    if code == ExitCode::ShutdownRequested || shutdown.is_shutdown_requested() {
        warn!("Shutdown completed; progress saved");
        return Ok(ExitCode::ShutdownRequested);
    }
    Ok(code)
}
