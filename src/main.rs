mod cli;
mod config;
mod error;
mod executor;
mod launcher;
mod launchpad;
mod model;
mod store;
mod ui;

use anyhow::{Context, Result, bail};
use clap::Parser;
use console::Term;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::LaunchpadConfig;
use executor::TaskExecutor;
use launcher::{LaunchResult, Launcher};
use launchpad::LaunchPad;
use model::WorkflowSpec;
use store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LaunchpadConfig::load_from(&cli.config)?;
    if let Some(store) = &cli.store {
        config.store_path = store.clone();
    }
    init_tracing(&config.log_level, cli.verbose);

    let store = SqliteStore::open(&config.store_path)
        .await
        .with_context(|| format!("opening store {}", config.store_path.display()))?;
    let lp = LaunchPad::new(store).with_retry(config.retry());

    match cli.command {
        Command::Add { file } => {
            let spec = WorkflowSpec::from_path(&file)
                .with_context(|| format!("loading workflow {}", file.display()))?;
            let id = lp.add_workflow(&spec).await?;
            ui::print_added(id, &spec);
        }
        Command::Status { workflow, json } => {
            let summary = lp.get_workflow_summary(workflow).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                ui::print_summary(&summary);
            }
        }
        Command::List => {
            ui::print_workflows(&lp.list_workflows().await?);
        }
        Command::Job { id } => match lp.get_job(id).await {
            Ok(job) => ui::print_job(&job)?,
            Err(e) if e.is_not_found() => bail!("no job with id {id}"),
            Err(e) => return Err(e.into()),
        },
        Command::Reset { yes } => {
            if !yes {
                bail!("refusing to reset the launch pad without --yes");
            }
            let removed = lp.reset().await?;
            println!("Removed {removed} workflow(s)");
        }
        Command::Singleshot { workflow } => {
            let launcher = launcher(&lp, &config);
            info!(worker = launcher.worker_id(), "singleshot launch");
            match launcher.launch_one(workflow).await? {
                LaunchResult::Launched(report) => ui::print_launch(&report),
                LaunchResult::NothingToRun => println!("Nothing to run."),
            }
        }
        Command::Rapidfire { workflow, max_jobs } => {
            let launcher = launcher(&lp, &config);
            if Term::stdout().is_term() {
                let progress = ui::LaunchProgress::start("rapid-fire: looking for READY jobs");
                let report = launcher
                    .rapidfire_with(workflow, max_jobs, |launch| progress.launched(launch))
                    .await?;
                progress.finish(&report);
            } else {
                let report = launcher.rapidfire(workflow, max_jobs).await?;
                report.launches.iter().for_each(ui::print_launch);
                ui::print_rapidfire(&report);
            }
        }
    }

    Ok(())
}

fn launcher<'a>(
    lp: &'a LaunchPad<SqliteStore>,
    config: &LaunchpadConfig,
) -> Launcher<'a, SqliteStore> {
    Launcher::new(lp.store(), TaskExecutor::new(&config.launch_dir))
        .with_polling(config.poll_interval(), config.max_wait())
}

fn init_tracing(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
