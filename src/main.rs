// src/main.rs - printfleet command line
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fleet_shared::{FleetConfig, load_config};
use printfleet_rs::accounting::update_print_time_totals_now;
use printfleet_rs::discovery::{ScanConfig, Scanner};
use printfleet_rs::poller::StatusPoller;
use printfleet_rs::print_job::{InMemoryPrintJobLog, PrintJobSink};
use printfleet_rs::upload::pending::PendingUploads;
use printfleet_rs::upload::{PrintSubmitter, SubmitOutcome, UploadDispatcher};
use serde::Serialize;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Parser)]
#[command(name = "printfleet")]
#[command(about = "Status, discovery and uploads for a fleet of networked 3D printers", long_about = None)]
struct Cli {
    /// Fleet configuration file
    #[arg(short, long, default_value = "fleet.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every printer once and print the status map
    Status {
        /// Skip smart plug queries
        #[arg(long)]
        no_plug: bool,
    },
    /// Query the smart plug of every printer that has one
    Plugs {
        /// Report power and energy instead of on/off state
        #[arg(long)]
        energy: bool,
    },
    /// Scan the local network for printers and plugs
    Scan,
    /// Upload a file to a printer and start printing it
    Upload {
        /// Printer id from the configuration
        #[arg(short, long)]
        printer: i64,
        /// G-code file to upload
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long, default_value = "cli")]
        user: String,
        /// Print-via tag recorded with the job
        #[arg(long)]
        via: Option<String>,
        /// Keep polling until an unconfirmed upload is settled
        #[arg(long)]
        follow: bool,
    },
    /// Poll continuously, reconcile uploads and account print time
    Watch {
        /// Write updated printer records here after every cycle
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct UploadReport<'a> {
    success: bool,
    reason: &'a str,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.to_string_lossy().into_owned();
    tracing::info!("Loading configuration from: {}", config_path);
    let mut config = load_config(&config_path).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", config_path, e);
        Box::new(e) as BoxError
    })?;
    tracing::info!("{} printers configured", config.printers.len());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Status { no_plug } => {
            let poller = StatusPoller::http(&config.settings)?;
            let statuses = poller.collect(&config.printers, !no_plug, &cancel).await;
            print_json(&statuses.into_iter().collect::<BTreeMap<_, _>>())?;
        }
        Commands::Plugs { energy } => {
            let poller = StatusPoller::http(&config.settings)?;
            if energy {
                let readings = poller.collect_plug_energy(&config.printers, &cancel).await;
                print_json(&readings.into_iter().collect::<BTreeMap<_, _>>())?;
            } else {
                let plugs = poller.collect_plug_statuses(&config.printers, &cancel).await;
                print_json(&plugs.into_iter().collect::<BTreeMap<_, _>>())?;
            }
        }
        Commands::Scan => {
            let scanner = Scanner::new(ScanConfig::from_settings(&config.settings))?;
            let devices = scanner.scan(&cancel).await;
            print_json(&devices)?;
        }
        Commands::Upload { printer, file, user, via, follow } => {
            let record = config
                .printers
                .iter()
                .find(|p| p.id == printer)
                .cloned()
                .ok_or_else(|| format!("no printer with id {}", printer))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| format!("not a file: {}", file.display()))?;
            let content = tokio::fs::read(&file).await?;

            let poller = StatusPoller::http(&config.settings)?;
            let sink = Arc::new(InMemoryPrintJobLog::new());
            let pending = PendingUploads::new();
            let submitter = PrintSubmitter::new(
                UploadDispatcher::new(&config.settings)?,
                poller.source(),
                pending.clone(),
                sink.clone(),
            );
            let outcome = submitter
                .submit(&record, &filename, content, &user, via.as_deref())
                .await;
            print_json(&UploadReport {
                success: outcome.success(),
                reason: outcome.reason(),
            })?;
            if let SubmitOutcome::Pending(_) = outcome {
                if follow {
                    run_watch(&mut config, &poller, &pending, sink.as_ref(), None, &cancel, true).await?;
                } else {
                    tracing::warn!("Print start of {} not confirmed; rerun with --follow to wait for it", filename);
                }
            }
        }
        Commands::Watch { state } => {
            let poller = StatusPoller::http(&config.settings)?;
            let sink = InMemoryPrintJobLog::new();
            let pending = PendingUploads::new();
            run_watch(&mut config, &poller, &pending, &sink, state.as_deref(), &cancel, false).await?;
        }
    }
    Ok(())
}

/// Poll, reconcile, account, persist; once per poll interval until cancelled.
async fn run_watch(
    config: &mut FleetConfig,
    poller: &StatusPoller,
    pending: &PendingUploads,
    sink: &dyn PrintJobSink,
    state: Option<&Path>,
    cancel: &CancellationToken,
    until_settled: bool,
) -> Result<(), BoxError> {
    let mut ticker = tokio::time::interval(config.settings.poll_interval());
    let mut plug_ticker = config.settings.plug_poll_interval().map(tokio::time::interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick(&mut plug_ticker) => {
                let readings = poller.collect_plug_energy(&config.printers, cancel).await;
                for (id, reading) in readings {
                    tracing::info!(printer = id, power_w = ?reading.power_w, today_wh = ?reading.today_wh, error = ?reading.error, "plug energy");
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let statuses = poller.collect(&config.printers, true, cancel).await;
        for job in pending.reconcile(&statuses, sink).await {
            tracing::info!("Print job {} recorded for {}", job.gcode_filename, job.printer_name);
        }
        let summary = update_print_time_totals_now(&mut config.printers, &statuses);
        tracing::info!(
            "Print time today {:.0}s, total {:.0}s across {} printers",
            summary.today_seconds,
            summary.total_seconds,
            config.printers.len()
        );
        if let Some(path) = state {
            save_state(path, config)?;
        }
        if until_settled && pending.is_empty().await {
            break;
        }
    }
    Ok(())
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn save_state(path: &Path, config: &FleetConfig) -> Result<(), BoxError> {
    let contents = toml::to_string(config)?;
    std::fs::write(path, contents)?;
    tracing::debug!("Saved printer state to {}", path.display());
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
