mod config;
mod view;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use whoall_logs::{
    BatchReport, ChangeNotifier, DirtySignal, IngestLoop, LogParser, LogTail, PlayerFilter,
    PlayerStore,
};

use crate::config::AppConfig;

/// whoall - Tails an EverQuest log and lists the players seen in recent /who results
#[derive(Parser, Debug)]
#[command(name = "whoall")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log file to tail (overrides the config file)
    #[arg(value_name = "LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Config file (defaults to $WHOALL_CONFIG, then ./whoall.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// How often to check for log changes, in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Read the log every N polls even without a change notification
    #[arg(long)]
    fallback_poll_ticks: Option<u32>,

    /// Write a JSON snapshot of every known player here on exit
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Lowest level to show (needs --level-end)
    #[arg(long)]
    level_start: Option<u32>,

    /// Highest level to show (needs --level-start)
    #[arg(long)]
    level_end: Option<u32>,

    /// Exact class name, e.g. "Shadow Knight"
    #[arg(long)]
    class: Option<String>,

    /// Name substring
    #[arg(long)]
    name: Option<String>,

    /// Exact race, e.g. "Dark Elf"
    #[arg(long)]
    race: Option<String>,

    /// Zone substring
    #[arg(long)]
    zone: Option<String>,

    /// Guild substring
    #[arg(long)]
    guild: Option<String>,

    /// Only show players looking for a group
    #[arg(long)]
    lfg: bool,
}

impl Args {
    /// Command-line values win over the config file
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(log_path) = &self.log_path {
            config.log_path = Some(log_path.clone());
        }
        if let Some(poll_ms) = self.poll_ms {
            config.poll_interval_ms = poll_ms;
        }
        if let Some(ticks) = self.fallback_poll_ticks {
            config.fallback_poll_ticks = Some(ticks);
        }
        if let Some(export) = &self.export {
            config.export_path = Some(export.clone());
        }

        let filter = &mut config.filter;
        if self.level_start.is_some() {
            filter.level_start = self.level_start;
        }
        if self.level_end.is_some() {
            filter.level_end = self.level_end;
        }
        for (target, value) in [
            (&mut filter.class, &self.class),
            (&mut filter.name, &self.name),
            (&mut filter.race, &self.race),
            (&mut filter.zone, &self.zone),
            (&mut filter.guild, &self.guild),
        ] {
            if value.is_some() {
                target.clone_from(value);
            }
        }
        filter.lfg |= self.lfg;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Table goes to stdout, diagnostics to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the application
    let result = run_app(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.normalize();
    config.validate()?;

    let log_path = config
        .log_path
        .clone()
        .context("no log file configured")?;
    let filter = config.filter.to_filter();

    // Shared ingestion context
    let signal = DirtySignal::new();
    let store = PlayerStore::with_window(config.freshness_window());

    // Without change notifications nothing is ever read, so this is fatal
    let notifier = ChangeNotifier::watch(&log_path, signal.clone())
        .with_context(|| format!("cannot monitor {}", log_path.display()))?;

    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<BatchReport>();
    let ingest = IngestLoop::new(
        LogTail::at_end(&log_path),
        LogParser::with_window(config.freshness_window()),
        store.clone(),
        signal,
        config.ingest_config(),
    )
    .with_reports(report_tx);

    let cancel = CancellationToken::new();
    let ingest_task = tokio::spawn(ingest.run(cancel.clone()));

    tracing::info!(log_path = %log_path.display(), "Monitoring started");

    // Main event loop
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    tracing::warn!(%error, "Failed to listen for Ctrl-C");
                }
                break;
            }

            Some(report) = report_rx.recv() => {
                if report.applied() > 0 {
                    show_players(&store, &filter);
                }
            }
        }
    }

    // Let any in-flight batch finish before tearing down the watcher
    cancel.cancel();
    if let Err(error) = ingest_task.await {
        tracing::error!(%error, "Ingestion task failed");
    }
    notifier.stop();

    if let Some(export_path) = &config.export_path {
        let count = view::write_export(&store, export_path)?;
        tracing::info!(export_path = %export_path.display(), players = count, "Wrote snapshot");
    }

    Ok(())
}

fn show_players(store: &PlayerStore, filter: &PlayerFilter) {
    let rows = store.query_rows(filter, Local::now().naive_local());
    print!("{}", view::render_rows(&rows));
    println!();
}
