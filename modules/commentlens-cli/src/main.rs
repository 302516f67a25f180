use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commentlens_common::{AnalysisEvent, Config, RunStage};
use commentlens_pipeline::{
    AnalysisOrchestrator, AnalysisService, ContextChange, ContextWatcher, FileLocationProbe,
    LocationProbe, LogSink, PipelineDeps, RunOutcome, Trigger,
};

#[derive(Parser)]
#[command(name = "commentlens", about = "Cluster and summarize YouTube comment sentiment")]
struct Cli {
    /// Backend base URL (overrides COMMENTLENS_BACKEND_URL)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Fixed k-means seed (overrides COMMENTLENS_KMEANS_SEED)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one video and print the result
    Analyze {
        /// Watch-page URL or bare video id
        target: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow navigation from stdin (one location per line, "reanalyze" to
    /// re-run) and print events as they arrive
    Watch {
        /// File holding the current location, polled as a fallback
        #[arg(long)]
        location_file: Option<PathBuf>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results.
    let filter = EnvFilter::from_default_env().add_directive("commentlens=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = Config::from_env()?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(seed) = cli.seed {
        config.kmeans_seed = Some(seed);
    }
    config.validate()?;
    config.log_summary();

    match cli.command {
        Command::Analyze { target, json } => analyze(&config, &target, json).await,
        Command::Watch {
            location_file,
            json,
        } => watch(&config, location_file, json).await,
    }
}

async fn analyze(config: &Config, target: &str, json: bool) -> Result<()> {
    let watcher = Arc::new(ContextWatcher::youtube());
    let orchestrator = AnalysisOrchestrator::from_config(
        config,
        PipelineDeps::from_config(config),
        watcher.clone(),
        Arc::new(LogSink),
    );

    let location = if target.contains("://") {
        target.to_string()
    } else {
        format!("https://www.youtube.com/watch?v={target}")
    };
    let ContextChange::Started { token, context_id } = watcher.observe(&location) else {
        bail!("Could not find a video ID in {target:?}");
    };

    match orchestrator.run(token, &context_id).await {
        RunOutcome::Completed(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{result}");
            }
            Ok(())
        }
        RunOutcome::Failed { reason, message } => bail!("Analysis failed ({reason}): {message}"),
        RunOutcome::Superseded => bail!("Analysis run was superseded"),
    }
}

async fn watch(config: &Config, location_file: Option<PathBuf>, json: bool) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AnalysisEvent>();
    let orchestrator = AnalysisOrchestrator::from_config(
        config,
        PipelineDeps::from_config(config),
        Arc::new(ContextWatcher::youtube()),
        Arc::new(event_tx),
    );
    let service = AnalysisService::new(Arc::new(orchestrator), config.poll_interval);

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event, json);
        }
    });

    let (trigger_tx, trigger_rx) = mpsc::channel(16);
    let probe: Option<Arc<dyn LocationProbe>> = location_file
        .map(|path| Arc::new(FileLocationProbe::new(path)) as Arc<dyn LocationProbe>);
    // With a location file, closing stdin must not stop the watcher.
    let _keepalive = probe.as_ref().map(|_| trigger_tx.clone());

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let trigger = if line.eq_ignore_ascii_case("reanalyze") {
                Trigger::Reanalyze
            } else {
                Trigger::Navigated(line.to_string())
            };
            if trigger_tx.send(trigger).await.is_err() {
                break;
            }
        }
    });

    let interrupted = tokio::select! {
        _ = service.watch(trigger_rx, probe) => false,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            true
        }
    };

    // Dropping the service drops the last event sender, which ends the printer.
    drop(service);
    if interrupted {
        printer.abort();
    } else {
        printer.await?;
    }
    Ok(())
}

fn print_event(event: &AnalysisEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to serialize event"),
        }
        return;
    }
    match event {
        AnalysisEvent::Status { stage, message } if *stage != RunStage::Done => {
            println!("[{stage:?}] {message}")
        }
        AnalysisEvent::Status { .. } => {}
        AnalysisEvent::Completed(result) => println!("{result}"),
        AnalysisEvent::Failed { reason, message } => println!("Failed ({reason}): {message}"),
        AnalysisEvent::Cleared => println!("-- cleared --"),
    }
}
