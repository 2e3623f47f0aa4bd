use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use framepipe::cli::{Args, Command};
use framepipe::config::store::ConfigStore;
use framepipe::pipeline::controller::PipelineState;

/// How often the runner checks whether the pipeline stopped on its own.
const STATE_POLL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose, e.g. RUST_LOG=framepipe=trace
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let store = match &args.config {
        Some(path) => Some(Arc::new(ConfigStore::open(path)?)),
        None => None,
    };
    let mut config = store
        .as_ref()
        .map(|store| store.config())
        .unwrap_or_default();
    args.apply(&mut config);

    let mut pipeline = framepipe::build_pipeline(&config)?;
    pipeline.start()?;
    let toggle = pipeline.toggle_handle();
    info!(
        processing = pipeline.is_processing(),
        "type `toggle`, `on`, `off`, `stats` or `quit` and press enter"
    );

    let persist = if args.save { store.clone() } else { None };
    let debounce = persist.as_ref().map(|store| store.start_debounce_task());

    let stats_every = config.stats_interval_secs;
    let period = Duration::from_secs(stats_every.max(1));
    let mut stats_tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut state_poll = tokio::time::interval(STATE_POLL);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("failed to listen for Ctrl-C: {e}");
                }
                info!("interrupted");
                break;
            }
            _ = &mut deadline => {
                info!("run duration reached");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(Command::Stats) => println!("{}", serde_json::to_string_pretty(&pipeline.stats())?),
                    Ok(Command::Toggle) => {
                        toggle.flip();
                        processing_changed(pipeline.is_processing(), persist.as_deref());
                    }
                    Ok(Command::On) => {
                        toggle.set(true);
                        processing_changed(true, persist.as_deref());
                    }
                    Ok(Command::Off) => {
                        toggle.set(false);
                        processing_changed(false, persist.as_deref());
                    }
                    Err(e) => warn!("{e}"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    stdin_open = false;
                }
            },
            _ = stats_tick.tick(), if stats_every > 0 => {
                let stats = pipeline.stats();
                info!(
                    fps = stats.fps,
                    presented = stats.frames_presented,
                    filtered = stats.frames_filtered,
                    dropped = stats.source_drops,
                    latency_ms = stats.latency_ms,
                    "pipeline stats"
                );
            }
            _ = state_poll.tick() => {
                if pipeline.state() == PipelineState::Stopped {
                    warn!("pipeline stopped on its own");
                    break;
                }
            }
        }
    }

    pipeline.stop();
    if let Some(task) = debounce {
        task.abort();
    }
    if let Some(store) = &persist {
        store.flush();
    }
    println!("{}", serde_json::to_string_pretty(&pipeline.stats())?);
    Ok(())
}

/// Log a toggle change and remember it when `--save` is set.
fn processing_changed(enabled: bool, persist: Option<&ConfigStore>) {
    info!(processing = enabled, "processing toggled");
    if let Some(store) = persist {
        store.set_processing(enabled);
    }
}
