/// Segue Demo - crossfades through a queue using simulated players
use anyhow::Context;
use clap::Parser;
use segue_core::{MediaReference, RemoteProtocol};
use segue_playback::{
    EngineFactory, FadeCurve, Orchestrator, PlaybackEvent, QueueEntry, TransitionSettings,
};
use segue_source::MediaResolver;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod simulated;

use config::AppConfig;
use simulated::{ConsoleFocus, EmptyCache, LoopbackProxy, SimulatedFactory, StaticConnectivity};

#[derive(Parser)]
#[command(name = "segue-demo")]
#[command(about = "Crossfade through a queue with the Segue dual-slot engine", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SEGUE_CONFIG")]
    config: Option<PathBuf>,

    /// Fade duration in milliseconds (defaults to the configured transition)
    #[arg(long)]
    fade_ms: Option<u32>,

    /// Fade curve: linear, ease-in, ease-out, s-curve or equal-power
    #[arg(long, value_parser = parse_curve)]
    curve: Option<FadeCurve>,

    /// How long each track plays before the next transition starts
    #[arg(long, default_value_t = 4000)]
    play_ms: u64,

    /// Simulate a device without connectivity
    #[arg(long)]
    offline: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Tracks to play: file paths, `cloud:<id>` or `im:<id>`
    #[arg(required = true)]
    tracks: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segue_demo=info,segue_playback=info,segue_source=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if cli.offline {
        config.simulation.online = false;
    }

    let settings = transition_settings(&config, &cli);
    let entries: Vec<QueueEntry> = cli
        .tracks
        .iter()
        .map(|track| QueueEntry::from_reference(parse_reference(track)))
        .collect();

    tracing::info!("Starting Segue demo");
    tracing::info!("Tracks: {}", entries.len());
    tracing::info!(
        "Fade: {} ms ({} / {})",
        settings.duration_ms,
        settings.curve_in.display_name(),
        settings.curve_out.display_name()
    );

    let orchestrator = build_orchestrator(&config)?;
    let printer = tokio::spawn(print_events(orchestrator.subscribe(), cli.json));

    orchestrator.add_swap_listener(|master| {
        tracing::info!(slot = %master.slot, media = ?master.media_id, "Now playing");
    });

    run(&orchestrator, entries, settings, Duration::from_millis(cli.play_ms)).await?;

    orchestrator.shutdown().await?;
    printer.abort();
    tracing::info!("Demo finished");
    Ok(())
}

fn build_orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let cache = Arc::new(EmptyCache::new(std::env::temp_dir().join("segue-cache")));
    let connectivity = Arc::new(StaticConnectivity::new(config.simulation.online));
    let proxy = Arc::new(LoopbackProxy::new(8090));

    let resolver = MediaResolver::builder(cache, connectivity)
        .proxy(RemoteProtocol::CloudDrive, proxy.clone())
        .proxy(RemoteProtocol::ImAttachment, proxy)
        .config(config.resolver.clone())
        .build();

    let factory: Arc<dyn EngineFactory> =
        Arc::new(SimulatedFactory::new(config.simulation.clone()));

    Orchestrator::spawn(
        config.engine.clone(),
        factory,
        Arc::new(resolver),
        Box::new(ConsoleFocus),
    )
    .context("failed to start orchestrator")
}

/// Play the first entry, then crossfade into each following one
async fn run(
    orchestrator: &Orchestrator,
    entries: Vec<QueueEntry>,
    settings: TransitionSettings,
    play_for: Duration,
) -> anyhow::Result<()> {
    let upcoming: Vec<MediaReference> = entries
        .iter()
        .skip(1)
        .map(|entry| entry.reference.clone())
        .collect();

    orchestrator.set_queue(entries, 0, Duration::ZERO).await?;
    orchestrator.play().await?;

    let mut snapshots = orchestrator.watch_snapshot();
    for reference in upcoming {
        tokio::time::sleep(play_for).await;

        let media = reference.media_id();
        if let Err(e) = orchestrator.prepare_next(reference, Duration::ZERO).await {
            tracing::warn!(%media, error = %e, "Skipping track");
            continue;
        }
        match orchestrator.begin_transition(settings).await {
            Ok(master) => tracing::info!(slot = %master.slot, "Crossfade running"),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(%media, error = %e, "Crossfade aborted");
                continue;
            }
        }

        snapshots
            .wait_for(|snapshot| !snapshot.transition.is_running())
            .await
            .context("orchestrator stopped")?;
    }

    tokio::time::sleep(play_for).await;
    let position = orchestrator.position().await?;
    tracing::info!("Last track position: {:.1}s", position.as_secs_f64());
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<PlaybackEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Could not serialize event"),
            },
            Ok(event) => println!("event: {event:?}"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn transition_settings(config: &AppConfig, cli: &Cli) -> TransitionSettings {
    let mut settings = config.engine.default_transition;
    if let Some(duration_ms) = cli.fade_ms {
        settings.duration_ms = duration_ms;
    }
    if let Some(curve) = cli.curve {
        settings.curve_in = curve;
        settings.curve_out = curve;
    }
    settings
}

fn parse_reference(track: &str) -> MediaReference {
    if let Some(id) = track.strip_prefix("cloud:") {
        MediaReference::remote(RemoteProtocol::CloudDrive, id)
    } else if let Some(id) = track.strip_prefix("im:") {
        MediaReference::remote(RemoteProtocol::ImAttachment, id)
    } else {
        MediaReference::local(track)
    }
}

fn parse_curve(value: &str) -> Result<FadeCurve, String> {
    match value.to_ascii_lowercase().as_str() {
        "linear" => Ok(FadeCurve::Linear),
        "ease-in" | "ease_in" => Ok(FadeCurve::EaseIn),
        "ease-out" | "ease_out" => Ok(FadeCurve::EaseOut),
        "s-curve" | "s_curve" | "scurve" => Ok(FadeCurve::SCurve),
        "equal-power" | "equal_power" => Ok(FadeCurve::EqualPower),
        other => Err(format!("unknown curve '{other}'")),
    }
}
