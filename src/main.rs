pub mod config;
pub mod host;
pub mod mqtt;
pub mod telemetry;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{AppConfig, Variant};
use crate::host::playback::{FrameOutcome, Playback};
use crate::host::rig::{CoupledPendulums, Rig, RigConfig, SimplePendulum};
use crate::host::HandlerPhase;
use crate::mqtt::broker::RumqttBroker;
use crate::mqtt::credentials::{ConfigSource, SecretsFile};
use crate::mqtt::session::MqttSession;
use crate::telemetry::handler::{PendulumTelemetry, TelemetryProfile, Tracked};
use crate::telemetry::stop_at_end::StopAtEnd;

/// Streams simulated pendulum angles to an MQTT broker, one message per frame.
#[derive(Debug, Parser)]
#[command(name = "pendulum-telemetry", version)]
struct Cli {
    /// Config file (default: <config dir>/pendulum-telemetry/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Broker secrets file (default: ./mqtt_secrets.toml)
    #[arg(long)]
    secrets: Option<PathBuf>,

    /// Override the scene's end frame
    #[arg(long, value_name = "N")]
    frames: Option<i32>,

    /// Run frames back to back instead of at the scene frame rate
    #[arg(long)]
    fast: bool,

    /// Also stop playback on the last frame instead of looping
    #[arg(long)]
    stop_at_end: bool,

    #[arg(value_enum)]
    variant: Variant,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(frames) = cli.frames {
        config.playback.frame_end = frames;
    }
    if cli.fast {
        config.playback.realtime = false;
    }
    config.playback.validate()?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping playback");
                ctrl_c.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    let profile = config.profile(cli.variant);
    let rig = build_rig(profile.as_ref(), &config.rig);
    let mut playback = Playback::create(&config.playback, rig, shutdown);

    if let Some(profile) = profile {
        if config.playback.frame_end < profile.stop_frame {
            warn!(
                "Scene ends at frame {} before the stop frame {}, playback will loop",
                config.playback.frame_end, profile.stop_frame
            );
        }

        let secrets = SecretsFile::locate(cli.secrets.as_deref());
        debug!("Reading broker credentials from {}", secrets.path().display());
        let credentials = secrets.load_or_default();
        if credentials.is_placeholder() {
            warn!("No broker configured, frames will play without telemetry");
        }
        info!(
            "Publishing {} to {}",
            profile.object_names().join(", "),
            profile.topic
        );
        let session = MqttSession::new(RumqttBroker::new(config.mqtt.clone()), credentials);
        let phase = profile.phase;
        playback
            .registry()
            .register(phase, Box::new(PendulumTelemetry::new(profile, session)));
    }

    if cli.stop_at_end || cli.variant == Variant::StopAtEnd {
        playback
            .registry()
            .register(StopAtEnd::PHASE, Box::new(StopAtEnd));
    }

    for phase in [HandlerPhase::Pre, HandlerPhase::Post] {
        debug!("{}: {:?}", phase, playback.registry().registered(phase));
    }

    // Jumping to the start fires frame 1, which opens the broker session.
    let outcome = match playback.frame_set(config.playback.frame_start) {
        FrameOutcome::Continue => {
            let (idle, outcome) = playback.play().run().await;
            playback = idle;
            outcome
        }
        stopped => stopped,
    };
    match outcome {
        FrameOutcome::Cancelled => {
            info!("Playback stopped at frame {}", playback.scene().frame_current)
        }
        FrameOutcome::Finished => info!("Playback finished"),
        FrameOutcome::Continue => {}
    }

    // Detaching closes the broker session and joins its network thread.
    playback.release_handlers();
    Ok(())
}

fn build_rig(profile: Option<&TelemetryProfile>, config: &RigConfig) -> Option<Box<dyn Rig>> {
    let tracked = match profile {
        Some(profile) => &profile.tracked,
        None => return Some(Box::new(SimplePendulum::new("Pendule", config.clone()))),
    };
    match tracked {
        Tracked::Single { object, .. } => {
            Some(Box::new(SimplePendulum::new(object.clone(), config.clone())))
        }
        Tracked::Coupled { first, second } => Some(Box::new(CoupledPendulums::new(
            first.clone(),
            second.clone(),
            config.clone(),
        ))),
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
