pub mod audio;
pub mod companion;
pub mod db;
pub mod error;
pub mod gateway;
pub mod location;
pub mod messages;
pub mod settings;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, mpsc},
};

use audio::{AlarmCue, LoggedAlarm};
use companion::{
    commands::{execute, render_snapshot, HostCommand, Reply, HELP},
    CompanionEvent, ControllerOptions, SessionState, TickSource, WalkController,
};
use db::Database;
use error::CompanionError;
use gateway::WhatsAppLinkGateway;
use location::{Coordinates, FixedLocationProvider};
use settings::{AlarmSettings, SettingsStore};

pub struct AppState {
    pub controller: WalkController,
    pub settings: SettingsStore,
    pub db: Database,
    pub location: Arc<FixedLocationProvider>,
}

#[derive(Debug, Parser)]
#[command(name = "walksafe", version, about = "Virtual walk companion with check-in alerts")]
pub struct Cli {
    /// Where settings and the alert log are kept
    #[arg(long, env = "WALKSAFE_DATA_DIR", default_value = ".walksafe")]
    pub data_dir: PathBuf,

    /// Starting latitude (the terminal has no GPS)
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    pub lat: Option<f64>,

    /// Starting longitude
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    pub lon: Option<f64>,

    /// Save this number as the emergency contact before starting
    #[arg(long)]
    pub contact: Option<String>,

    /// Length of one countdown second, for demos
    #[arg(long, env = "WALKSAFE_TICK_MS", default_value_t = 1000)]
    pub tick_ms: u64,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("WalkSafe starting up...");

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("failed to create {}", cli.data_dir.display()))?;

    let settings = SettingsStore::new(cli.data_dir.join("settings.json"))?;
    if let Some(contact) = cli.contact {
        settings.set_emergency_contact(Some(contact))?;
    }
    let db = Database::new(cli.data_dir.join("walksafe.sqlite3"))?;

    let (link_tx, mut link_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(link) = link_rx.recv().await {
            println!("\nOpen this link to send the message:\n  {link}\n");
        }
    });

    let initial_fix = match (cli.lat, cli.lon) {
        (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
        _ => None,
    };
    let location = Arc::new(FixedLocationProvider::new(initial_fix));
    let user_settings = settings.snapshot();

    let controller = WalkController::new(
        Arc::new(WhatsAppLinkGateway::new(user_settings.dialing_code.clone(), link_tx)),
        location.clone(),
        build_alarm(&user_settings.alarm),
        ControllerOptions {
            tick_source: TickSource::Interval(Duration::from_millis(cli.tick_ms.max(1))),
            ..ControllerOptions::default()
        },
    )?
    .with_alert_log(db.clone());

    tokio::spawn(print_events(controller.subscribe()));

    if let Err(err) = controller.refresh_location().await {
        warn!("Could not get location ({err}). Use 'locate <lat> <lon>' before starting.");
    }

    let state = AppState {
        controller,
        settings,
        db,
        location,
    };

    println!("Virtual Walk Companion");
    println!(
        "Your emergency contact: {}",
        state
            .settings
            .emergency_contact()
            .unwrap_or_else(|| "Not Set".to_string())
    );
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match HostCommand::parse(&line) {
            Ok(command) => match execute(&state, command).await {
                Ok(Reply::Text(text)) => println!("{text}"),
                Ok(Reply::Quit) => break,
                Err(CompanionError::Location(err)) => {
                    println!("Could not get location ({err}). Use 'locate <lat> <lon>'.")
                }
                Err(err) => println!("Error: {err}"),
            },
            Err(err) => println!("{err}"),
        }
    }

    state.controller.end_session();
    info!("WalkSafe shutting down");
    Ok(())
}

/// Surfaces timer-driven transitions and delivery problems, which happen
/// without a command being typed.
async fn print_events(mut events: broadcast::Receiver<CompanionEvent>) {
    loop {
        match events.recv().await {
            Ok(CompanionEvent::StateChanged(snapshot)) => {
                if matches!(
                    snapshot.state,
                    SessionState::GracePeriod | SessionState::AlertSent
                ) {
                    println!("\n{}", render_snapshot(&snapshot));
                }
            }
            Ok(CompanionEvent::Heartbeat(snapshot)) => println!("{}", render_snapshot(&snapshot)),
            Ok(CompanionEvent::DispatchFailed { kind, error }) => {
                println!("Warning: {} message could not be sent: {}", kind.as_str(), error)
            }
            Ok(CompanionEvent::MessageSent { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("event printer skipped {} events", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn build_alarm(settings: &AlarmSettings) -> Arc<dyn AlarmCue> {
    if !settings.enabled {
        return Arc::new(LoggedAlarm::new());
    }
    audible_alarm(settings)
}

#[cfg(feature = "alarm-audio")]
fn audible_alarm(settings: &AlarmSettings) -> Arc<dyn AlarmCue> {
    Arc::new(audio::AudioEngineHandle::new(settings.volume))
}

#[cfg(not(feature = "alarm-audio"))]
fn audible_alarm(_settings: &AlarmSettings) -> Arc<dyn AlarmCue> {
    Arc::new(LoggedAlarm::with_terminal_bell())
}
