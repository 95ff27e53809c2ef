use crate::{
    companion::{SessionSnapshot, SessionState, WalkPlan},
    db::AlertRecord,
    error::{CompanionError, PreconditionError},
    location::Coordinates,
    messages::format_clock,
    settings::WalkDefaults,
};

use crate::AppState;

const HISTORY_LIMIT: u64 = 10;

pub const HELP: &str = "\
Commands:
  start [minutes check-in-minutes] <destination>   start a walk and notify your contact
  safe                                             I'm safe: reset the check-in timer
  distress                                         send a distress signal now
  end                                              end the walk
  ack                                              close the screen after an alert
  status                                           show the current session
  locate [lat lon]                                 refresh (or set) your location
  contact [phone]                                  show (or set) your emergency contact
  defaults [minutes check-in-minutes [grace]]      show (or set) the walk used by a bare 'start'
  history                                          recent messages sent to your contact
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Start {
        walk_minutes: Option<u64>,
        check_in_minutes: Option<u64>,
        destination: String,
    },
    Safe,
    Distress,
    End,
    Acknowledge,
    Status,
    Locate(Option<Coordinates>),
    Contact(Option<String>),
    Defaults(Option<WalkDefaults>),
    History,
    Help,
    Quit,
}

impl HostCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("type 'help' for a list of commands".into());
        };
        let rest: Vec<&str> = words.collect();

        match verb.to_ascii_lowercase().as_str() {
            "start" => Ok(parse_start(&rest)),
            "safe" | "ok" => Ok(HostCommand::Safe),
            "distress" | "sos" => Ok(HostCommand::Distress),
            "end" | "stop" => Ok(HostCommand::End),
            "ack" => Ok(HostCommand::Acknowledge),
            "status" => Ok(HostCommand::Status),
            "locate" => parse_locate(&rest),
            "contact" => Ok(HostCommand::Contact(
                (!rest.is_empty()).then(|| rest.join(" ")),
            )),
            "defaults" => parse_defaults(&rest),
            "history" => Ok(HostCommand::History),
            "help" | "?" => Ok(HostCommand::Help),
            "quit" | "exit" => Ok(HostCommand::Quit),
            other => Err(format!("unknown command '{other}'; type 'help'")),
        }
    }
}

/// Two leading numbers are the walk and check-in minutes. Anything else is
/// the destination, so "start 7 Eleven" walks to "7 Eleven".
fn parse_start(args: &[&str]) -> HostCommand {
    let minutes = |index: usize| args.get(index).and_then(|word| word.parse::<u64>().ok());

    match (minutes(0), minutes(1)) {
        (Some(walk_minutes), Some(check_in_minutes)) => HostCommand::Start {
            walk_minutes: Some(walk_minutes),
            check_in_minutes: Some(check_in_minutes),
            destination: args[2..].join(" "),
        },
        _ => HostCommand::Start {
            walk_minutes: None,
            check_in_minutes: None,
            destination: args.join(" "),
        },
    }
}

fn parse_minutes(word: &str) -> Result<u64, String> {
    word.parse::<u64>()
        .map_err(|_| format!("'{word}' is not a number of minutes"))
}

fn parse_defaults(args: &[&str]) -> Result<HostCommand, String> {
    let defaults = match args {
        [] => return Ok(HostCommand::Defaults(None)),
        [walk, check_in] => WalkDefaults {
            walk_minutes: parse_minutes(walk)?,
            check_in_minutes: parse_minutes(check_in)?,
            grace_minutes: None,
        },
        [walk, check_in, grace] => WalkDefaults {
            walk_minutes: parse_minutes(walk)?,
            check_in_minutes: parse_minutes(check_in)?,
            grace_minutes: Some(parse_minutes(grace)?),
        },
        _ => return Err("usage: defaults [minutes check-in-minutes [grace]]".into()),
    };
    Ok(HostCommand::Defaults(Some(defaults)))
}

fn parse_locate(args: &[&str]) -> Result<HostCommand, String> {
    match args {
        [] => Ok(HostCommand::Locate(None)),
        [lat, lon] => {
            let latitude = lat
                .trim_end_matches(',')
                .parse::<f64>()
                .map_err(|_| format!("'{lat}' is not a latitude"))?;
            let longitude = lon
                .parse::<f64>()
                .map_err(|_| format!("'{lon}' is not a longitude"))?;
            let fix = Coordinates::new(latitude, longitude);
            if !fix.is_valid() {
                return Err("coordinates out of range".into());
            }
            Ok(HostCommand::Locate(Some(fix)))
        }
        _ => Err("usage: locate [lat lon]".into()),
    }
}

pub enum Reply {
    Text(String),
    Quit,
}

pub async fn execute(state: &AppState, command: HostCommand) -> Result<Reply, CompanionError> {
    let text = match command {
        HostCommand::Start {
            walk_minutes,
            check_in_minutes,
            destination,
        } => render_snapshot(&start_walk(state, walk_minutes, check_in_minutes, destination).await?),
        HostCommand::Safe => render_snapshot(&state.controller.confirm_safe()),
        HostCommand::Distress => {
            if state.controller.send_distress_signal() {
                "Distress signal sent to your emergency contact.".to_string()
            } else {
                "No walk in progress; nothing sent.".to_string()
            }
        }
        HostCommand::End => {
            state.controller.end_session();
            "Session ended.".to_string()
        }
        HostCommand::Acknowledge => render_snapshot(&state.controller.acknowledge_alert()),
        HostCommand::Status => render_snapshot(&state.controller.snapshot()),
        HostCommand::Locate(fix) => locate(state, fix).await?,
        HostCommand::Contact(Some(phone)) => {
            state.settings.set_emergency_contact(Some(phone))?;
            format!(
                "Emergency contact saved: {}",
                state.settings.emergency_contact().unwrap_or_default()
            )
        }
        HostCommand::Contact(None) => format!(
            "Your emergency contact: {}",
            state
                .settings
                .emergency_contact()
                .unwrap_or_else(|| "Not Set".to_string())
        ),
        HostCommand::Defaults(Some(walk)) => {
            let mut settings = state.settings.snapshot();
            settings.walk = walk;
            state.settings.update(settings)?;
            render_defaults(&state.settings.snapshot().walk)
        }
        HostCommand::Defaults(None) => render_defaults(&state.settings.snapshot().walk),
        HostCommand::History => render_history(&recent_alerts(state).await?),
        HostCommand::Help => HELP.to_string(),
        HostCommand::Quit => {
            state.controller.end_session();
            return Ok(Reply::Quit);
        }
    };

    Ok(Reply::Text(text))
}

pub async fn start_walk(
    state: &AppState,
    walk_minutes: Option<u64>,
    check_in_minutes: Option<u64>,
    destination: String,
) -> Result<SessionSnapshot, CompanionError> {
    let settings = state.settings.snapshot();
    let walk_seconds = minutes_to_seconds(walk_minutes.unwrap_or(settings.walk.walk_minutes))?;
    let check_in_seconds =
        minutes_to_seconds(check_in_minutes.unwrap_or(settings.walk.check_in_minutes))?;

    let mut plan = WalkPlan::new(destination, walk_seconds, check_in_seconds);
    if let Some(grace_minutes) = settings.walk.grace_minutes {
        plan = plan.with_grace_period(minutes_to_seconds(grace_minutes)?);
    }

    let refresh_error = if state.controller.snapshot().last_known_location.is_none() {
        state.controller.refresh_location().await.err()
    } else {
        None
    };

    match state
        .controller
        .start_session(&plan, settings.emergency_contact.as_deref())
    {
        Ok(snapshot) => Ok(snapshot),
        // say why the fix is missing, not just that it is
        Err(PreconditionError::MissingLocation) => Err(match refresh_error {
            Some(err) => err.into(),
            None => PreconditionError::MissingLocation.into(),
        }),
        Err(err) => Err(err.into()),
    }
}

fn minutes_to_seconds(minutes: u64) -> Result<u64, PreconditionError> {
    minutes
        .checked_mul(60)
        .ok_or(PreconditionError::DurationTooLong)
}

async fn locate(state: &AppState, fix: Option<Coordinates>) -> Result<String, CompanionError> {
    if let Some(fix) = fix {
        state.location.set(fix);
    }

    let fix = state.controller.refresh_location().await?;
    Ok(format!("Location: {},{}", fix.latitude, fix.longitude))
}

pub async fn recent_alerts(state: &AppState) -> Result<Vec<AlertRecord>, CompanionError> {
    Ok(state.db.list_recent_alerts(HISTORY_LIMIT).await?)
}

pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    match snapshot.state {
        SessionState::Inactive => "No walk in progress.".to_string(),
        SessionState::Active => format!(
            "Session Active: heading to {}. Next check-in in {}. Total walk time remaining: {}",
            snapshot.destination,
            format_clock(snapshot.check_in_time_remaining),
            format_clock(snapshot.session_time_remaining)
        ),
        SessionState::GracePeriod => format!(
            "CHECK-IN REQUIRED! Type 'safe' within {} or your contact will be alerted.",
            format_clock(snapshot.check_in_time_remaining)
        ),
        SessionState::AlertSent => {
            "Alert Sent. An emergency alert has been sent to your trusted contact. Type 'ack' to close."
                .to_string()
        }
    }
}

fn render_defaults(walk: &WalkDefaults) -> String {
    let grace = match walk.grace_minutes {
        Some(minutes) => format!("{minutes} min"),
        None => "same as check-in".to_string(),
    };
    format!(
        "Default walk: {} min, check-in every {} min, grace {}",
        walk.walk_minutes, walk.check_in_minutes, grace
    )
}

fn render_history(alerts: &[AlertRecord]) -> String {
    if alerts.is_empty() {
        return "No messages sent yet.".to_string();
    }

    alerts
        .iter()
        .map(|alert| {
            let outcome = match (&alert.error, alert.delivered) {
                (_, true) => "sent".to_string(),
                (Some(error), false) => format!("failed: {error}"),
                (None, false) => "failed".to_string(),
            };
            format!(
                "{}  {:<14} to {}  ({})",
                alert.created_at.format("%Y-%m-%d %H:%M:%S"),
                alert.kind.as_str(),
                alert.recipient,
                outcome
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
