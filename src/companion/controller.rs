use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    runtime::Handle,
    sync::broadcast,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    audio::AlarmCue,
    db::{AlertRecord, Database},
    error::{CompanionError, LocationUnavailableError, MessageDispatchError, PreconditionError},
    gateway::MessagingGateway,
    location::{self, Coordinates, LocationProvider, DEFAULT_LOCATION_TIMEOUT},
    messages::{MessageKind, OutgoingMessage},
};

use super::{Effect, SafetySession, SessionState, WalkPlan};

const EVENT_CAPACITY: usize = 64;

/// Where ticks come from. `Manual` leaves it to the caller to invoke
/// [`WalkController::tick`], which is how tests drive time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSource {
    Interval(Duration),
    Manual,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub tick_source: TickSource,
    pub location_timeout: Duration,
    pub heartbeat_every_ticks: u32,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        let debug_mode = std::env::var("WALKSAFE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            tick_source: TickSource::Interval(Duration::from_secs(1)),
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            heartbeat_every_ticks: if debug_mode { 1 } else { 30 },
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub destination: String,
    pub total_duration_seconds: u64,
    pub check_in_interval_seconds: u64,
    pub session_time_remaining: u64,
    pub check_in_time_remaining: u64,
    pub alarm_active: bool,
    pub last_known_location: Option<Coordinates>,
}

impl From<&SafetySession> for SessionSnapshot {
    fn from(session: &SafetySession) -> Self {
        Self {
            state: session.state,
            session_id: session.session_id.clone(),
            destination: session.destination.clone(),
            total_duration_seconds: session.total_duration_seconds,
            check_in_interval_seconds: session.check_in_interval_seconds,
            session_time_remaining: session.session_time_remaining,
            check_in_time_remaining: session.check_in_time_remaining,
            alarm_active: session.alarm_active(),
            last_known_location: session.last_known_location,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CompanionEvent {
    StateChanged(SessionSnapshot),
    Heartbeat(SessionSnapshot),
    MessageSent {
        kind: MessageKind,
        recipient: String,
    },
    DispatchFailed {
        kind: MessageKind,
        error: MessageDispatchError,
    },
}

struct TickerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TickerHandle {
    fn stop(self) {
        self.cancel.cancel();
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Owns one walk session at a time. Operations are synchronous: they mutate
/// the session under a short lock and hand messages off to spawned tasks.
#[derive(Clone)]
pub struct WalkController {
    session: Arc<Mutex<SafetySession>>,
    ticker: Arc<Mutex<Option<TickerHandle>>>,
    gateway: Arc<dyn MessagingGateway>,
    location: Arc<dyn LocationProvider>,
    alarm: Arc<dyn AlarmCue>,
    alert_log: Option<Database>,
    events: broadcast::Sender<CompanionEvent>,
    runtime: Handle,
    options: ControllerOptions,
}

impl WalkController {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        location: Arc<dyn LocationProvider>,
        alarm: Arc<dyn AlarmCue>,
        options: ControllerOptions,
    ) -> Result<Self, CompanionError> {
        let runtime = Handle::try_current().map_err(|_| CompanionError::NoRuntime)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            session: Arc::new(Mutex::new(SafetySession::new())),
            ticker: Arc::new(Mutex::new(None)),
            gateway,
            location,
            alarm,
            alert_log: None,
            events,
            runtime,
            options,
        })
    }

    /// Record every outgoing message in `db`.
    pub fn with_alert_log(mut self, db: Database) -> Self {
        self.alert_log = Some(db);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompanionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.lock_session())
    }

    pub fn ticker_active(&self) -> bool {
        self.lock_ticker().is_some()
    }

    pub fn start_session(
        &self,
        plan: &WalkPlan,
        emergency_contact: Option<&str>,
    ) -> Result<SessionSnapshot, PreconditionError> {
        let mut session = self.lock_session();
        let effects = session.start(plan, emergency_contact).map_err(|err| {
            warn!("walk session not started: {}", err);
            err
        })?;

        info!(
            "walk to '{}' started: {}s total, check-in every {}s",
            session.destination, session.total_duration_seconds, session.check_in_interval_seconds
        );

        self.apply(&session, effects);
        let snapshot = SessionSnapshot::from(&*session);
        self.emit(CompanionEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Applies one elapsed second. No-op unless a session is running.
    pub fn tick(&self) -> SessionSnapshot {
        let mut session = self.lock_session();
        self.tick_locked(&mut session)
    }

    pub fn confirm_safe(&self) -> SessionSnapshot {
        self.transition("confirm_safe", SafetySession::confirm_safe)
    }

    /// Returns `false` when no session is running and nothing was sent.
    pub fn send_distress_signal(&self) -> bool {
        let session = self.lock_session();
        let effects = session.distress_signal();
        if effects.is_empty() {
            debug!("distress signal ignored in state {:?}", session.state);
            return false;
        }

        warn!("manual distress signal for walk to '{}'", session.destination);
        self.apply(&session, effects);
        true
    }

    pub fn acknowledge_alert(&self) -> SessionSnapshot {
        self.transition("acknowledge_alert", SafetySession::acknowledge_alert)
    }

    /// Always succeeds. The tick driver and alarm are stopped before this returns.
    pub fn end_session(&self) -> SessionSnapshot {
        self.transition("end_session", SafetySession::end)
    }

    /// Asks the location provider for a fresh fix. Failure leaves the
    /// session and its last known location untouched.
    pub async fn refresh_location(&self) -> Result<Coordinates, LocationUnavailableError> {
        match location::acquire_fix(self.location.as_ref(), self.options.location_timeout).await {
            Ok(fix) => {
                self.lock_session().update_location(fix);
                debug!("location refreshed: {},{}", fix.latitude, fix.longitude);
                Ok(fix)
            }
            Err(err) => {
                warn!("location refresh failed: {}", err);
                Err(err)
            }
        }
    }

    fn transition(
        &self,
        operation: &str,
        op: impl FnOnce(&mut SafetySession) -> Vec<Effect>,
    ) -> SessionSnapshot {
        let mut session = self.lock_session();
        let before = SessionSnapshot::from(&*session);
        let effects = op(&mut *session);

        if before.state != session.state {
            info!("{}: {:?} -> {:?}", operation, before.state, session.state);
        } else if effects.is_empty() {
            debug!("{} in state {:?}", operation, before.state);
        }

        self.apply(&session, effects);
        let snapshot = SessionSnapshot::from(&*session);
        if snapshot != before {
            self.emit(CompanionEvent::StateChanged(snapshot.clone()));
        }
        snapshot
    }

    fn tick_locked(&self, session: &mut SafetySession) -> SessionSnapshot {
        let before = session.state;
        let effects = session.tick();
        let after = session.state;

        if before != after {
            match after {
                SessionState::GracePeriod => warn!(
                    "check-in missed on walk to '{}'; grace period of {}s started",
                    session.destination, session.check_in_time_remaining
                ),
                SessionState::AlertSent => error!(
                    "grace period exhausted on walk to '{}'; sending automatic alert",
                    session.destination
                ),
                SessionState::Inactive => info!("walk duration elapsed; session complete"),
                SessionState::Active => {}
            }
        }

        self.apply(session, effects);
        let snapshot = SessionSnapshot::from(&*session);
        if before != after {
            self.emit(CompanionEvent::StateChanged(snapshot.clone()));
        }
        snapshot
    }

    /// Runs while the session lock is held, so ticker and alarm changes are
    /// atomic with the transition that requested them.
    fn apply(&self, session: &SafetySession, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(message) => {
                    self.dispatch(session.session_id.clone().unwrap_or_default(), message)
                }
                Effect::StartAlarm => {
                    if let Err(e) = self.alarm.start() {
                        error!("Failed to start alarm: {}", e);
                    }
                }
                Effect::StopAlarm => {
                    if let Err(e) = self.alarm.stop() {
                        error!("Failed to stop alarm: {}", e);
                    }
                }
                Effect::StartTicker => self.spawn_ticker(),
                Effect::StopTicker => self.cancel_ticker(),
            }
        }
    }

    fn dispatch(&self, session_id: String, message: OutgoingMessage) {
        let gateway = self.gateway.clone();
        let alert_log = self.alert_log.clone();
        let events = self.events.clone();

        self.runtime.spawn(async move {
            let result = gateway.send(&message.recipient, &message.body).await;

            let error = match &result {
                Ok(()) => {
                    info!("{} message sent to {}", message.kind.as_str(), message.recipient);
                    let _ = events.send(CompanionEvent::MessageSent {
                        kind: message.kind,
                        recipient: message.recipient.clone(),
                    });
                    None
                }
                Err(err) => {
                    warn!("{} message to {} failed: {}", message.kind.as_str(), message.recipient, err);
                    let _ = events.send(CompanionEvent::DispatchFailed {
                        kind: message.kind,
                        error: err.clone(),
                    });
                    Some(err.to_string())
                }
            };

            if let Some(db) = alert_log {
                let record = AlertRecord {
                    id: Uuid::new_v4().to_string(),
                    session_id,
                    kind: message.kind,
                    recipient: message.recipient,
                    body: message.body,
                    latitude: message.location.map(|fix| fix.latitude),
                    longitude: message.location.map(|fix| fix.longitude),
                    delivered: result.is_ok(),
                    error,
                    created_at: Utc::now(),
                };
                if let Err(e) = db.insert_alert(&record).await {
                    error!("Failed to record alert: {:#}", e);
                }
            }
        });
    }

    fn spawn_ticker(&self) {
        let mut ticker_guard = self.lock_ticker();
        if let Some(previous) = ticker_guard.take() {
            previous.stop();
        }

        let cancel = CancellationToken::new();
        let task = match self.options.tick_source {
            TickSource::Manual => None,
            TickSource::Interval(period) => {
                let controller = self.clone();
                let token = cancel.clone();
                let heartbeat_every = self.options.heartbeat_every_ticks.max(1);

                Some(self.runtime.spawn(async move {
                    let mut interval = time::interval_at(Instant::now() + period, period);
                    // A late wake-up counts as one tick, never as a backlog.
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    let mut ticks: u32 = 0;

                    loop {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = interval.tick() => {
                                let snapshot = {
                                    let mut session = controller.lock_session();
                                    // end_session cancels under this lock
                                    if token.is_cancelled() {
                                        break;
                                    }
                                    controller.tick_locked(&mut session)
                                };

                                if !snapshot.state.is_ticking() {
                                    break;
                                }

                                ticks = ticks.wrapping_add(1);
                                if ticks % heartbeat_every == 0 {
                                    debug!(
                                        "heartbeat: {:?}, {}s to check-in, {}s of walk left",
                                        snapshot.state,
                                        snapshot.check_in_time_remaining,
                                        snapshot.session_time_remaining
                                    );
                                    controller.emit(CompanionEvent::Heartbeat(snapshot));
                                }
                            }
                        }
                    }
                }))
            }
        };

        *ticker_guard = Some(TickerHandle { cancel, task });
    }

    fn cancel_ticker(&self) {
        if let Some(handle) = self.lock_ticker().take() {
            handle.stop();
        }
    }

    fn emit(&self, event: CompanionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn lock_session(&self) -> MutexGuard<'_, SafetySession> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_ticker(&self) -> MutexGuard<'_, Option<TickerHandle>> {
        match self.ticker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
