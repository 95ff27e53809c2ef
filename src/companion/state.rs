use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::PreconditionError,
    location::Coordinates,
    messages::{self, MessageKind, OutgoingMessage},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Inactive,
    Active,
    GracePeriod,
    AlertSent,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Inactive
    }
}

impl SessionState {
    /// States in which the tick driver runs.
    pub fn is_ticking(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::GracePeriod)
    }
}

/// What the user asked for when starting a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkPlan {
    pub destination: String,
    pub total_duration_seconds: u64,
    pub check_in_interval_seconds: u64,
    /// Length of the window after a missed check-in. Defaults to the
    /// check-in interval.
    #[serde(default)]
    pub grace_period_seconds: Option<u64>,
}

impl WalkPlan {
    pub fn new(destination: impl Into<String>, total_seconds: u64, check_in_seconds: u64) -> Self {
        Self {
            destination: destination.into(),
            total_duration_seconds: total_seconds,
            check_in_interval_seconds: check_in_seconds,
            grace_period_seconds: None,
        }
    }

    pub fn with_grace_period(mut self, seconds: u64) -> Self {
        self.grace_period_seconds = Some(seconds);
        self
    }
}

/// Side effects requested by a transition. The controller executes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(OutgoingMessage),
    StartAlarm,
    StopAlarm,
    StartTicker,
    StopTicker,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SafetySession {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub destination: String,
    pub total_duration_seconds: u64,
    pub check_in_interval_seconds: u64,
    pub grace_period_seconds: u64,
    pub session_time_remaining: u64,
    pub check_in_time_remaining: u64,
    pub emergency_contact: Option<String>,
    pub last_known_location: Option<Coordinates>,
}

impl Default for SafetySession {
    fn default() -> Self {
        Self {
            state: SessionState::Inactive,
            session_id: None,
            destination: String::new(),
            total_duration_seconds: 0,
            check_in_interval_seconds: 0,
            grace_period_seconds: 0,
            session_time_remaining: 0,
            check_in_time_remaining: 0,
            emergency_contact: None,
            last_known_location: None,
        }
    }
}

impl SafetySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarm_active(&self) -> bool {
        self.state == SessionState::GracePeriod
    }

    /// Records a fresh fix. Allowed in every state.
    pub fn update_location(&mut self, fix: Coordinates) {
        self.last_known_location = Some(fix);
    }

    pub fn start(
        &mut self,
        plan: &WalkPlan,
        emergency_contact: Option<&str>,
    ) -> Result<Vec<Effect>, PreconditionError> {
        if self.state != SessionState::Inactive {
            return Err(PreconditionError::SessionInProgress);
        }

        let destination = plan.destination.trim();
        if destination.is_empty() {
            return Err(PreconditionError::MissingDestination);
        }
        if plan.total_duration_seconds == 0 {
            return Err(PreconditionError::InvalidDuration);
        }
        let interval = plan.check_in_interval_seconds;
        if interval == 0 {
            return Err(PreconditionError::InvalidCheckInInterval);
        }
        let grace = plan.grace_period_seconds.unwrap_or(interval);
        if grace == 0 || grace > interval {
            return Err(PreconditionError::InvalidGracePeriod { interval });
        }
        let contact = emergency_contact
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(PreconditionError::MissingEmergencyContact)?;
        let fix = self
            .last_known_location
            .ok_or(PreconditionError::MissingLocation)?;

        *self = Self {
            state: SessionState::Active,
            session_id: Some(Uuid::new_v4().to_string()),
            destination: destination.to_string(),
            total_duration_seconds: plan.total_duration_seconds,
            check_in_interval_seconds: interval,
            grace_period_seconds: grace,
            session_time_remaining: plan.total_duration_seconds,
            check_in_time_remaining: interval,
            emergency_contact: Some(contact.to_string()),
            last_known_location: Some(fix),
        };

        let start_message = self.compose(
            MessageKind::SessionStart,
            messages::session_start(&self.destination, self.total_duration_seconds, &fix),
        );

        Ok(vec![Effect::Send(start_message), Effect::StartTicker])
    }

    /// Applies one elapsed second.
    pub fn tick(&mut self) -> Vec<Effect> {
        if !self.state.is_ticking() {
            return Vec::new();
        }

        self.session_time_remaining = self.session_time_remaining.saturating_sub(1);
        self.check_in_time_remaining = self.check_in_time_remaining.saturating_sub(1);

        match self.state {
            SessionState::Active if self.session_time_remaining == 0 => self.reset(),
            SessionState::Active if self.check_in_time_remaining == 0 => {
                self.state = SessionState::GracePeriod;
                self.check_in_time_remaining = self.grace_period_seconds;
                vec![Effect::StartAlarm]
            }
            SessionState::GracePeriod if self.check_in_time_remaining == 0 => {
                self.state = SessionState::AlertSent;
                let alert = self.compose(
                    MessageKind::AutomaticAlert,
                    messages::automatic_alert(&self.destination, self.last_known_location.as_ref()),
                );
                vec![Effect::StopAlarm, Effect::StopTicker, Effect::Send(alert)]
            }
            _ => Vec::new(),
        }
    }

    pub fn confirm_safe(&mut self) -> Vec<Effect> {
        match self.state {
            SessionState::Active => {
                self.check_in_time_remaining = self.check_in_interval_seconds;
                Vec::new()
            }
            SessionState::GracePeriod => {
                self.check_in_time_remaining = self.check_in_interval_seconds;
                self.state = SessionState::Active;
                vec![Effect::StopAlarm]
            }
            SessionState::Inactive | SessionState::AlertSent => Vec::new(),
        }
    }

    pub fn distress_signal(&self) -> Vec<Effect> {
        if !self.state.is_ticking() {
            return Vec::new();
        }
        let message = self.compose(
            MessageKind::Distress,
            messages::distress(&self.destination, self.last_known_location.as_ref()),
        );
        vec![Effect::Send(message)]
    }

    pub fn acknowledge_alert(&mut self) -> Vec<Effect> {
        if self.state != SessionState::AlertSent {
            return Vec::new();
        }
        self.reset()
    }

    /// Valid from every state.
    pub fn end(&mut self) -> Vec<Effect> {
        self.reset()
    }

    /// Back to `Inactive`. The last fix survives so the next walk can start
    /// without waiting for a new one.
    fn reset(&mut self) -> Vec<Effect> {
        let was_alarming = self.alarm_active();
        let was_ticking = self.state.is_ticking();
        let last_known_location = self.last_known_location;

        *self = Self {
            last_known_location,
            ..Self::default()
        };

        let mut effects = Vec::new();
        if was_alarming {
            effects.push(Effect::StopAlarm);
        }
        if was_ticking {
            effects.push(Effect::StopTicker);
        }
        effects
    }

    fn compose(&self, kind: MessageKind, body: String) -> OutgoingMessage {
        OutgoingMessage {
            kind,
            recipient: self.emergency_contact.clone().unwrap_or_default(),
            body,
            location: self.last_known_location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located() -> SafetySession {
        let mut session = SafetySession::new();
        session.update_location(Coordinates::new(-17.78, 31.05));
        session
    }

    fn started(total: u64, interval: u64) -> SafetySession {
        let mut session = located();
        session
            .start(&WalkPlan::new("Library", total, interval), Some("0771234567"))
            .unwrap();
        session
    }

    fn tick_n(session: &mut SafetySession, n: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        for _ in 0..n {
            effects.extend(session.tick());
        }
        effects
    }

    fn sent_kinds(effects: &[Effect]) -> Vec<MessageKind> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send(message) => Some(message.kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_arms_both_countdowns() {
        let mut session = located();
        let effects = session
            .start(&WalkPlan::new("Library", 600, 300), Some("0771234567"))
            .unwrap();

        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.session_time_remaining, 600);
        assert_eq!(session.check_in_time_remaining, 300);
        assert!(session.session_id.is_some());
        assert_eq!(sent_kinds(&effects), vec![MessageKind::SessionStart]);
        assert!(effects.contains(&Effect::StartTicker));
    }

    #[test]
    fn start_message_goes_to_the_emergency_contact() {
        let mut session = located();
        let effects = session
            .start(&WalkPlan::new("  Library  ", 1800, 300), Some(" 0771234567 "))
            .unwrap();

        let Some(Effect::Send(message)) = effects.first() else {
            panic!("expected start message first, got {effects:?}");
        };
        assert_eq!(message.recipient, "0771234567");
        assert!(message.body.contains("30-minute walk to Library."));
        assert_eq!(session.destination, "Library");
    }

    #[test]
    fn start_rejects_each_missing_field() {
        let contact = Some("0771234567");
        let cases = [
            (WalkPlan::new("   ", 600, 300), contact, PreconditionError::MissingDestination),
            (WalkPlan::new("Library", 0, 300), contact, PreconditionError::InvalidDuration),
            (WalkPlan::new("Library", 600, 0), contact, PreconditionError::InvalidCheckInInterval),
            (WalkPlan::new("Library", 600, 300), None, PreconditionError::MissingEmergencyContact),
            (WalkPlan::new("Library", 600, 300), Some(""), PreconditionError::MissingEmergencyContact),
            (
                WalkPlan::new("Library", 600, 300).with_grace_period(301),
                contact,
                PreconditionError::InvalidGracePeriod { interval: 300 },
            ),
        ];

        for (plan, contact, expected) in cases {
            let mut session = located();
            assert_eq!(session.start(&plan, contact), Err(expected));
            assert_eq!(session.state, SessionState::Inactive);
        }
    }

    #[test]
    fn start_without_location_fix_fails() {
        let mut session = SafetySession::new();
        let err = session
            .start(&WalkPlan::new("Library", 600, 300), Some("0771234567"))
            .unwrap_err();
        assert_eq!(err, PreconditionError::MissingLocation);
        assert_eq!(session.state, SessionState::Inactive);
    }

    #[test]
    fn start_refused_while_session_running() {
        let mut session = started(600, 300);
        let err = session
            .start(&WalkPlan::new("Elsewhere", 60, 30), Some("0771234567"))
            .unwrap_err();
        assert_eq!(err, PreconditionError::SessionInProgress);
        assert_eq!(session.destination, "Library");
    }

    #[test]
    fn tick_is_noop_when_not_running() {
        let mut idle = located();
        let before = idle.clone();
        assert!(idle.tick().is_empty());
        assert_eq!(idle, before);

        let mut alerted = started(600, 300);
        tick_n(&mut alerted, 600);
        assert_eq!(alerted.state, SessionState::AlertSent);
        let before = alerted.clone();
        assert!(alerted.tick().is_empty());
        assert_eq!(alerted, before);
    }

    #[test]
    fn confirm_safe_is_idempotent_while_active() {
        let mut session = started(600, 300);
        tick_n(&mut session, 10);
        session.confirm_safe();
        assert_eq!(session.check_in_time_remaining, 300);
        session.confirm_safe();
        assert_eq!(session.check_in_time_remaining, 300);
        assert_eq!(session.state, SessionState::Active);
    }

    #[test]
    fn missed_check_ins_escalate_to_alert() {
        let mut session = started(600, 300);

        let effects = tick_n(&mut session, 300);
        assert_eq!(session.state, SessionState::GracePeriod);
        assert_eq!(session.check_in_time_remaining, 300);
        assert_eq!(session.session_time_remaining, 300);
        assert_eq!(effects, vec![Effect::StartAlarm]);
        assert!(session.alarm_active());

        let effects = tick_n(&mut session, 300);
        assert_eq!(session.state, SessionState::AlertSent);
        assert!(!session.alarm_active());
        assert!(effects.contains(&Effect::StopAlarm));
        assert!(effects.contains(&Effect::StopTicker));
        assert_eq!(sent_kinds(&effects), vec![MessageKind::AutomaticAlert]);
    }

    #[test]
    fn automatic_alert_carries_destination_and_last_fix() {
        let mut session = started(600, 300);
        session.update_location(Coordinates::new(-17.8, 31.1));
        let effects = tick_n(&mut session, 600);

        let alert = effects
            .iter()
            .find_map(|effect| match effect {
                Effect::Send(message) => Some(message),
                _ => None,
            })
            .unwrap();
        assert!(alert.body.contains("heading to Library"));
        assert!(alert.body.contains("maps?q=-17.8,31.1"));
        assert_eq!(alert.location, Some(Coordinates::new(-17.8, 31.1)));
    }

    #[test]
    fn confirming_before_deadline_keeps_session_active() {
        let mut session = started(600, 300);
        tick_n(&mut session, 299);
        session.confirm_safe();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.check_in_time_remaining, 300);
    }

    #[test]
    fn confirming_during_grace_stops_alarm() {
        let mut session = started(600, 300);
        tick_n(&mut session, 310);
        assert_eq!(session.state, SessionState::GracePeriod);

        let effects = session.confirm_safe();
        assert_eq!(effects, vec![Effect::StopAlarm]);
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.check_in_time_remaining, 300);
        assert_eq!(session.session_time_remaining, 290);
    }

    #[test]
    fn shorter_grace_window_is_honoured() {
        let mut session = located();
        session
            .start(
                &WalkPlan::new("Library", 600, 300).with_grace_period(60),
                Some("0771234567"),
            )
            .unwrap();

        tick_n(&mut session, 300);
        assert_eq!(session.state, SessionState::GracePeriod);
        assert_eq!(session.check_in_time_remaining, 60);
        tick_n(&mut session, 60);
        assert_eq!(session.state, SessionState::AlertSent);

        // confirming always restores the full interval
        let mut session = located();
        session
            .start(
                &WalkPlan::new("Library", 600, 300).with_grace_period(60),
                Some("0771234567"),
            )
            .unwrap();
        tick_n(&mut session, 305);
        session.confirm_safe();
        assert_eq!(session.check_in_time_remaining, 300);
    }

    #[test]
    fn total_duration_expiry_ends_session() {
        let mut session = started(600, 300);
        let mut effects = Vec::new();
        for elapsed in 1..=600u64 {
            effects.extend(session.tick());
            if elapsed % 250 == 0 {
                session.confirm_safe();
            }
            assert!(session.check_in_time_remaining <= session.check_in_interval_seconds);
        }
        assert_eq!(session.state, SessionState::Inactive);
        assert_eq!(session.session_time_remaining, 0);
        assert!(effects.contains(&Effect::StopTicker));
        assert!(!effects.contains(&Effect::StartAlarm));
    }

    #[test]
    fn session_expiry_wins_over_check_in_deadline() {
        let mut session = started(300, 300);
        let effects = tick_n(&mut session, 300);
        assert_eq!(session.state, SessionState::Inactive);
        assert_eq!(effects, vec![Effect::StopTicker]);
    }

    #[test]
    fn end_session_from_every_state() {
        let mut inactive = located();
        assert!(inactive.end().is_empty());
        assert_eq!(inactive.state, SessionState::Inactive);

        let mut active = started(600, 300);
        assert_eq!(active.end(), vec![Effect::StopTicker]);

        let mut grace = started(600, 300);
        tick_n(&mut grace, 300);
        assert_eq!(grace.end(), vec![Effect::StopAlarm, Effect::StopTicker]);

        let mut alerted = started(600, 300);
        tick_n(&mut alerted, 600);
        assert!(alerted.end().is_empty());

        for mut session in [inactive, active, grace, alerted] {
            assert_eq!(session.state, SessionState::Inactive);
            assert!(session.tick().is_empty());
            assert_eq!(session.session_time_remaining, 0);
            assert!(session.last_known_location.is_some());
        }
    }

    #[test]
    fn invalid_operations_are_ignored() {
        let mut idle = located();
        assert!(idle.confirm_safe().is_empty());
        assert!(idle.distress_signal().is_empty());
        assert!(idle.acknowledge_alert().is_empty());

        let mut alerted = started(600, 300);
        tick_n(&mut alerted, 600);
        let before = alerted.clone();
        assert!(alerted.confirm_safe().is_empty());
        assert!(alerted.distress_signal().is_empty());
        assert_eq!(alerted, before);

        alerted.acknowledge_alert();
        assert_eq!(alerted.state, SessionState::Inactive);
    }

    #[test]
    fn distress_signal_leaves_state_untouched() {
        let mut session = started(600, 300);
        tick_n(&mut session, 42);
        let before = session.clone();
        let effects = session.distress_signal();
        assert_eq!(session, before);
        assert_eq!(sent_kinds(&effects), vec![MessageKind::Distress]);
    }
}

#[cfg(test)]
mod properties {
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Tick(u16),
        ConfirmSafe,
        Distress,
        Acknowledge,
        End,
    }

    /// Valid plans: duration >= interval > 0, grace within the interval.
    fn arb_plan() -> impl Strategy<Value = WalkPlan> {
        (1u64..=900)
            .prop_flat_map(|interval| {
                (
                    Just(interval),
                    interval..=interval * 4,
                    prop::option::of(1..=interval),
                )
            })
            .prop_map(|(interval, total, grace)| {
                let plan = WalkPlan::new("Library", total, interval);
                match grace {
                    Some(grace) => plan.with_grace_period(grace),
                    None => plan,
                }
            })
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            6 => (1u16..400).prop_map(Step::Tick),
            3 => Just(Step::ConfirmSafe),
            1 => Just(Step::Distress),
            1 => Just(Step::Acknowledge),
            1 => Just(Step::End),
        ]
    }

    #[derive(Default)]
    struct Drivers {
        ticker: bool,
        alarm: bool,
    }

    impl Drivers {
        fn apply(&mut self, effects: &[Effect]) {
            for effect in effects {
                match effect {
                    Effect::StartTicker => self.ticker = true,
                    Effect::StopTicker => self.ticker = false,
                    Effect::StartAlarm => self.alarm = true,
                    Effect::StopAlarm => self.alarm = false,
                    Effect::Send(_) => {}
                }
            }
        }
    }

    fn check(session: &SafetySession, drivers: &Drivers) -> Result<(), TestCaseError> {
        prop_assert!(session.check_in_time_remaining <= session.check_in_interval_seconds);
        prop_assert!(session.session_time_remaining <= session.total_duration_seconds);
        prop_assert_eq!(session.alarm_active(), session.state == SessionState::GracePeriod);
        prop_assert_eq!(drivers.alarm, session.alarm_active());
        prop_assert_eq!(drivers.ticker, session.state.is_ticking());
        Ok(())
    }

    proptest! {
        #[test]
        fn invariants_hold_over_any_sequence(
            plan in arb_plan(),
            steps in prop::collection::vec(arb_step(), 1..40),
        ) {
            let mut session = SafetySession::new();
            session.update_location(Coordinates::new(-17.78, 31.05));
            let mut drivers = Drivers::default();

            drivers.apply(&session.start(&plan, Some("0771234567")).unwrap());
            prop_assert_eq!(session.state, SessionState::Active);
            prop_assert_eq!(session.session_time_remaining, plan.total_duration_seconds);
            prop_assert_eq!(session.check_in_time_remaining, plan.check_in_interval_seconds);
            check(&session, &drivers)?;

            for step in steps {
                match step {
                    Step::Tick(count) => {
                        for _ in 0..count {
                            drivers.apply(&session.tick());
                            check(&session, &drivers)?;
                        }
                    }
                    Step::ConfirmSafe => {
                        let was_running = session.state.is_ticking();
                        drivers.apply(&session.confirm_safe());
                        if was_running {
                            prop_assert_eq!(session.state, SessionState::Active);
                            prop_assert_eq!(
                                session.check_in_time_remaining,
                                plan.check_in_interval_seconds
                            );
                        }
                    }
                    Step::Distress => {
                        let before = session.clone();
                        drivers.apply(&session.distress_signal());
                        prop_assert_eq!(&session, &before);
                    }
                    Step::Acknowledge => drivers.apply(&session.acknowledge_alert()),
                    Step::End => {
                        drivers.apply(&session.end());
                        prop_assert_eq!(session.state, SessionState::Inactive);
                    }
                }
                check(&session, &drivers)?;
            }
        }
    }
}
