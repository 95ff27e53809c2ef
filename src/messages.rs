//! Outgoing message templates and the small formatting helpers around them.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::location::Coordinates;

pub const DEFAULT_DIALING_CODE: &str = "263";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    SessionStart,
    Distress,
    AutomaticAlert,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::SessionStart => "SessionStart",
            MessageKind::Distress => "Distress",
            MessageKind::AutomaticAlert => "AutomaticAlert",
        }
    }
}

/// A composed message waiting to be handed to the messaging gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub kind: MessageKind,
    pub recipient: String,
    pub body: String,
    pub location: Option<Coordinates>,
}

pub fn map_link(fix: &Coordinates) -> String {
    format!(
        "https://www.google.com/maps?q={},{}",
        fix.latitude, fix.longitude
    )
}

pub fn session_start(destination: &str, total_seconds: u64, fix: &Coordinates) -> String {
    format!(
        "Hi, I'm starting a {} walk to {}. My current location is {}. \
         If you don't hear from me after this duration, please check on me as something might be wrong.",
        describe_duration(total_seconds),
        destination,
        map_link(fix)
    )
}

pub fn distress(destination: &str, fix: Option<&Coordinates>) -> String {
    let mut body = format!(
        "EMERGENCY! I am in distress and need help. I was heading to {}.",
        destination
    );
    if let Some(fix) = fix {
        body.push_str(&format!(" My current location is {}", map_link(fix)));
    }
    body
}

pub fn automatic_alert(destination: &str, fix: Option<&Coordinates>) -> String {
    let mut body = format!(
        "DANGER ALERT! I failed my safety check-in while heading to {}. Please contact me immediately.",
        destination
    );
    if let Some(fix) = fix {
        body.push_str(&format!(" My last known location: {}", map_link(fix)));
    }
    body
}

/// "30-minute" for whole minutes, "90-second" otherwise.
pub fn describe_duration(seconds: u64) -> String {
    if seconds >= 60 && seconds % 60 == 0 {
        format!("{}-minute", seconds / 60)
    } else {
        format!("{}-second", seconds)
    }
}

/// Countdown display, `m:ss`.
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Reduces a phone number to international digits. A leading trunk `0` is
/// replaced by `dialing_code`. Returns `None` when no digits remain.
pub fn normalize_phone(raw: &str, dialing_code: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    match digits.strip_prefix('0') {
        Some(rest) => {
            let code: String = dialing_code.chars().filter(char::is_ascii_digit).collect();
            Some(format!("{code}{rest}"))
        }
        None => Some(digits),
    }
}

/// WhatsApp click-to-chat link with `text` prefilled.
pub fn whatsapp_link(phone: &str, text: &str, dialing_code: &str) -> Option<String> {
    let number = normalize_phone(phone, dialing_code)?;
    Url::parse_with_params(&format!("https://wa.me/{number}"), &[("text", text)])
        .ok()
        .map(String::from)
}
