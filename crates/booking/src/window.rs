//! Installation-window calculator.
//!
//! Pure date arithmetic: given a campaign start date and the current time,
//! report whether installation proof can be uploaded. The window opens
//! `window_days` before the start date and runs through the end of the day
//! `window_days` after it. Fully deterministic in `(start_date, now)` — no
//! stored state, safe to recompute on every read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    TooEarly,
    Open,
    Closed,
}

/// Countdown urgency tier while the window is open.
///
/// Note the deliberate display split in the `Low` tier: remaining days in
/// `(4, 7]` and `> 7` share the tier but produce different messages. This
/// mirrors the product copy and is documented behavior, not a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
}

/// Result of evaluating the window at a point in time. Exactly one of the
/// `days_*` fields is populated, matching `phase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStatus {
    pub phase: WindowPhase,
    pub opens_at: DateTime<Utc>,
    /// Exclusive end: the whole last window day still counts as open.
    pub closes_after: DateTime<Utc>,
    pub days_until_open: Option<i64>,
    pub days_remaining: Option<i64>,
    pub days_since_closed: Option<i64>,
    pub urgency: Option<Urgency>,
    pub message: String,
}

fn floor_days(d: Duration) -> i64 {
    d.num_days()
}

fn ceil_days(d: Duration) -> i64 {
    let secs = d.num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + 86_399) / 86_400
    }
}

fn urgency_for(days_remaining: i64) -> Urgency {
    match days_remaining {
        d if d <= 1 => Urgency::Critical,
        2 => Urgency::High,
        3 | 4 => Urgency::Medium,
        _ => Urgency::Low,
    }
}

fn open_message(days_remaining: i64, urgency: Urgency) -> String {
    match urgency {
        Urgency::Critical => "Upload installation proof now — the window is about to close.".into(),
        Urgency::High => format!(
            "Upload installation proof soon — {} days remaining.",
            days_remaining
        ),
        Urgency::Medium => format!(
            "{} days remaining to upload installation proof.",
            days_remaining
        ),
        // Same tier, different copy on either side of 7 days.
        Urgency::Low if days_remaining <= 7 => format!(
            "Window open — {} days remaining to upload proof.",
            days_remaining
        ),
        Urgency::Low => format!(
            "Window open — no rush yet, {} days remaining.",
            days_remaining
        ),
    }
}

/// Evaluate the installation window for a campaign starting at `start_date`.
pub fn compute_window_status(
    start_date: DateTime<Utc>,
    now: DateTime<Utc>,
    window_days: i64,
) -> WindowStatus {
    let opens_at = start_date - Duration::days(window_days);
    let closes_after = start_date + Duration::days(window_days + 1);

    if now < opens_at {
        // Count the opening day itself, matching the countdown copy.
        let days_until_open = floor_days(opens_at - now) + 1;
        WindowStatus {
            phase: WindowPhase::TooEarly,
            opens_at,
            closes_after,
            days_until_open: Some(days_until_open),
            days_remaining: None,
            days_since_closed: None,
            urgency: None,
            message: format!(
                "Installation window opens in {} day(s).",
                days_until_open
            ),
        }
    } else if now < closes_after {
        let days_remaining = ceil_days(closes_after - now) - 1;
        let urgency = urgency_for(days_remaining);
        WindowStatus {
            phase: WindowPhase::Open,
            opens_at,
            closes_after,
            days_until_open: None,
            days_remaining: Some(days_remaining),
            days_since_closed: None,
            urgency: Some(urgency),
            message: open_message(days_remaining, urgency),
        }
    } else {
        let days_since_closed = floor_days(now - closes_after);
        WindowStatus {
            phase: WindowPhase::Closed,
            opens_at,
            closes_after,
            days_until_open: None,
            days_remaining: None,
            days_since_closed: Some(days_since_closed),
            urgency: None,
            message: format!(
                "Installation window closed {} day(s) ago.",
                days_since_closed
            ),
        }
    }
}

/// Proof upload is permitted exactly while the window is open.
pub fn can_upload_proof(start_date: DateTime<Utc>, now: DateTime<Utc>, window_days: i64) -> bool {
    compute_window_status(start_date, now, window_days).phase == WindowPhase::Open
}
