//! Spoken time phrasing

use chrono::{DateTime, Duration, Local, TimeZone};

/// "arriving now", "1 minute" or "N minutes"
pub fn minutes_to_eta_str(minutes: i64) -> String {
    if minutes <= 0 {
        return "arriving now".to_string();
    }
    if minutes == 1 {
        return "1 minute".to_string();
    }
    format!("{} minutes", minutes)
}

/// Wall-clock time `minutes` from now, e.g. "3:07 PM"
pub fn now_plus_minutes(minutes: i64) -> String {
    clock_after(Local::now(), minutes)
}

/// 12-hour clock reading `minutes` after `start`, without a leading zero
pub fn clock_after<Tz: TimeZone>(start: DateTime<Tz>, minutes: i64) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let eta = start + Duration::minutes(minutes);
    eta.format("%-I:%M %p").to_string()
}

/// Countdown phrase announced on each guidance tick
pub fn remaining_phrase(remaining_minutes: u32) -> String {
    if remaining_minutes == 1 {
        "One minute remaining.".to_string()
    } else {
        format!("{} minutes remaining.", remaining_minutes)
    }
}
