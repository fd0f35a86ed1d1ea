//! UTC offset parsing and formatting, and IANA zone offsets

use crate::proxy::geo::UNKNOWN_FIELD;
use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// `(UTC...)` annotation inside a platform display label
static LABEL_OFFSET_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(UTC([^)]*)\)").expect("Invalid UTC label regex"));

const MAX_HOURS: i32 = 23;
const MAX_MINUTES: i32 = 59;

/// Parse the `(UTC±HH:MM)` annotation of a catalog display label.
///
/// `(UTC)` is zero. Labels without an annotation, or with a malformed one,
/// yield `None`.
pub fn parse_label_offset(label: &str) -> Option<i32> {
    let caps = LABEL_OFFSET_REGEX.captures(label)?;
    let inside = caps[1].trim();
    if inside.is_empty() {
        return Some(0);
    }
    parse_signed_hhmm(inside)
}

/// Parse a manual offset such as `UTC+05:30`, `utc-8:00` or `UTC`.
pub fn parse_offset(text: &str) -> Option<i32> {
    let text = text.trim().to_uppercase();
    let rest = text.strip_prefix("UTC")?.trim();
    if rest.is_empty() || rest == "+00:00" {
        return Some(0);
    }
    parse_signed_hhmm(rest)
}

/// Format minutes east of UTC as `UTC±HH:MM`
pub fn format_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let total = minutes.abs();
    format!("UTC{}{:02}:{:02}", sign, total / 60, total % 60)
}

/// `±H:MM` or `±HH:MM` into signed minutes
fn parse_signed_hhmm(text: &str) -> Option<i32> {
    let (sign, hhmm) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };

    let (hh, mm) = hhmm.split_once(':')?;
    if !(1..=2).contains(&hh.len()) || mm.len() != 2 {
        return None;
    }
    if !hh.bytes().chain(mm.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = hh.parse().ok()?;
    let minutes: i32 = mm.parse().ok()?;
    if hours > MAX_HOURS || minutes > MAX_MINUTES {
        return None;
    }

    Some(sign * (hours * 60 + minutes))
}

/// Offset of an IANA zone at `at`, in minutes east of UTC (DST-aware).
///
/// Empty, placeholder and unknown names yield `None`.
pub fn iana_offset_minutes_at(name: &str, at: DateTime<Utc>) -> Option<i32> {
    let name = name.trim();
    if name.is_empty() || name == UNKNOWN_FIELD {
        return None;
    }
    let tz: Tz = name.parse().ok()?;
    Some(zone_offset_minutes(&tz, at))
}

/// Offset of an IANA zone right now
pub fn iana_offset_minutes_now(name: &str) -> Option<i32> {
    iana_offset_minutes_at(name, Utc::now())
}

pub(crate) fn zone_offset_minutes(tz: &Tz, at: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&at.naive_utc())
        .fix()
        .local_minus_utc()
        / 60
}

/// City keyword used to break ties between zones sharing an offset.
///
/// `America/New_York` gives `"new york"`; names without a `/` give `None`.
pub fn keyword_from_iana(name: &str) -> Option<String> {
    let (_, last) = name.trim().rsplit_once('/')?;
    let keyword = last.replace('_', " ").trim().to_lowercase();
    (!keyword.is_empty()).then_some(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_label_offset() {
        assert_eq!(parse_label_offset("(UTC+09:00) Osaka, Sapporo, Tokyo"), Some(540));
        assert_eq!(parse_label_offset("(UTC-05:00) Eastern Time (US & Canada)"), Some(-300));
        assert_eq!(parse_label_offset("(UTC+05:45) Kathmandu"), Some(345));
        assert_eq!(parse_label_offset("(UTC) Coordinated Universal Time"), Some(0));
        assert_eq!(parse_label_offset("(UTC+00:00) Dublin, Edinburgh, Lisbon, London"), Some(0));
    }

    #[test]
    fn test_parse_label_offset_malformed() {
        assert_eq!(parse_label_offset("Coordinated Universal Time"), None);
        assert_eq!(parse_label_offset("(UTC+9) Somewhere"), None);
        assert_eq!(parse_label_offset("(UTCx) Somewhere"), None);
        assert_eq!(parse_label_offset("(UTC+25:00) Nowhere"), None);
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("UTC+05:30"), Some(330));
        assert_eq!(parse_offset(" utc-8:00 "), Some(-480));
        assert_eq!(parse_offset("UTC"), Some(0));
        assert_eq!(parse_offset("UTC+00:00"), Some(0));
        assert_eq!(parse_offset("UTC-00:00"), Some(0));
    }

    #[test]
    fn test_parse_offset_malformed() {
        assert_eq!(parse_offset(""), None);
        assert_eq!(parse_offset("GMT+01:00"), None);
        assert_eq!(parse_offset("UTC 05:30"), None);
        assert_eq!(parse_offset("UTC+0530"), None);
        assert_eq!(parse_offset("UTC+05:3"), None);
        assert_eq!(parse_offset("UTC+05:60"), None);
        assert_eq!(parse_offset("UTC++05:00"), None);
    }

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(540), "UTC+09:00");
        assert_eq!(format_offset(-210), "UTC-03:30");
        assert_eq!(format_offset(0), "UTC+00:00");
    }

    #[test]
    fn test_offset_round_trip_is_idempotent() {
        for sign in ["+", "-"] {
            for hours in 0..=MAX_HOURS {
                for minutes in [0, 15, 30, 45, MAX_MINUTES] {
                    for text in [
                        format!("UTC{}{:02}:{:02}", sign, hours, minutes),
                        format!("UTC{}{}:{:02}", sign, hours, minutes),
                    ] {
                        let first = parse_offset(&text).unwrap();
                        let formatted = format_offset(first);
                        assert_eq!(parse_offset(&formatted), Some(first), "{}", text);
                        assert_eq!(format_offset(parse_offset(&formatted).unwrap()), formatted);
                    }
                }
            }
        }
    }

    #[test]
    fn test_iana_offset_fixed_zone() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(iana_offset_minutes_at("Asia/Tokyo", at), Some(540));
        assert_eq!(iana_offset_minutes_at("Asia/Kolkata", at), Some(330));
        assert_eq!(iana_offset_minutes_at("UTC", at), Some(0));
    }

    #[test]
    fn test_iana_offset_follows_dst() {
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(iana_offset_minutes_at("America/New_York", winter), Some(-300));
        assert_eq!(iana_offset_minutes_at("America/New_York", summer), Some(-240));
    }

    #[test]
    fn test_iana_offset_unknown() {
        assert_eq!(iana_offset_minutes_now(""), None);
        assert_eq!(iana_offset_minutes_now("-"), None);
        assert_eq!(iana_offset_minutes_now("Mars/Olympus_Mons"), None);
    }

    #[test]
    fn test_keyword_from_iana() {
        assert_eq!(keyword_from_iana("America/New_York").as_deref(), Some("new york"));
        assert_eq!(
            keyword_from_iana("America/Argentina/Buenos_Aires").as_deref(),
            Some("buenos aires")
        );
        assert_eq!(keyword_from_iana("Asia/Tokyo").as_deref(), Some("tokyo"));
        assert_eq!(keyword_from_iana("UTC"), None);
        assert_eq!(keyword_from_iana("Etc/"), None);
    }
}
