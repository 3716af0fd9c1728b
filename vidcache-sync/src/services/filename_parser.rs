//! Display information derived from recorder-style file names
//!
//! Recognized shape: `YYYYMMDDHHMM_<title>_<station>.<ext>`. Every part is
//! optional; an unrecognized name yields its stem as the title.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static EXTENSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(mp4|mkv|avi|mov|ts|m2ts)$").expect("extension regex should compile")
});
static BROADCAST_DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{12})_").expect("broadcast date regex should compile"));
static STATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_([^_]+)$").expect("station regex should compile"));
static EPISODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:ep?|episode|第)\s*(\d+)").expect("episode regex should compile")
});
static YEAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year regex should compile"));

/// Fields parsed out of a file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    pub title: String,
    pub broadcast_date: Option<NaiveDateTime>,
    pub broadcast_station: Option<String>,
    pub episode: Option<i64>,
    pub year: Option<i64>,
}

/// Canonical spelling for common full-width station names
pub fn clean_station_name(station: &str) -> String {
    let mapped = match station {
        "ＢＳ１１イレブン" | "ＢＳ１１" => "BS11",
        "ＢＳフジ" => "BSフジ",
        "ＢＳ-ＴＢＳ" => "BS-TBS",
        "ＢＳテレ東" => "BSテレ東",
        "ＢＳアニマックス" => "アニマックス",
        "ＡＴＸＸ" | "ＡＴ－Ｘ" => "AT-X",
        other => other,
    };
    mapped.to_string()
}

fn parse_broadcast_date(digits: &str) -> Option<NaiveDateTime> {
    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u32>().ok();
    let year = digits.get(0..4)?.parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_opt(field(8..10)?, field(10..12)?, 0)
}

pub fn parse_file_name(file_name: &str) -> ParsedFileName {
    let stem = EXTENSION_PATTERN.replace(file_name, "").to_string();
    let mut rest = stem.as_str();

    let mut broadcast_date = None;
    if let Some(caps) = BROADCAST_DATE_PATTERN.captures(rest) {
        broadcast_date = parse_broadcast_date(&caps[1]);
        rest = &rest[caps[0].len()..];
    }

    let mut broadcast_station = None;
    if let Some(caps) = STATION_PATTERN.captures(rest) {
        if let Some(whole) = caps.get(0) {
            broadcast_station = Some(clean_station_name(&caps[1]));
            rest = &rest[..whole.start()];
        }
    }

    let mut title = rest.trim().to_string();
    if title.is_empty() {
        title = stem.trim().to_string();
    }

    let episode = EPISODE_PATTERN
        .captures(&stem)
        .and_then(|caps| caps[1].parse::<i64>().ok());

    let year = broadcast_date
        .map(|d| d.year() as i64)
        .or_else(|| YEAR_PATTERN.find(&title).and_then(|m| m.as_str().parse().ok()));

    ParsedFileName {
        title,
        broadcast_date,
        broadcast_station,
        episode,
        year,
    }
}
