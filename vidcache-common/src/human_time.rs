//! Human-readable duration formatting for progress messages and logs

/// Format whole seconds as `1h 2m 3s`, `2m 3s` or `45s`
///
/// ```
/// use vidcache_common::human_time::format_duration;
///
/// assert_eq!(format_duration(45), "45s");
/// assert_eq!(format_duration(125), "2m 5s");
/// assert_eq!(format_duration(3725), "1h 2m 5s");
/// ```
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Format an optional ETA, `unknown` when throughput is not yet measurable
pub fn format_eta(seconds: Option<u64>) -> String {
    match seconds {
        Some(s) => format_duration(s),
        None => "unknown".to_string(),
    }
}
