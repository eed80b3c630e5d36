use chrono::{DateTime, Local, Utc};

const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp prefix used on every event log line, in server local time.
pub fn log_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format(LOG_TIME_FORMAT).to_string()
}

/// Caller-supplied text for a log line, with control characters (line breaks
/// included) replaced so one event always stays on one line.
pub fn log_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Round to one decimal place, half away from zero.
///
/// The scaled value is first cut to 15 significant digits so that inputs like
/// `23.45`, stored as `23.4499...`, still round up.
pub fn round_1dp(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scaled = value * 10.0;
    let scaled = format!("{:.14e}", scaled).parse::<f64>().unwrap_or(scaled);
    scaled.round() / 10.0
}
