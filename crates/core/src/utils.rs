use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Normalizes a machine-readable timestamp to RFC 3339 in UTC.
/// Supports ISO 8601 with an offset or `Z`, and naive ISO 8601 (assumed UTC),
/// with or without fractional seconds.
/// Returns `None` for blank input; unparseable text is returned unchanged.
pub fn normalize_timestamp(timestamp_str: &str) -> Option<String> {
    let timestamp_str = timestamp_str.trim();
    if timestamp_str.is_empty() {
        return None;
    }

    // e.g. "2023-03-01T17:24:11.000Z" or "2023-03-01T17:24:11+01:00"
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp_str) {
        return Some(format_utc(dt.with_timezone(&Utc)));
    }

    // e.g. "2023-03-01T17:24:11" or "2023-03-01T17:24:11.250"
    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(format_utc(naive_dt.and_utc()));
    }

    Some(timestamp_str.to_string())
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Sanitizes a string for use in a filename
/// Replaces invalid filename characters with hyphens
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
