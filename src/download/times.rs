use std::fs::FileTimes;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parse an API timestamp.
///
/// RFC 3339 first; zone-less values are taken as local time. The Unix
/// epoch itself is treated as "no timestamp".
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_FORMATS.iter().find_map(|fmt| {
                NaiveDateTime::parse_from_str(value, fmt)
                    .ok()
                    .and_then(|naive| naive.and_local_timezone(Local).earliest())
                    .map(|local| local.with_timezone(&Utc))
            })
        })?;

    (parsed.timestamp() != 0).then_some(parsed)
}

/// Set the modification time to `created` and the access time to now.
///
/// Uses `std::fs::File::set_times` (stable since Rust 1.75).
pub fn set_file_times(path: &Path, created: DateTime<Utc>) -> std::io::Result<()> {
    let times = FileTimes::new()
        .set_modified(SystemTime::from(created))
        .set_accessed(SystemTime::now());
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)?;
    Ok(())
}
