use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Artifact filename for a capture at local time `at`,
/// e.g. "processed_photo_20240102_030405.jpg".
pub fn artifact_filename(at: NaiveDateTime) -> String {
    format!("processed_photo_{}.jpg", at.format("%Y%m%d_%H%M%S"))
}

/// Filename for a frame captured at `captured_at_ms` (Unix millis), in local
/// time. Frames without a usable timestamp are named after the current time.
pub fn artifact_filename_for(captured_at_ms: i64) -> String {
    let local: DateTime<Local> = Local
        .timestamp_millis_opt(captured_at_ms)
        .single()
        .filter(|_| captured_at_ms > 0)
        .unwrap_or_else(Local::now);
    artifact_filename(local.naive_local())
}
