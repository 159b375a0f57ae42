use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

/// Per-download telemetry shared between the task doing the transfer and
/// whoever renders it. Every field access goes through the mutex.
#[derive(Debug, Default)]
pub struct DownloadStatus {
    fields: Mutex<StatusSnapshot>,
}

/// Point-in-time copy of a [`DownloadStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status_code: Option<u16>,
    pub status_text: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub content_length: String,
}

impl DownloadStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        self.lock().start_time = Some(Utc::now());
    }

    pub fn mark_finished(&self) {
        self.lock().end_time = Some(Utc::now());
    }

    pub fn set_response(&self, status_code: u16, status_text: impl Into<String>) {
        let mut fields = self.lock();
        fields.status_code = Some(status_code);
        fields.status_text = status_text.into();
    }

    pub fn set_content_length(&self, description: impl Into<String>) {
        self.lock().content_length = description.into();
    }

    pub fn status_code(&self) -> Option<u16> {
        self.lock().status_code
    }

    pub fn status_text(&self) -> String {
        self.lock().status_text.clone()
    }

    pub fn content_length(&self) -> String {
        self.lock().content_length.clone()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.lock().start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.lock().end_time
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        // A panic while holding the lock cannot leave the plain fields inconsistent.
        self.fields
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `"<bytes> (<human size>) [<mime>]"`, or `"unspecified [<mime>]"` when the
/// server sent no length.
pub fn describe_length(total: Option<u64>, content_type: Option<&str>) -> String {
    let mut description = match total {
        Some(bytes) => format!("{bytes} ({})", human_size(bytes)),
        None => "unspecified".to_string(),
    };
    if let Some(mime) = content_type.map(str::trim).filter(|mime| !mime.is_empty()) {
        description.push_str(&format!(" [{mime}]"));
    }
    description
}

/// Binary-prefixed size with two decimals above one KiB.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for candidate in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = candidate;
    }
    format!("{value:.2} {unit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_size_switches_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.00 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn status_updates_are_visible_in_snapshot() {
        let status = DownloadStatus::new();
        status.mark_started();
        status.set_response(200, "OK");
        status.set_content_length(describe_length(Some(10), Some("text/plain")));
        status.mark_finished();

        let snapshot = status.snapshot();
        assert_eq!(snapshot.status_code, Some(200));
        assert_eq!(snapshot.status_text, "OK");
        assert_eq!(snapshot.content_length, "10 (10 B) [text/plain]");
        assert!(snapshot.start_time.unwrap() <= snapshot.end_time.unwrap());
    }
}
