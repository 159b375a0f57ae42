use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use engine_logging::{engine_info, engine_warn};
use sitegrab_core::{human_size, DownloadStatus};
use sitegrab_engine::{EngineEvent, JobId, JobOutcome};

/// What the reporter knows about one running job.
struct JobView {
    url: String,
    status: Arc<DownloadStatus>,
    downloaded: u64,
    total: i64,
}

/// Turns engine events into wget-style console lines. In background mode the
/// lines go to the log instead.
pub struct Reporter {
    background: bool,
    jobs: HashMap<JobId, JobView>,
}

impl Reporter {
    pub fn new(background: bool) -> Self {
        Self {
            background,
            jobs: HashMap::new(),
        }
    }

    /// Render `event`. Returns `Some(success)` once a job has completed.
    pub fn handle(&mut self, event: EngineEvent) -> Option<bool> {
        match event {
            EngineEvent::Started {
                job_id,
                url,
                status,
            } => {
                self.emit(&format!("--{}--  {url}", timestamp(Utc::now())));
                self.jobs.insert(
                    job_id,
                    JobView {
                        url,
                        status,
                        downloaded: 0,
                        total: -1,
                    },
                );
                None
            }
            EngineEvent::Progress(progress) => {
                if let Some(job) = self.jobs.get_mut(&progress.job_id) {
                    job.downloaded = progress.downloaded;
                    job.total = progress.total;
                }
                None
            }
            EngineEvent::Rate {
                job_id,
                bytes_per_second,
            } => {
                if let Some(job) = self.jobs.get(&job_id) {
                    self.emit(&progress_line(job.downloaded, job.total, bytes_per_second));
                }
                None
            }
            EngineEvent::Saved { url, path, .. } => {
                self.emit(&format!("{url} -> '{}'", path.display()));
                None
            }
            EngineEvent::JobCompleted { job_id, result } => {
                let job = self.jobs.remove(&job_id);
                if let Some(job) = &job {
                    self.emit_response(job);
                }
                match result {
                    Ok(JobOutcome::Downloaded { path, bytes, .. }) => {
                        self.emit(&format!("Saving to: '{}'", path.display()));
                        self.emit(&format!(
                            "{} - '{}' saved [{bytes}]",
                            timestamp(Utc::now()),
                            path.display()
                        ));
                        Some(true)
                    }
                    Ok(JobOutcome::Mirrored(report)) => {
                        self.emit(&format!(
                            "FINISHED --{}--\nDownloaded: {} files, {} failed, {} skipped",
                            timestamp(Utc::now()),
                            report.fetched,
                            report.failed,
                            report.skipped
                        ));
                        if report.converted_pages > 0 {
                            self.emit(&format!(
                                "Converted links in {} files.",
                                report.converted_pages
                            ));
                        }
                        Some(!report.had_errors())
                    }
                    Err(err) => {
                        let url = job.map(|job| job.url).unwrap_or_default();
                        let line = format!("{url}: {err}");
                        if self.background {
                            engine_warn!("{line}");
                        } else {
                            eprintln!("{line}");
                        }
                        Some(false)
                    }
                }
            }
        }
    }

    fn emit_response(&self, job: &JobView) {
        let snapshot = job.status.snapshot();
        if let Some(code) = snapshot.status_code {
            self.emit(&format!(
                "HTTP request sent, awaiting response... {code} {}",
                snapshot.status_text
            ));
        }
        if !snapshot.content_length.is_empty() {
            self.emit(&format!("Length: {}", snapshot.content_length));
        }
        if let (Some(start), Some(end)) = (snapshot.start_time, snapshot.end_time) {
            let elapsed = (end - start).num_milliseconds().max(0) as f64 / 1000.0;
            self.emit(&format!("Transfer took {elapsed:.1}s"));
        }
    }

    fn emit(&self, line: &str) {
        if self.background {
            engine_info!("{line}");
        } else {
            println!("{line}");
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `"  1.50 KiB of 3.00 KiB (50%)  512 B/s"`; size and percentage are
/// omitted when the length is unknown.
pub fn progress_line(downloaded: u64, total: i64, bytes_per_second: u64) -> String {
    let rate = human_size(bytes_per_second);
    match u64::try_from(total) {
        Ok(total) if total > 0 => {
            let percent = downloaded.saturating_mul(100) / total;
            format!(
                "  {} of {} ({percent}%)  {rate}/s",
                human_size(downloaded),
                human_size(total)
            )
        }
        _ => format!("  {}  {rate}/s", human_size(downloaded)),
    }
}
