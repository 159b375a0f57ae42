use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use engine_logging::{engine_error, engine_info};
use sitegrab_core::DownloadStatus;
use tokio_util::sync::CancellationToken;

use crate::download::{download_file, DownloadRequest};
use crate::fetch::{
    ChannelProgressSink, FetchSettings, Fetcher, ProgressCallback, ProgressSink, ReqwestFetcher,
};
use crate::governor::RateListener;
use crate::mirror::{MirrorCrawler, MirrorOptions, MirrorSession};
use crate::persist::SuffixStyle;
use crate::{EngineEvent, FailureKind, FetchError, JobId, JobOutcome, JobProgress};

/// Settings shared by every job of one engine.
#[derive(Clone)]
pub struct EngineConfig {
    pub fetch: FetchSettings,
    pub save_dir: PathBuf,
    pub rate_limit: i64,
    pub suffix_style: SuffixStyle,
    /// Template for mirror jobs; `root`, `rate_limit` and the callbacks are
    /// filled in per job.
    pub mirror: MirrorOptions,
}

impl EngineConfig {
    pub fn default_with_output(save_dir: PathBuf) -> Self {
        Self {
            fetch: FetchSettings::default(),
            save_dir,
            rate_limit: 0,
            suffix_style: SuffixStyle::default(),
            mirror: MirrorOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Save one URL as one file, optionally under a fixed name.
    Download { url: String, output_name: Option<String> },
    /// Recursively mirror everything reachable from `url`.
    Mirror { url: String },
}

impl Job {
    pub fn url(&self) -> &str {
        match self {
            Job::Download { url, .. } | Job::Mirror { url } => url,
        }
    }
}

enum EngineCommand {
    Enqueue { job_id: JobId, job: Job },
}

/// Runs jobs on a background tokio runtime and reports through a channel.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    cancel: CancellationToken,
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::new(config.fetch.clone()));
        let config = Arc::new(config);
        let job_cancel = cancel.clone();

        thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    engine_error!("cannot start tokio runtime: {err}");
                    return;
                }
            };
            while let Ok(command) = cmd_rx.recv() {
                let fetcher = Arc::clone(&fetcher);
                let config = Arc::clone(&config);
                let sink = Arc::new(ChannelProgressSink::new(event_tx.clone()));
                let cancel = job_cancel.child_token();
                runtime.spawn(async move {
                    handle_command(fetcher, &config, command, sink, cancel).await;
                });
            }
        });

        Self {
            cmd_tx,
            event_rx,
            cancel,
        }
    }

    pub fn enqueue(&self, job_id: JobId, job: Job) {
        let _ = self.cmd_tx.send(EngineCommand::Enqueue { job_id, job });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block until the next event; `None` once the engine has stopped.
    pub fn recv(&self) -> Option<EngineEvent> {
        self.event_rx.recv().ok()
    }

    /// Abort every running job. Each reports a cancelled completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

async fn handle_command(
    fetcher: Arc<dyn Fetcher>,
    config: &EngineConfig,
    command: EngineCommand,
    sink: Arc<ChannelProgressSink>,
    cancel: CancellationToken,
) {
    let EngineCommand::Enqueue { job_id, job } = command;
    let status = Arc::new(DownloadStatus::new());
    sink.emit(EngineEvent::Started {
        job_id,
        url: job.url().to_string(),
        status: Arc::clone(&status),
    });

    let progress_sink = Arc::clone(&sink);
    let on_progress: ProgressCallback = Arc::new(move |downloaded: u64, total: i64| {
        progress_sink.emit(EngineEvent::Progress(JobProgress {
            job_id,
            downloaded,
            total,
        }));
    });
    let rate_sink = Arc::clone(&sink);
    let on_rate: RateListener = Arc::new(move |bytes_per_second: u64| {
        rate_sink.emit(EngineEvent::Rate {
            job_id,
            bytes_per_second,
        });
    });

    let result = match job {
        Job::Download { url, output_name } => {
            let request = DownloadRequest {
                save_dir: config.save_dir.clone(),
                output_name,
                suffix_style: config.suffix_style,
                rate_limit: config.rate_limit,
                on_progress: Some(on_progress),
                on_rate: Some(on_rate),
                status: Some(status),
                cancel: Some(cancel),
            };
            download_file(fetcher.as_ref(), &url, request)
                .await
                .map(|result| JobOutcome::Downloaded {
                    url,
                    path: result.local_file,
                    bytes: result.bytes_written,
                })
        }
        Job::Mirror { url } => {
            let saved_sink = Arc::clone(&sink);
            let mut options = config.mirror.clone();
            options.root = config.save_dir.clone();
            options.rate_limit = config.rate_limit;
            options.on_rate = Some(on_rate);
            options.on_saved = Some(Arc::new(move |url: &str, path: &std::path::Path| {
                saved_sink.emit(EngineEvent::Saved {
                    job_id,
                    url: url.to_string(),
                    path: path.to_path_buf(),
                });
            }));
            run_mirror(fetcher, &url, options, cancel).await
        }
    };

    if let Ok(outcome) = &result {
        engine_info!("job {job_id} finished: {outcome:?}");
    }
    sink.emit(EngineEvent::JobCompleted { job_id, result });
}

async fn run_mirror(
    fetcher: Arc<dyn Fetcher>,
    url: &str,
    options: MirrorOptions,
    cancel: CancellationToken,
) -> Result<JobOutcome, FetchError> {
    let session = MirrorSession::new(options)
        .map(Arc::new)
        .map_err(|err| FetchError::new(FailureKind::Configuration, err.to_string()))?;
    let session_cancel = session.cancel_token();
    let forward = tokio::spawn(async move {
        cancel.cancelled().await;
        session_cancel.cancel();
    });
    let report = MirrorCrawler::new(fetcher).mirror(url, session).await;
    forward.abort();
    report.map(JobOutcome::Mirrored)
}
