use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use engine_logging::{engine_debug, engine_info, engine_trace};
use futures_util::TryStreamExt;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT,
};
use reqwest::Method;
use sitegrab_core::{describe_length, normalize, DownloadStatus};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::governor::{RateGovernor, RateListener};
use crate::{EngineEvent, FailureKind, FetchError, FetchResult};

/// Size of each read from the governed body stream.
pub const CHUNK_SIZE: usize = 8 * 1024;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            redirect_limit: 10,
        }
    }
}

/// Where a response body is written, opened once the headers are known.
pub struct ContentSink {
    pub path: PathBuf,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl ContentSink {
    pub fn new(path: PathBuf, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            path,
            writer: Box::new(writer),
        }
    }
}

/// Opens the destination for a response, given the request URL and the
/// response headers.
pub type SinkFactory = Arc<dyn Fn(&Url, &HeaderMap) -> io::Result<ContentSink> + Send + Sync>;

/// Called after every chunk with `(downloaded, total)`; `total` is `-1` when
/// unknown.
pub type ProgressCallback = Arc<dyn Fn(u64, i64) + Send + Sync>;

/// Per-request options.
#[derive(Clone, Default)]
pub struct FetchConfig {
    /// Required. Fetching without one fails with a configuration error.
    pub sink_factory: Option<SinkFactory>,
    /// Bytes per second; zero or negative means unlimited.
    pub rate_limit: i64,
    pub on_progress: Option<ProgressCallback>,
    pub on_rate: Option<RateListener>,
    /// `GET` when unset.
    pub method: Option<Method>,
    pub body: Option<Bytes>,
    /// Status codes accepted before anything is written; empty accepts all.
    pub allowed_status_codes: Vec<u16>,
    pub status: Option<Arc<DownloadStatus>>,
    pub cancel: Option<CancellationToken>,
}

impl FetchConfig {
    pub fn with_sink(sink_factory: SinkFactory) -> Self {
        Self {
            sink_factory: Some(sink_factory),
            ..Self::default()
        }
    }
}

/// The 2xx range, the usual allow list for downloads.
pub fn success_status_codes() -> Vec<u16> {
    (200..300).collect()
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, config: &FetchConfig) -> Result<FetchResult, FetchError>;
}

/// HTTP fetcher streaming response bodies through a [`RateGovernor`] into the
/// sink chosen by the caller.
#[derive(Debug)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    client: OnceCell<reqwest::Client>,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, FetchError> {
        self.client
            .get_or_try_init(|| async { self.build_client() })
            .await
    }

    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(self.settings.redirect_limit))
            .default_headers(browser_headers())
            .build()
            .map_err(|err| FetchError::new(FailureKind::Configuration, err.to_string()))
    }

    async fn transfer(
        &self,
        url: Url,
        config: &FetchConfig,
        sink_factory: &SinkFactory,
    ) -> Result<FetchResult, FetchError> {
        let client = self.client().await?;
        let cancel = config.cancel.as_ref();

        let method = config.method.clone().unwrap_or(Method::GET);
        let mut request = client.request(method, url.clone());
        if let Some(body) = &config.body {
            request = request.body(body.clone());
        }
        let response = cancellable(cancel, request.send())
            .await?
            .map_err(map_reqwest_error)?;

        let status_code = response.status();
        engine_info!("{url}: {status_code}");
        if let Some(status) = &config.status {
            status.set_response(
                status_code.as_u16(),
                status_code.canonical_reason().unwrap_or_default(),
            );
        }
        if !config.allowed_status_codes.is_empty()
            && !config.allowed_status_codes.contains(&status_code.as_u16())
        {
            return Err(FetchError::new(
                FailureKind::StatusNotAllowed(status_code.as_u16()),
                format!("{url} answered {status_code}"),
            ));
        }

        let headers = response.headers().clone();
        let final_url = response.url().to_string();
        let total = declared_length(&headers);
        if let Some(status) = &config.status {
            let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
            status.set_content_length(describe_length(u64::try_from(total).ok(), content_type));
        }

        let ContentSink { path, mut writer } = sink_factory(&url, &headers).map_err(|err| {
            FetchError::new(FailureKind::Sink, format!("cannot open sink for {url}: {err}"))
        })?;
        engine_debug!("saving {url} to {}", path.display());

        let stream = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let mut governor = RateGovernor::new(config.rate_limit, StreamReader::new(stream));
        if let Some(on_rate) = &config.on_rate {
            governor = governor.with_listener(Arc::clone(on_rate));
        }

        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut downloaded: u64 = 0;
        loop {
            let read = cancellable(cancel, governor.read(&mut chunk))
                .await?
                .map_err(|err| transfer_error("read", &url, err))?;
            if read == 0 {
                break;
            }
            cancellable(cancel, writer.write_all(&chunk[..read]))
                .await?
                .map_err(|err| transfer_error("write", &url, err))?;
            downloaded += read as u64;
            if let Some(on_progress) = &config.on_progress {
                on_progress(downloaded, total);
            }
        }
        governor.close();

        writer
            .flush()
            .await
            .map_err(|err| transfer_error("flush", &url, err))?;
        writer
            .shutdown()
            .await
            .map_err(|err| transfer_error("close", &url, err))?;

        if total >= 0 && downloaded < total as u64 {
            return Err(FetchError::new(
                FailureKind::Transfer,
                format!("{url}: body ended after {downloaded} of {total} bytes"),
            ));
        }
        engine_trace!("{url}: {downloaded} bytes written");

        Ok(FetchResult {
            local_file: path,
            headers,
            status_code: status_code.as_u16(),
            final_url,
            bytes_written: downloaded,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, config: &FetchConfig) -> Result<FetchResult, FetchError> {
        let Some(sink_factory) = config.sink_factory.as_ref() else {
            return Err(FetchError::new(
                FailureKind::Configuration,
                "no sink factory configured",
            ));
        };
        let parsed = normalize(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::new(
                FailureKind::InvalidUrl,
                format!("unsupported scheme: {}", parsed.scheme()),
            ));
        }

        if let Some(status) = &config.status {
            status.mark_started();
        }
        let result = self.transfer(parsed, config, sink_factory).await;
        if let Some(status) = &config.status {
            status.mark_finished();
        }
        result
    }
}

/// Headers a desktop browser sends with a navigation request.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

/// `Content-Length` as a signed count, `-1` when absent or malformed.
fn declared_length(headers: &HeaderMap) -> i64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|length| *length >= 0)
        .unwrap_or(-1)
}

async fn cancellable<F: Future>(
    cancel: Option<&CancellationToken>,
    operation: F,
) -> Result<F::Output, FetchError> {
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(FetchError::new(FailureKind::Cancelled, "cancelled")),
            output = operation => Ok(output),
        },
        None => Ok(operation.await),
    }
}

fn transfer_error(stage: &str, url: &Url, err: io::Error) -> FetchError {
    let kind = match err.get_ref().and_then(|inner| inner.downcast_ref::<reqwest::Error>()) {
        Some(inner) if inner.is_timeout() => FailureKind::Timeout,
        _ => FailureKind::Transfer,
    };
    FetchError::new(kind, format!("{stage} failed for {url}: {err}"))
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_garbage_length_is_unknown() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), -1);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(declared_length(&headers), -1);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(declared_length(&headers), 42);
    }
}
