use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use engine_logging::engine_info;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use sitegrab_core::{extension_for_mime, DownloadLocation, DownloadStatus, LocalName, INDEX_NAME};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::fetch::{
    success_status_codes, ContentSink, FetchConfig, Fetcher, ProgressCallback, SinkFactory,
};
use crate::governor::RateListener;
use crate::persist::{create_unique_file, ensure_output_dir, SuffixStyle};
use crate::{FetchError, FetchResult};

/// Options for saving one URL as one file.
#[derive(Clone, Default)]
pub struct DownloadRequest {
    pub save_dir: PathBuf,
    /// Explicit file name; otherwise taken from the response.
    pub output_name: Option<String>,
    pub suffix_style: SuffixStyle,
    pub rate_limit: i64,
    pub on_progress: Option<ProgressCallback>,
    pub on_rate: Option<RateListener>,
    pub status: Option<Arc<DownloadStatus>>,
    pub cancel: Option<CancellationToken>,
}

/// Fetch `url` into a single file in `request.save_dir`.
///
/// The name is the explicit output name, else the `Content-Disposition`
/// filename, else the URL basename, else `index` plus an extension for the
/// content type. Taken names get a numeric suffix.
pub async fn download_file(
    fetcher: &dyn Fetcher,
    url: &str,
    request: DownloadRequest,
) -> Result<FetchResult, FetchError> {
    let save_dir = request.save_dir.clone();
    let output_name = request.output_name.clone();
    let style = request.suffix_style;
    let sink_factory: SinkFactory = Arc::new(move |url: &Url, headers: &HeaderMap| {
        let wanted = output_name
            .clone()
            .unwrap_or_else(|| response_file_name(url, headers));
        open_unique_sink(&save_dir, &wanted, style)
    });

    let config = FetchConfig {
        sink_factory: Some(sink_factory),
        rate_limit: request.rate_limit,
        on_progress: request.on_progress,
        on_rate: request.on_rate,
        allowed_status_codes: success_status_codes(),
        status: request.status,
        cancel: request.cancel,
        ..FetchConfig::default()
    };
    let result = fetcher.fetch(url, &config).await?;
    engine_info!(
        "{url} saved to {} ({} bytes)",
        result.local_file.display(),
        result.bytes_written
    );
    Ok(result)
}

fn open_unique_sink(dir: &Path, wanted: &str, style: SuffixStyle) -> io::Result<ContentSink> {
    ensure_output_dir(dir).map_err(io::Error::other)?;
    let (path, file) = create_unique_file(dir, wanted, style)?;
    Ok(ContentSink::new(path, tokio::fs::File::from_std(file)))
}

/// File name for a single download, before collision handling.
pub fn response_file_name(url: &Url, headers: &HeaderMap) -> String {
    if let Some(name) = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(disposition_file_name)
    {
        return name;
    }
    match DownloadLocation::from_url(url).name {
        LocalName::File(name) => name,
        LocalName::Index => {
            let extension = headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .and_then(extension_for_mime);
            match extension {
                Some(ext) => format!("{INDEX_NAME}.{ext}"),
                None => INDEX_NAME.to_string(),
            }
        }
    }
}

/// `filename` parameter of a `Content-Disposition` value, reduced to its
/// last path component.
fn disposition_file_name(value: &str) -> Option<String> {
    let raw = value.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| value.trim().trim_matches('"'))
    })?;
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}
