//! Sitegrab engine: transfers, link discovery and the mirror crawler.
mod convert;
mod css;
mod decode;
mod download;
mod engine;
mod fetch;
mod governor;
mod js;
mod links;
mod mirror;
mod persist;
mod types;

pub use convert::{convert_link, convert_stored_page, relative_link, LinkTargets};
pub use css::{extract_css_urls, rewrite_css_urls};
pub use decode::{decode_text, decode_text_lossy, DecodeError, DecodedText};
pub use download::{download_file, response_file_name, DownloadRequest};
pub use engine::{EngineConfig, EngineHandle, Job};
pub use fetch::{
    browser_headers, success_status_codes, ChannelProgressSink, ContentSink, FetchConfig,
    FetchSettings, Fetcher, ProgressCallback, ProgressSink, ReqwestFetcher, SinkFactory,
    CHUNK_SIZE,
};
pub use governor::{RateGovernor, RateListener};
pub use js::extract_js_module_links;
pub use links::{extract_html_links, ExtractedLink, HtmlDocument, LinkSlot};
pub use mirror::{
    MirrorCrawler, MirrorOptions, MirrorReport, MirrorSession, SavedCallback, DEFAULT_CONCURRENCY,
};
pub use persist::{
    create_unique_file, ensure_output_dir, open_planned_sink, planned_destination,
    unique_file_name, AtomicFileWriter, PersistError, SuffixStyle,
};
pub use types::{EngineEvent, FailureKind, FetchError, FetchResult, JobId, JobOutcome, JobProgress};
