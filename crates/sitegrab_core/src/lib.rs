//! Sitegrab core: pure URL, path and status helpers shared by the engine and the CLI.
mod error;
mod filter;
mod plan;
mod rate;
mod status;
mod urls;

pub use error::{ConfigError, UrlError};
pub use filter::{split_pattern_list, PathFilter, SkipReason};
pub use plan::{
    content_kind, extension_for_mime, plan_path, ContentKind, DownloadLocation, LocalName,
    INDEX_NAME,
};
pub use rate::{parse_rate_limit, UNLIMITED};
pub use status::{describe_length, human_size, DownloadStatus, StatusSnapshot};
pub use urls::{normalize, resolve, resolve_against, same_host, DEFAULT_SCHEME};
