use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

/// Stem used when a URL names a directory rather than a file.
pub const INDEX_NAME: &str = "index";

/// Broad classification of a response body, derived from its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Script,
    Other,
}

/// Name of the file a URL is stored under, before content-type adjustments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalName {
    /// The URL names a directory: use index naming.
    Index,
    File(String),
}

/// Folder (relative to the download root) and file name derived from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLocation {
    pub folder: PathBuf,
    pub name: LocalName,
}

impl DownloadLocation {
    /// Derive `<host>/<path directories>` plus the path basename.
    ///
    /// Empty, `.` and `..` segments are dropped so the location never escapes
    /// the folder it is joined onto.
    pub fn from_url(url: &Url) -> Self {
        let mut folder = PathBuf::from(host_folder(url));
        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();
        let last = segments.pop().unwrap_or("");
        for segment in segments {
            if let Some(clean) = clean_segment(segment) {
                folder.push(clean);
            }
        }
        let name = match clean_segment(last) {
            Some(file) => LocalName::File(file),
            None => LocalName::Index,
        };
        Self { folder, name }
    }
}

/// Map a URL and its response content type to a file under `root`.
///
/// HTML documents whose basename has no extension are treated as directories
/// (`/wget` becomes `wget/index.html`); HTML with a foreign extension gets
/// `.html` appended. A query string is folded into the name as `@<hash>`.
/// Pure: nothing is created on disk.
pub fn plan_path(url: &Url, content_type: Option<&str>, root: &Path) -> PathBuf {
    let DownloadLocation { mut folder, name } = DownloadLocation::from_url(url);
    let kind = content_kind(content_type);
    let query_tag = url
        .query()
        .filter(|query| !query.is_empty())
        .map(|query| format!("@{}", short_hash(query)))
        .unwrap_or_default();

    let file_name = match name {
        LocalName::Index => {
            let extension = content_type.and_then(extension_for_mime);
            match extension {
                Some(ext) => format!("{INDEX_NAME}{query_tag}.{ext}"),
                None => format!("{INDEX_NAME}{query_tag}"),
            }
        }
        LocalName::File(name) if kind == ContentKind::Html => {
            let (stem, extension) = split_extension(&name);
            match extension {
                None if query_tag.is_empty() => {
                    folder.push(&name);
                    format!("{INDEX_NAME}.html")
                }
                Some(ext) if is_html_extension(ext) => format!("{stem}{query_tag}.{ext}"),
                _ => format!("{name}{query_tag}.html"),
            }
        }
        LocalName::File(name) => {
            let (stem, extension) = split_extension(&name);
            match extension {
                Some(ext) => format!("{stem}{query_tag}.{ext}"),
                None => format!("{stem}{query_tag}"),
            }
        }
    };

    root.join(folder).join(file_name)
}

/// Classify a `Content-Type` header value.
pub fn content_kind(content_type: Option<&str>) -> ContentKind {
    match content_type.map(essence).as_deref() {
        Some("text/html") | Some("application/xhtml+xml") => ContentKind::Html,
        Some("text/css") => ContentKind::Css,
        Some("text/javascript")
        | Some("application/javascript")
        | Some("application/x-javascript")
        | Some("application/ecmascript")
        | Some("text/ecmascript") => ContentKind::Script,
        _ => ContentKind::Other,
    }
}

/// File extension (without the dot) for a content type, `None` when unknown.
pub fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let ext = match essence(content_type).as_str() {
        "text/html" | "application/xhtml+xml" => "html",
        "text/css" => "css",
        "text/javascript"
        | "application/javascript"
        | "application/x-javascript"
        | "application/ecmascript"
        | "text/ecmascript" => "js",
        "application/json" | "application/ld+json" => "json",
        "application/xml" | "text/xml" => "xml",
        "application/rss+xml" => "rss",
        "application/atom+xml" => "atom",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" => "weba",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/ogg" => "ogv",
        "video/quicktime" => "mov",
        "font/woff" => "woff",
        "font/woff2" => "woff2",
        "font/ttf" => "ttf",
        "font/otf" => "otf",
        "application/wasm" => "wasm",
        "application/zip" => "zip",
        "application/gzip" | "application/x-gzip" => "gz",
        "application/x-tar" => "tar",
        "application/x-bzip2" => "bz2",
        "application/x-xz" => "xz",
        "application/x-7z-compressed" => "7z",
        "application/vnd.rar" | "application/x-rar-compressed" => "rar",
        "application/octet-stream" => "bin",
        _ => return None,
    };
    Some(ext)
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

fn is_html_extension(ext: &str) -> bool {
    ["html", "htm", "xhtml", "shtml"]
        .iter()
        .any(|html| html.eq_ignore_ascii_case(ext))
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

fn host_folder(url: &Url) -> String {
    let host = url.host_str().unwrap_or("localhost");
    let host = match url.port() {
        Some(port) => format!("{host}_{port}"),
        None => host.to_string(),
    };
    sanitize(&host)
}

fn clean_segment(segment: &str) -> Option<String> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return None;
    }
    let cleaned = sanitize(segment);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect()
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
