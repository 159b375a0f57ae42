use std::path::{Component, Path};

use sitegrab_core::{content_kind, resolve_against, ContentKind};
use url::Url;

use crate::css::rewrite_css_urls;
use crate::decode::decode_text_lossy;
use crate::links::HtmlDocument;
use crate::persist::{AtomicFileWriter, PersistError};

/// Relative reference from the page stored at `from_file` to `to_file`,
/// with `/` separators and percent-encoded so it survives as an href.
pub fn relative_link(from_file: &Path, to_file: &Path) -> String {
    let from_dir: Vec<_> = normal_components(from_file.parent().unwrap_or(Path::new("")));
    let target: Vec<_> = normal_components(to_file);

    let common = from_dir
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat_n("..".to_string(), from_dir.len() - common));
    parts.extend(target[common..].iter().map(|part| encode_component(part)));
    parts.join("/")
}

fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn encode_component(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => out.push_str("%25"),
            '?' => out.push_str("%3F"),
            '#' => out.push_str("%23"),
            ' ' => out.push_str("%20"),
            '"' => out.push_str("%22"),
            _ => out.push(c),
        }
    }
    out
}

/// What a link should point at after conversion.
pub trait LinkTargets {
    /// `Some(Some(path))` for a stored resource, `Some(None)` for one that was
    /// attempted but not stored, `None` for URLs never fetched.
    fn stored_path(&self, url: &Url) -> Option<Option<std::path::PathBuf>>;
}

/// Replacement for `raw` as found on the page stored at `page_path`.
///
/// Stored targets become relative paths (fragment kept); http(s) targets that
/// were not stored become absolute URLs. Fragment-only and non-http links are
/// left alone.
pub fn convert_link(
    targets: &dyn LinkTargets,
    page_url: &Url,
    page_path: &Path,
    raw: &str,
) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let resolved = resolve_against(page_url, raw).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    let mut key = resolved.clone();
    key.set_fragment(None);
    match targets.stored_path(&key) {
        Some(Some(path)) => {
            let mut relative = relative_link(page_path, &path);
            if let Some(fragment) = resolved.fragment() {
                relative.push('#');
                relative.push_str(fragment);
            }
            Some(relative)
        }
        _ => Some(resolved.to_string()),
    }
}

/// Rewrite the stored page at `page_path` in place so its links point at
/// local copies. Returns the number of links changed; the file is untouched
/// when nothing changed.
pub fn convert_stored_page(
    targets: &dyn LinkTargets,
    page_url: &Url,
    page_path: &Path,
    content_type: Option<&str>,
) -> Result<usize, PersistError> {
    let bytes = std::fs::read(page_path)?;
    let decoded = decode_text_lossy(&bytes, content_type);

    let mut changed = 0;
    let rewritten = match content_kind(content_type) {
        ContentKind::Html => {
            let mut document = HtmlDocument::parse(&decoded.text);
            changed = document
                .rewrite_links(|raw| convert_link(targets, page_url, page_path, raw));
            document.render()
        }
        ContentKind::Css => rewrite_css_urls(&decoded.text, |raw| {
            match convert_link(targets, page_url, page_path, raw) {
                Some(replacement) if replacement != raw => {
                    changed += 1;
                    replacement
                }
                _ => raw.to_string(),
            }
        }),
        ContentKind::Script | ContentKind::Other => return Ok(0),
    };
    if changed == 0 {
        return Ok(0);
    }

    let (Some(dir), Some(name)) = (page_path.parent(), page_path.file_name()) else {
        return Ok(0);
    };
    AtomicFileWriter::new(dir.to_path_buf())
        .write(&name.to_string_lossy(), &decoded.encode(&rewritten))?;
    Ok(changed)
}
