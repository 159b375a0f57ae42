use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use sitegrab_core::plan_path;
use tempfile::NamedTempFile;
use thiserror::Error;
use url::Url;

use crate::fetch::ContentSink;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// How a free name is derived when the wanted one is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuffixStyle {
    /// `file(1).txt`, `file(2).txt`, ...
    #[default]
    Parenthesized,
    /// `file1.txt`, `file2.txt`, ...
    Appended,
}

impl SuffixStyle {
    fn apply(self, stem: &str, extension: Option<&str>, counter: u32) -> String {
        let stem = match self {
            SuffixStyle::Parenthesized => format!("{stem}({counter})"),
            SuffixStyle::Appended => format!("{stem}{counter}"),
        };
        match extension {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        }
    }
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// First name in `dir` that does not exist yet: `wanted` itself, then
/// suffixed variants counting up from 1.
pub fn unique_file_name(dir: &Path, wanted: &str, style: SuffixStyle) -> String {
    candidate_names(wanted, style)
        .find(|name| !dir.join(name).exists())
        .unwrap_or_else(|| wanted.to_string())
}

/// Create a file under a name not taken yet, re-checking at creation time so
/// concurrent callers never share a file.
pub fn create_unique_file(
    dir: &Path,
    wanted: &str,
    style: SuffixStyle,
) -> io::Result<(PathBuf, File)> {
    for name in candidate_names(wanted, style) {
        let path = dir.join(&name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {wanted} in {}", dir.display()),
    ))
}

fn candidate_names(wanted: &str, style: SuffixStyle) -> impl Iterator<Item = String> + '_ {
    let (stem, extension) = match wanted.rfind('.') {
        Some(idx) if idx > 0 => (&wanted[..idx], Some(&wanted[idx + 1..])),
        _ => (wanted, None),
    };
    std::iter::once(wanted.to_string())
        .chain((1..u32::MAX).map(move |counter| style.apply(stem, extension, counter)))
}

/// Mirror destination for `url` under `root`, named after the response's
/// content type.
pub fn planned_destination(root: &Path, url: &Url, headers: &HeaderMap) -> PathBuf {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    plan_path(url, content_type, root)
}

/// Create or truncate the file at `path`, creating its directories first.
pub fn open_planned_sink(path: PathBuf) -> io::Result<ContentSink> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;
    Ok(ContentSink::new(path, tokio::fs::File::from_std(file)))
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}
