use glob::Pattern;
use url::Url;

use crate::ConfigError;

/// Why a candidate URL was not fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Rejected { pattern: String },
    Excluded { pattern: String },
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Glob(Pattern),
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    matcher: Matcher,
}

impl CompiledPattern {
    fn compile(source: &str, literal: String) -> Result<Self, ConfigError> {
        let matcher = if has_glob_syntax(source) {
            let pattern = Pattern::new(&literal).map_err(|err| ConfigError::InvalidPattern {
                pattern: source.to_string(),
                message: err.to_string(),
            })?;
            Matcher::Glob(pattern)
        } else {
            Matcher::Literal(literal)
        };
        Ok(Self {
            source: source.to_string(),
            matcher,
        })
    }
}

/// Compiled reject (file name) and exclude (directory) patterns.
///
/// Reject patterns are tested against the last path segment: plain entries are
/// suffixes (`jpg`, `.gif`), entries containing `*`, `?` or `[` are globs.
/// Exclude patterns are tested against the parent directory: plain entries
/// exclude the directory and everything below it, globs must match it.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    reject: Vec<CompiledPattern>,
    exclude: Vec<CompiledPattern>,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(reject: &[S], exclude: &[S]) -> Result<Self, ConfigError> {
        let reject = reject
            .iter()
            .map(AsRef::as_ref)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| CompiledPattern::compile(p, p.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = exclude
            .iter()
            .map(AsRef::as_ref)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| CompiledPattern::compile(p, directory_form(p)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { reject, exclude })
    }

    pub fn is_empty(&self) -> bool {
        self.reject.is_empty() && self.exclude.is_empty()
    }

    /// First pattern that rules `url` out, checking reject before exclude.
    pub fn check(&self, url: &Url) -> Option<SkipReason> {
        let path = url.path();
        let (directory, file_name) = match path.rfind('/') {
            Some(idx) => (&path[..idx], &path[idx + 1..]),
            None => ("", path),
        };
        let directory = if directory.is_empty() { "/" } else { directory };

        if !file_name.is_empty() {
            for pattern in &self.reject {
                let hit = match &pattern.matcher {
                    Matcher::Literal(suffix) => file_name.ends_with(suffix.as_str()),
                    Matcher::Glob(glob) => glob.matches(file_name),
                };
                if hit {
                    return Some(SkipReason::Rejected {
                        pattern: pattern.source.clone(),
                    });
                }
            }
        }

        for pattern in &self.exclude {
            let hit = match &pattern.matcher {
                Matcher::Literal(prefix) => {
                    prefix == "/"
                        || directory == prefix
                        || directory
                            .strip_prefix(prefix.as_str())
                            .is_some_and(|rest| rest.starts_with('/'))
                }
                Matcher::Glob(glob) => glob.matches(directory),
            };
            if hit {
                return Some(SkipReason::Excluded {
                    pattern: pattern.source.clone(),
                });
            }
        }
        None
    }
}

/// Split a comma separated option value (`jpg,gif`) into entries.
pub fn split_pattern_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_glob_syntax(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn directory_form(pattern: &str) -> String {
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
