use url::Url;

use crate::UrlError;

/// Scheme assumed when the input names a host without one.
pub const DEFAULT_SCHEME: &str = "http";

/// Parse `raw`, defaulting the scheme to [`DEFAULT_SCHEME`], and collapse runs
/// of `/` in the path to a single separator.
///
/// Opaque URLs (`mailto:`, `javascript:`, `data:` ...) and host-less URLs other
/// than `file:` are rejected as unsupported.
pub fn normalize(raw: &str) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }
    let url = parse_with_default_scheme(trimmed)?;
    normalize_parsed(url)
}

/// Resolve `candidate` against `base`.
///
/// Absolute candidates are only normalized. Relative candidates follow RFC 3986
/// reference resolution: the base is read as the directory holding its last
/// path segment, and an empty base path counts as `/`. No trailing `/` is
/// added to the base first, so `/a/b` joined with `c` gives `/a/c`.
pub fn resolve(base: &str, candidate: &str) -> Result<Url, UrlError> {
    let candidate = candidate.trim();
    if is_absolute(candidate) {
        return normalize(candidate);
    }
    let base = normalize(base)?;
    resolve_against(&base, candidate)
}

/// Same as [`resolve`] for a base that is already parsed and normalized.
pub fn resolve_against(base: &Url, candidate: &str) -> Result<Url, UrlError> {
    let candidate = candidate.trim();
    if is_absolute(candidate) {
        return normalize(candidate);
    }
    let joined = base.join(candidate).map_err(|source| UrlError::Parse {
        url: candidate.to_string(),
        source,
    })?;
    normalize_parsed(joined)
}

/// Compare the host components of two URLs, ignoring scheme and port.
/// Returns false when either side does not parse.
pub fn same_host(first: &str, second: &str) -> bool {
    match (normalize(first), normalize(second)) {
        (Ok(a), Ok(b)) => match (a.host_str(), b.host_str()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        },
        _ => false,
    }
}

fn is_absolute(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => !(url.cannot_be_a_base() && looks_like_host_and_port(candidate)),
        Err(_) => false,
    }
}

fn parse_with_default_scheme(raw: &str) -> Result<Url, UrlError> {
    let parsed = if let Some(rest) = raw.strip_prefix("//") {
        Url::parse(&format!("{DEFAULT_SCHEME}://{rest}"))
    } else {
        match Url::parse(raw) {
            Ok(url) if url.cannot_be_a_base() && looks_like_host_and_port(raw) => {
                Url::parse(&format!("{DEFAULT_SCHEME}://{raw}"))
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&format!("{DEFAULT_SCHEME}://{raw}"))
            }
            other => other,
        }
    };
    parsed.map_err(|source| UrlError::Parse {
        url: raw.to_string(),
        source,
    })
}

// `localhost:8080/x` parses as scheme `localhost` with an opaque path.
fn looks_like_host_and_port(raw: &str) -> bool {
    raw.split_once(':')
        .map(|(_, rest)| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.cannot_be_a_base() {
        return Err(UrlError::Unsupported(url.to_string()));
    }
    if url.scheme() != "file" && url.host_str().is_none() {
        return Err(UrlError::Unsupported(url.to_string()));
    }
    let collapsed = collapse_separators(url.path());
    if collapsed != url.path() {
        url.set_path(&collapsed);
    }
    Ok(url)
}

fn collapse_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::collapse_separators;

    #[test]
    fn collapses_runs_but_keeps_single_separators() {
        assert_eq!(collapse_separators("///a//b/"), "/a/b/");
        assert_eq!(collapse_separators("/a/b"), "/a/b");
        assert_eq!(collapse_separators(""), "");
    }
}
