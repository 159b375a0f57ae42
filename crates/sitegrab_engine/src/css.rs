//! `url(...)` references in stylesheets.
//!
//! A small scanner rather than a full tokenizer: it skips comments and string
//! literals, recognizes `url(` case-insensitively, and accepts the reference
//! bare or wrapped in `'`, `"` or `` ` ``. Tokens with mismatched or nested
//! quotes are ignored.

/// One `url(...)` reference and the byte range of its value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlToken {
    start: usize,
    end: usize,
    quote: Option<u8>,
}

/// Every `url(...)` value in `css`, in source order.
pub fn extract_css_urls(css: &str) -> Vec<String> {
    scan(css)
        .into_iter()
        .map(|token| css[token.start..token.end].trim().to_string())
        .collect()
}

/// Replace each `url(...)` value with `transform(value)`, leaving every other
/// byte untouched.
pub fn rewrite_css_urls<F>(css: &str, mut transform: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(css.len());
    let mut copied = 0;
    for token in scan(css) {
        let original = &css[token.start..token.end];
        let value = original.trim();
        let replacement = transform(value);
        if replacement == value {
            continue;
        }
        out.push_str(&css[copied..token.start]);
        match token.quote {
            None if needs_quotes(&replacement) => {
                out.push('"');
                out.push_str(&replacement.replace('"', "%22"));
                out.push('"');
            }
            _ => out.push_str(&replacement),
        }
        copied = token.end;
    }
    out.push_str(&css[copied..]);
    out
}

fn needs_quotes(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | '`'))
}

fn is_quote(byte: u8) -> bool {
    matches!(byte, b'"' | b'\'' | b'`')
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'-'
}

fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || byte >= 0x80
}

fn scan(css: &str) -> Vec<UrlToken> {
    let bytes = css.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match css[i + 2..].find("*/") {
                    Some(offset) => i + 2 + offset + 2,
                    None => bytes.len(),
                };
            }
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'\\' => i += 2,
            byte if is_ident_start(byte) => {
                let start = i;
                while i < bytes.len() && is_ident_continue(bytes[i]) {
                    i += 1;
                }
                if css[start..i].eq_ignore_ascii_case("url") && bytes.get(i) == Some(&b'(') {
                    match parse_url_body(bytes, i + 1) {
                        Some((token, next)) => {
                            tokens.push(token);
                            i = next;
                        }
                        None => i += 1,
                    }
                }
            }
            _ => i += 1,
        }
    }
    tokens
}

/// Index just past the string literal opening at `open`.
fn skip_string(bytes: &[u8], open: usize) -> usize {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            byte if byte == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Parse the inside of `url(` starting at `i`, returning the token and the
/// index just past `)`.
fn parse_url_body(bytes: &[u8], i: usize) -> Option<(UrlToken, usize)> {
    let i = skip_whitespace(bytes, i);
    let first = *bytes.get(i)?;

    if is_quote(first) {
        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && bytes[end] != first {
            if bytes[end] == b'\\' {
                end += 1;
            }
            end += 1;
        }
        if end >= bytes.len() {
            return None;
        }
        let value = &bytes[start..end];
        if value.iter().all(u8::is_ascii_whitespace) || value.iter().copied().any(is_quote) {
            return None;
        }
        let close = skip_whitespace(bytes, end + 1);
        if bytes.get(close) != Some(&b')') {
            return None;
        }
        return Some((
            UrlToken {
                start,
                end,
                quote: Some(first),
            },
            close + 1,
        ));
    }

    let start = i;
    let mut end = i;
    while end < bytes.len() && bytes[end] != b')' {
        let byte = bytes[end];
        if is_quote(byte) || byte == b'(' {
            return None;
        }
        if byte.is_ascii_whitespace() {
            let after = skip_whitespace(bytes, end);
            if bytes.get(after) != Some(&b')') {
                return None;
            }
            return Some((
                UrlToken {
                    start,
                    end,
                    quote: None,
                },
                after + 1,
            ));
        }
        end += 1;
    }
    if end >= bytes.len() || end == start {
        return None;
    }
    Some((
        UrlToken {
            start,
            end,
            quote: None,
        },
        end + 1,
    ))
}
