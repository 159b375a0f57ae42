use crate::ConfigError;

/// Rate limit value meaning "do not throttle".
pub const UNLIMITED: i64 = 0;

/// Parse a bytes-per-second limit such as `512`, `200k` or `1.5M`.
///
/// Suffixes are binary (`k` = 1024) and case-insensitive; a trailing `b` or
/// `/s` is tolerated. `0` means unlimited.
pub fn parse_rate_limit(raw: &str) -> Result<i64, ConfigError> {
    let invalid = || ConfigError::InvalidRateLimit(raw.to_string());
    let mut text = raw.trim().to_ascii_lowercase();
    if let Some(stripped) = text.strip_suffix("/s") {
        text = stripped.to_string();
    }
    if let Some(stripped) = text.strip_suffix('b') {
        text = stripped.to_string();
    }
    if text.is_empty() {
        return Err(invalid());
    }

    let (number, multiplier) = match text.chars().last() {
        Some('k') => (&text[..text.len() - 1], 1024.0),
        Some('m') => (&text[..text.len() - 1], 1024.0 * 1024.0),
        Some('g') => (&text[..text.len() - 1], 1024.0 * 1024.0 * 1024.0),
        _ => (text.as_str(), 1.0),
    };

    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    let bytes = (value * multiplier).round();
    if bytes > i64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as i64)
}
