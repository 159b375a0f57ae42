use sitegrab_core::{parse_rate_limit, ConfigError, UNLIMITED};

#[test]
fn parses_plain_and_suffixed_limits() {
    assert_eq!(parse_rate_limit("512"), Ok(512));
    assert_eq!(parse_rate_limit("200k"), Ok(200 * 1024));
    assert_eq!(parse_rate_limit("2M"), Ok(2 * 1024 * 1024));
    assert_eq!(parse_rate_limit("1.5m"), Ok(1_572_864));
    assert_eq!(parse_rate_limit("64KB/s"), Ok(64 * 1024));
    assert_eq!(parse_rate_limit("0"), Ok(UNLIMITED));
}

#[test]
fn rejects_malformed_limits() {
    for raw in ["", "fast", "-5k", "k", "1..2M"] {
        assert_eq!(
            parse_rate_limit(raw),
            Err(ConfigError::InvalidRateLimit(raw.to_string())),
            "input {raw:?}"
        );
    }
}
