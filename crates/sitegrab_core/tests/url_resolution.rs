use pretty_assertions::assert_eq;
use sitegrab_core::{normalize, resolve, same_host, UrlError};

#[test]
fn normalize_collapses_repeated_separators() {
    let url = normalize("https://example.com///a//b").unwrap();
    assert_eq!(url.as_str(), "https://example.com/a/b");
}

#[test]
fn normalize_defaults_scheme_to_http() {
    assert_eq!(
        normalize("example.com/docs").unwrap().as_str(),
        "http://example.com/docs"
    );
    assert_eq!(
        normalize("localhost:8080/x").unwrap().as_str(),
        "http://localhost:8080/x"
    );
    assert_eq!(
        normalize("//cdn.example.com/lib.js").unwrap().as_str(),
        "http://cdn.example.com/lib.js"
    );
}

#[test]
fn normalize_keeps_two_separators_after_file_scheme() {
    let url = normalize("file:///tmp//site///index.html").unwrap();
    assert_eq!(url.as_str(), "file:///tmp/site/index.html");
}

#[test]
fn normalize_rejects_opaque_urls() {
    assert!(matches!(
        normalize("mailto:someone@example.com"),
        Err(UrlError::Unsupported(_))
    ));
    assert!(matches!(
        normalize("javascript:void(0)"),
        Err(UrlError::Unsupported(_))
    ));
    assert_eq!(normalize("   "), Err(UrlError::Empty));
}

#[test]
fn resolve_returns_absolute_candidates_normalized() {
    let url = resolve("http://example.com/a/", "https://other.org//x//y.png").unwrap();
    assert_eq!(url.as_str(), "https://other.org/x/y.png");
}

#[test]
fn resolve_relative_against_directory_of_base() {
    assert_eq!(
        resolve("http://example.com/a/b", "c.png").unwrap().as_str(),
        "http://example.com/a/c.png"
    );
    assert_eq!(
        resolve("http://example.com/a/b/", "c.png").unwrap().as_str(),
        "http://example.com/a/b/c.png"
    );
    assert_eq!(
        resolve("http://example.com", "c.png").unwrap().as_str(),
        "http://example.com/c.png"
    );
    assert_eq!(
        resolve("http://example.com/a/b", "/root.css").unwrap().as_str(),
        "http://example.com/root.css"
    );
    assert_eq!(
        resolve("http://example.com/a/b/c", "../up.js").unwrap().as_str(),
        "http://example.com/a/up.js"
    );
}

#[test]
fn resolve_is_idempotent_for_absolute_results() {
    let base = "http://example.com/docs/page";
    for candidate in ["img/a.png", "/b.html", "//cdn.example.com/x.js", "?q=1"] {
        let once = resolve(base, candidate).unwrap();
        let twice = resolve(base, once.as_str()).unwrap();
        assert_eq!(once, twice, "candidate {candidate}");
    }
}

#[test]
fn same_host_ignores_scheme_and_fails_closed() {
    assert!(same_host("http://example.com/a", "https://example.com/b"));
    assert!(same_host("example.com", "http://EXAMPLE.com/"));
    assert!(!same_host("http://example.com", "http://other.com"));
    assert!(!same_host("mailto:x@example.com", "http://example.com"));
}
