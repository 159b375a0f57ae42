use sitegrab_core::{split_pattern_list, PathFilter, SkipReason};
use url::Url;

fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

#[test]
fn reject_suffix_matches_final_segment() {
    let filter = PathFilter::new(&split_pattern_list("jpg, .gif"), &[]).unwrap();
    assert_eq!(
        filter.check(&url("http://example.com/img/photo.jpg")),
        Some(SkipReason::Rejected {
            pattern: "jpg".to_string()
        })
    );
    assert!(filter.check(&url("http://example.com/anim.gif")).is_some());
    assert!(filter.check(&url("http://example.com/jpg/index.html")).is_none());
    assert!(filter.check(&url("http://example.com/jpg/")).is_none());
}

#[test]
fn reject_glob_patterns() {
    let filter = PathFilter::new(&["thumb_*.png".to_string(), "?.css".to_string()], &[]).unwrap();
    assert!(filter.check(&url("http://example.com/thumb_01.png")).is_some());
    assert!(filter.check(&url("http://example.com/a.css")).is_some());
    assert!(filter.check(&url("http://example.com/ab.css")).is_none());
    assert!(filter.check(&url("http://example.com/photo.png")).is_none());
}

#[test]
fn exclude_matches_directory_and_descendants() {
    let filter = PathFilter::new(&[], &["/assets".to_string(), "img/".to_string()]).unwrap();
    assert_eq!(
        filter.check(&url("http://example.com/assets/app.js")),
        Some(SkipReason::Excluded {
            pattern: "/assets".to_string()
        })
    );
    assert!(filter.check(&url("http://example.com/assets/deep/app.js")).is_some());
    assert!(filter.check(&url("http://example.com/img/a.png")).is_some());
    assert!(filter.check(&url("http://example.com/assets2/app.js")).is_none());
    assert!(filter.check(&url("http://example.com/assets")).is_none());
}

#[test]
fn exclude_glob_matches_parent_directory() {
    let filter = PathFilter::new(&[], &["/docs/v*".to_string()]).unwrap();
    assert!(filter.check(&url("http://example.com/docs/v2/index.html")).is_some());
    assert!(filter.check(&url("http://example.com/docs/latest/index.html")).is_none());
}

#[test]
fn invalid_glob_is_a_configuration_error() {
    assert!(PathFilter::new(&["[".to_string()], &[]).is_err());
}

#[test]
fn empty_filter_allows_everything() {
    let filter = PathFilter::new::<String>(&[], &[]).unwrap();
    assert!(filter.is_empty());
    assert!(filter.check(&url("http://example.com/anything.jpg")).is_none());
}
