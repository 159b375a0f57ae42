use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use sitegrab_engine::{
    FailureKind, FetchSettings, MirrorCrawler, MirrorOptions, MirrorSession, ReqwestFetcher,
};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: &str = r#"<!doctype html>
<html><head><link rel="stylesheet" href="/style.css"></head>
<body>
  <a href="/wget">docs</a>
  <a href="/wget#usage">usage</a>
  <img src="/img/logo.png">
  <a href="http://other.example/elsewhere">away</a>
</body></html>"#;

const DOCS: &str = r#"<!doctype html>
<html><body>
  <a href="/">home</a>
  <img src="/img/logo.png">
  <a href="/photos/skip.jpg">photo</a>
</body></html>"#;

async fn mount(server: &MockServer, route: &str, template: ResponseTemplate, hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .expect(hits)
        .mount(server)
        .await;
}

async fn site() -> MockServer {
    let server = MockServer::start().await;
    let html = |body: &str| ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html");
    mount(&server, "/", html(HOME), 1).await;
    mount(&server, "/wget", html(DOCS), 1).await;
    mount(
        &server,
        "/img/logo.png",
        ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"),
        1,
    )
    .await;
    mount(
        &server,
        "/style.css",
        ResponseTemplate::new(200)
            .set_body_raw("body{background:url(/img/bg.png)}", "text/css"),
        1,
    )
    .await;
    mount(&server, "/favicon.ico", ResponseTemplate::new(404), 1).await;
    mount(&server, "/photos/skip.jpg", ResponseTemplate::new(200), 0).await;
    server
}

fn host_dir(root: &std::path::Path, server: &MockServer) -> PathBuf {
    let url = Url::parse(&server.uri()).unwrap();
    root.join(format!(
        "{}_{}",
        url.host_str().unwrap(),
        url.port().unwrap()
    ))
}

fn crawler() -> MirrorCrawler {
    MirrorCrawler::new(Arc::new(ReqwestFetcher::new(FetchSettings::default())))
}

#[tokio::test]
async fn mirrors_each_resource_once_into_host_folders() {
    let server = site().await;
    let temp = TempDir::new().unwrap();
    let session = Arc::new(
        MirrorSession::new(MirrorOptions {
            root: temp.path().to_path_buf(),
            reject: vec!["jpg".to_string()],
            ..MirrorOptions::default()
        })
        .unwrap(),
    );

    let report = crawler().mirror(&server.uri(), session).await.unwrap();
    assert_eq!(report.fetched, 4);
    assert_eq!(report.failed, 0, "a missing favicon is not an error");
    assert_eq!(report.skipped, 2);
    assert!(!report.had_errors());

    let host = host_dir(temp.path(), &server);
    assert!(host.join("index.html").is_file());
    assert!(host.join("wget").join("index.html").is_file());
    assert!(host.join("style.css").is_file());
    assert_eq!(
        fs::read(host.join("img").join("logo.png")).unwrap(),
        vec![0x89, b'P', b'N', b'G']
    );
    assert!(!host.join("favicon.ico").exists());
    assert!(!host.join("img").join("bg.png").exists());
    assert_eq!(
        fs::read_to_string(host.join("index.html")).unwrap(),
        HOME,
        "pages stay untouched without link conversion"
    );
}

#[tokio::test]
async fn converted_pages_point_at_local_copies() {
    let server = site().await;
    let temp = TempDir::new().unwrap();
    let session = Arc::new(
        MirrorSession::new(MirrorOptions {
            root: temp.path().to_path_buf(),
            reject: vec!["jpg".to_string()],
            convert_links: true,
            concurrency: 2,
            ..MirrorOptions::default()
        })
        .unwrap(),
    );

    let report = crawler().mirror(&server.uri(), session).await.unwrap();
    assert_eq!(report.fetched, 4);
    assert_eq!(report.converted_pages, 3, "the image is not a converted page");

    let host = host_dir(temp.path(), &server);
    let home = fs::read_to_string(host.join("index.html")).unwrap();
    assert!(home.contains(r#"href="style.css""#), "{home}");
    assert!(home.contains(r#"href="wget/index.html""#), "{home}");
    assert!(home.contains(r#"href="wget/index.html#usage""#), "{home}");
    assert!(home.contains(r#"src="img/logo.png""#), "{home}");
    assert!(home.contains(r#"href="http://other.example/elsewhere""#), "{home}");

    let docs = fs::read_to_string(host.join("wget").join("index.html")).unwrap();
    assert!(docs.contains(r#"href="../index.html""#), "{docs}");
    assert!(docs.contains(r#"src="../img/logo.png""#), "{docs}");
    let skipped = format!(r#"href="{}/photos/skip.jpg""#, server.uri());
    assert!(docs.contains(&skipped), "{docs}");

    let css = fs::read_to_string(host.join("style.css")).unwrap();
    assert_eq!(
        css,
        format!("body{{background:url({}/img/bg.png)}}", server.uri())
    );
}

#[tokio::test]
async fn shared_links_and_aliases_are_fetched_and_written_once() {
    let server = MockServer::start().await;
    let html = |body: String| ResponseTemplate::new(200).set_body_raw(body, "text/html");
    let sibling = concat!(
        r#"<link rel="stylesheet" href="/shared.css">"#,
        r#"<a href="/x">x</a><a href="/x/">x/</a>"#
    );
    let pages = ["/p1", "/p2", "/p3", "/p4", "/p5", "/p6"];
    let home: String = pages
        .iter()
        .map(|page| format!(r#"<a href="{page}">{page}</a>"#))
        .collect();
    mount(&server, "/", html(home), 1).await;
    for page in pages {
        mount(&server, page, html(sibling.to_string()), 1).await;
    }
    mount(
        &server,
        "/shared.css",
        ResponseTemplate::new(200).set_body_raw("p{}", "text/css"),
        1,
    )
    .await;
    let long_body = "A".repeat(400_000);
    let short_body = "B".repeat(300_000);
    mount(&server, "/x", html(long_body.clone()), 1).await;
    mount(&server, "/x/", html(short_body.clone()), 1).await;
    mount(&server, "/favicon.ico", ResponseTemplate::new(404), 1).await;

    let temp = TempDir::new().unwrap();
    let session = Arc::new(
        MirrorSession::new(MirrorOptions {
            root: temp.path().to_path_buf(),
            concurrency: 8,
            ..MirrorOptions::default()
        })
        .unwrap(),
    );
    let report = crawler().mirror(&server.uri(), session).await.unwrap();
    assert_eq!(report.fetched, 1 + pages.len() + 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 2, "one alias and the favicon");

    let stored = fs::read_to_string(host_dir(temp.path(), &server).join("x").join("index.html"))
        .unwrap();
    assert!(
        stored == long_body || stored == short_body,
        "x/index.html mixes responses: {} bytes",
        stored.len()
    );
}

#[tokio::test]
async fn depth_limit_stops_at_the_seed() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        ResponseTemplate::new(200).set_body_raw(HOME.to_string(), "text/html"),
        1,
    )
    .await;
    mount(&server, "/wget", ResponseTemplate::new(200), 0).await;

    let temp = TempDir::new().unwrap();
    let session = Arc::new(
        MirrorSession::new(MirrorOptions {
            root: temp.path().to_path_buf(),
            max_depth: Some(0),
            ..MirrorOptions::default()
        })
        .unwrap(),
    );
    let report = crawler().mirror(&server.uri(), session).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn unusable_seed_is_an_error() {
    let session = Arc::new(MirrorSession::new(MirrorOptions::default()).unwrap());
    let err = crawler()
        .mirror("mailto:someone@example.com", session)
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[test]
fn invalid_patterns_fail_session_setup() {
    let result = MirrorSession::new(MirrorOptions {
        reject: vec!["[".to_string()],
        ..MirrorOptions::default()
    });
    assert!(result.is_err());
}
