use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use engine_logging::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};
use futures_util::future::BoxFuture;
use reqwest::header::HeaderMap;
use sitegrab_core::{
    content_kind, normalize, resolve_against, same_host, ConfigError, ContentKind, PathFilter,
    SkipReason,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::convert::{convert_stored_page, LinkTargets};
use crate::css::extract_css_urls;
use crate::decode::decode_text_lossy;
use crate::fetch::{success_status_codes, FetchConfig, Fetcher, SinkFactory};
use crate::governor::RateListener;
use crate::js::extract_js_module_links;
use crate::links::HtmlDocument;
use crate::persist::{open_planned_sink, planned_destination};
use crate::{FailureKind, FetchError, FetchResult};

pub const DEFAULT_CONCURRENCY: usize = 16;

/// Called once per stored resource with its URL and local path.
pub type SavedCallback = Arc<dyn Fn(&str, &Path) + Send + Sync>;

#[derive(Clone)]
pub struct MirrorOptions {
    /// Directory the host folders are created in.
    pub root: PathBuf,
    pub convert_links: bool,
    /// File name patterns: suffixes or globs.
    pub reject: Vec<String>,
    /// Directory patterns: prefixes or globs.
    pub exclude: Vec<String>,
    pub rate_limit: i64,
    /// Simultaneous transfers; zero is treated as one.
    pub concurrency: usize,
    /// Link hops from the seed; `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Follow links to other hosts.
    pub span_hosts: bool,
    /// Also follow references found in stylesheets and scripts.
    pub follow_assets: bool,
    pub on_saved: Option<SavedCallback>,
    pub on_rate: Option<RateListener>,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            convert_links: false,
            reject: Vec::new(),
            exclude: Vec::new(),
            rate_limit: 0,
            concurrency: DEFAULT_CONCURRENCY,
            max_depth: None,
            span_hosts: false,
            follow_assets: false,
            on_saved: None,
            on_rate: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub fetched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub converted_pages: usize,
}

impl MirrorReport {
    pub fn had_errors(&self) -> bool {
        self.failed > 0
    }
}

/// A page whose links pointed at resources still in flight when it finished.
struct DeferredPage {
    url: Url,
    path: PathBuf,
    content_type: Option<String>,
}

/// URLs and local files already taken by some task.
#[derive(Default)]
struct Claims {
    urls: HashSet<String>,
    /// Local file to the URL whose response is written there.
    files: HashMap<PathBuf, String>,
}

/// How one crawl task's fetch ended.
enum Fetched {
    Stored(FetchResult),
    /// The URL maps to a file another URL already writes.
    SameFile(PathBuf),
    Failed(FetchError),
}

/// A link found in a stored resource.
struct Discovered {
    url: Url,
    /// Added by the crawler rather than found in the document.
    guessed: bool,
}

/// State shared by every task of one mirror run.
///
/// A URL is fetched at most once: [`MirrorSession::claim`] checks and records
/// it under a single lock. Each local file is likewise written by one URL
/// only. Claimed URLs become settled when their fetch finishes, stored or not.
pub struct MirrorSession {
    options: MirrorOptions,
    filter: PathFilter,
    claims: Mutex<Claims>,
    settled: Mutex<HashMap<String, Option<PathBuf>>>,
    deferred: Mutex<Vec<DeferredPage>>,
    fetched: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    converted: AtomicUsize,
    transfer_slots: Semaphore,
    cancel: CancellationToken,
}

impl MirrorSession {
    pub fn new(options: MirrorOptions) -> Result<Self, ConfigError> {
        let filter = PathFilter::new(&options.reject, &options.exclude)?;
        let transfer_slots = Semaphore::new(options.concurrency.max(1));
        Ok(Self {
            options,
            filter,
            claims: Mutex::new(Claims::default()),
            settled: Mutex::new(HashMap::new()),
            deferred: Mutex::new(Vec::new()),
            fetched: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            converted: AtomicUsize::new(0),
            transfer_slots,
            cancel: CancellationToken::new(),
        })
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record `url` as visited. False when some task already claimed it.
    pub fn claim(&self, url: &Url) -> bool {
        lock(&self.claims).urls.insert(url.as_str().to_string())
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        lock(&self.claims).urls.contains(url.as_str())
    }

    /// Reserve `path` for the response of `url`. Fails with the owning URL
    /// when a different URL already writes that file.
    fn claim_file(&self, path: &Path, url: &Url) -> Result<(), String> {
        let mut claims = lock(&self.claims);
        match claims.files.get(path) {
            Some(owner) if owner != url.as_str() => Err(owner.clone()),
            Some(_) => Ok(()),
            None => {
                claims.files.insert(path.to_path_buf(), url.as_str().to_string());
                Ok(())
            }
        }
    }

    /// Claimed but not settled yet.
    fn is_in_flight(&self, url: &Url) -> bool {
        self.is_visited(url) && !lock(&self.settled).contains_key(url.as_str())
    }

    fn settle(&self, url: &Url, path: Option<PathBuf>) {
        lock(&self.settled).insert(url.as_str().to_string(), path);
    }

    pub fn report(&self) -> MirrorReport {
        MirrorReport {
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            converted_pages: self.converted.load(Ordering::Relaxed),
        }
    }

    fn record_failure(&self, url: &Url, err: &FetchError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.settle(url, None);
        match err.kind {
            FailureKind::Cancelled => engine_debug!("{url}: cancelled"),
            _ => engine_warn!("{url}: {err}"),
        }
    }
}

impl LinkTargets for MirrorSession {
    fn stored_path(&self, url: &Url) -> Option<Option<PathBuf>> {
        lock(&self.settled).get(url.as_str()).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-run values every crawl task needs.
struct CrawlScope {
    session: Arc<MirrorSession>,
    seed: Url,
}

/// Recursive site downloader.
///
/// Each URL is handled by its own task: claim, fetch, store, then spawn one
/// task per newly discovered link and wait for all of them. A parent's
/// completion therefore implies its whole subtree is done.
#[derive(Clone)]
pub struct MirrorCrawler {
    fetcher: Arc<dyn Fetcher>,
}

impl MirrorCrawler {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Download `seed` and everything reachable from it. Individual resource
    /// failures are counted in the report; only an unusable seed is an error.
    pub async fn mirror(
        &self,
        seed: &str,
        session: Arc<MirrorSession>,
    ) -> Result<MirrorReport, FetchError> {
        let seed = normalize(seed)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(FetchError::new(
                FailureKind::InvalidUrl,
                format!("unsupported scheme: {}", seed.scheme()),
            ));
        }
        engine_info!("mirroring {seed} into {}", session.options.root.display());

        let scope = Arc::new(CrawlScope {
            session: Arc::clone(&session),
            seed: seed.clone(),
        });
        self.clone().visit(scope, seed, 0, false).await;

        if session.options.convert_links {
            self.convert_deferred(&session).await;
        }
        let report = session.report();
        engine_info!(
            "mirror finished: {} fetched, {} failed, {} skipped",
            report.fetched,
            report.failed,
            report.skipped
        );
        Ok(report)
    }

    fn visit(
        self,
        scope: Arc<CrawlScope>,
        url: Url,
        depth: usize,
        guessed: bool,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let session = Arc::clone(&scope.session);
            if session.cancel.is_cancelled() {
                return;
            }
            if !session.claim(&url) {
                engine_trace!("{url}: already visited");
                return;
            }

            let fetched = {
                let Ok(_slot) = session.transfer_slots.acquire().await else {
                    return;
                };
                self.fetch_one(&session, &url).await
            };
            let result = match fetched {
                Fetched::Stored(result) => result,
                Fetched::SameFile(path) => {
                    engine_debug!("{url}: same local file as another link, {}", path.display());
                    session.skipped.fetch_add(1, Ordering::Relaxed);
                    session.settle(&url, Some(path));
                    return;
                }
                Fetched::Failed(err) if guessed => {
                    engine_debug!("{url}: not available: {err}");
                    session.skipped.fetch_add(1, Ordering::Relaxed);
                    session.settle(&url, None);
                    return;
                }
                Fetched::Failed(err) => {
                    session.record_failure(&url, &err);
                    return;
                }
            };
            session.fetched.fetch_add(1, Ordering::Relaxed);
            session.settle(&url, Some(result.local_file.clone()));
            if let Some(on_saved) = &session.options.on_saved {
                on_saved(url.as_str(), &result.local_file);
            }

            let kind = content_kind(result.content_type());
            let follow = match kind {
                ContentKind::Html => true,
                ContentKind::Css | ContentKind::Script => session.options.follow_assets,
                ContentKind::Other => false,
            };
            let convert = session.options.convert_links
                && matches!(kind, ContentKind::Html | ContentKind::Css);
            let depth_left = session.options.max_depth.is_none_or(|max| depth < max);
            if !follow || !depth_left {
                if convert {
                    self.convert_page(&session, &url, &result).await;
                }
                return;
            }

            let children = match discover_links(&scope, &url, &result, kind).await {
                Ok(children) => children,
                Err(err) => {
                    engine_warn!("{url}: cannot scan stored copy: {err}");
                    return;
                }
            };
            engine_trace!("{url}: {} new links", children.len());

            let mut tasks = JoinSet::new();
            for child in children {
                let task = self
                    .clone()
                    .visit(Arc::clone(&scope), child.url, depth + 1, child.guessed);
                tasks.spawn(task);
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    engine_error!("crawl task for a link of {url} failed: {err}");
                    session.failed.fetch_add(1, Ordering::Relaxed);
                }
            }

            if convert {
                self.convert_page(&session, &url, &result).await;
            }
        })
    }

    async fn fetch_one(&self, session: &Arc<MirrorSession>, url: &Url) -> Fetched {
        let root = session.options.root.clone();
        let owner = Arc::clone(session);
        let taken: Arc<Mutex<Option<PathBuf>>> = Arc::default();
        let taken_slot = Arc::clone(&taken);
        let sink_factory: SinkFactory = Arc::new(move |url: &Url, headers: &HeaderMap| {
            let path = planned_destination(&root, url, headers);
            if let Err(other) = owner.claim_file(&path, url) {
                let message = format!("{} is written by {other}", path.display());
                *lock(&taken_slot) = Some(path);
                return Err(io::Error::new(io::ErrorKind::AlreadyExists, message));
            }
            open_planned_sink(path)
        });
        let config = FetchConfig {
            sink_factory: Some(sink_factory),
            rate_limit: session.options.rate_limit,
            on_rate: session.options.on_rate.clone(),
            allowed_status_codes: success_status_codes(),
            cancel: Some(session.cancel.clone()),
            ..FetchConfig::default()
        };
        match self.fetcher.fetch(url.as_str(), &config).await {
            Ok(result) => Fetched::Stored(result),
            Err(err) => match lock(&taken).take() {
                Some(path) => Fetched::SameFile(path),
                None => Fetched::Failed(err),
            },
        }
    }

    /// Rewrite a stored page now, or defer it when some link target is still
    /// being fetched by another task.
    async fn convert_page(&self, session: &Arc<MirrorSession>, url: &Url, result: &FetchResult) {
        let page = DeferredPage {
            url: url.clone(),
            path: result.local_file.clone(),
            content_type: result.content_type().map(str::to_string),
        };
        let waiting = match page_links(&page).await {
            Ok(links) => links.iter().any(|raw| {
                resolve_against(url, raw)
                    .map(|mut target| {
                        target.set_fragment(None);
                        session.is_in_flight(&target)
                    })
                    .unwrap_or(false)
            }),
            Err(err) => {
                engine_warn!("{url}: cannot read stored copy for conversion: {err}");
                return;
            }
        };
        if waiting {
            engine_debug!("{url}: link conversion deferred");
            lock(&session.deferred).push(page);
            return;
        }
        rewrite_page(Arc::clone(session), page).await;
    }

    async fn convert_deferred(&self, session: &Arc<MirrorSession>) {
        let pending: Vec<DeferredPage> = std::mem::take(&mut *lock(&session.deferred));
        for page in pending {
            rewrite_page(Arc::clone(session), page).await;
        }
    }
}

async fn rewrite_page(session: Arc<MirrorSession>, page: DeferredPage) {
    let url = page.url.clone();
    let rewritten = tokio::task::spawn_blocking(move || {
        convert_stored_page(
            session.as_ref(),
            &page.url,
            &page.path,
            page.content_type.as_deref(),
        )
        .map(|changed| (session, changed))
    })
    .await;
    match rewritten {
        Ok(Ok((session, changed))) => {
            if changed > 0 {
                session.converted.fetch_add(1, Ordering::Relaxed);
            }
            engine_debug!("{url}: {changed} links converted");
        }
        Ok(Err(err)) => engine_error!("{url}: link conversion failed: {err}"),
        Err(err) => engine_error!("{url}: link conversion task failed: {err}"),
    }
}

/// Raw link values of a stored HTML or CSS page.
async fn page_links(page: &DeferredPage) -> io::Result<Vec<String>> {
    let bytes = tokio::fs::read(&page.path).await?;
    let content_type = page.content_type.as_deref();
    let decoded = decode_text_lossy(&bytes, content_type);
    Ok(match content_kind(content_type) {
        ContentKind::Html => HtmlDocument::parse(&decoded.text)
            .links()
            .into_iter()
            .map(|link| link.url)
            .collect(),
        ContentKind::Css => extract_css_urls(&decoded.text),
        ContentKind::Script => extract_js_module_links(&decoded.text),
        ContentKind::Other => Vec::new(),
    })
}

/// Links of a freshly stored resource that this run should fetch next, in
/// document order, resolved and without fragments.
async fn discover_links(
    scope: &CrawlScope,
    url: &Url,
    result: &FetchResult,
    kind: ContentKind,
) -> io::Result<Vec<Discovered>> {
    let page = DeferredPage {
        url: url.clone(),
        path: result.local_file.clone(),
        content_type: result.content_type().map(str::to_string),
    };
    let mut raw_links: Vec<(String, bool)> = page_links(&page)
        .await?
        .into_iter()
        .map(|raw| (raw, false))
        .collect();
    if kind == ContentKind::Html {
        raw_links.push(("/favicon.ico".to_string(), true));
    }

    let session = &scope.session;
    let mut seen = HashSet::new();
    let mut children = Vec::new();
    for (raw, guessed) in raw_links {
        let Ok(mut target) = resolve_against(url, &raw) else {
            engine_trace!("{url}: unusable link {raw}");
            continue;
        };
        target.set_fragment(None);
        if !matches!(target.scheme(), "http" | "https") {
            continue;
        }
        if !session.options.span_hosts && !same_host(scope.seed.as_str(), target.as_str()) {
            continue;
        }
        if !seen.insert(target.as_str().to_string()) || session.is_visited(&target) {
            continue;
        }
        if let Some(reason) = session.filter.check(&target) {
            session.skipped.fetch_add(1, Ordering::Relaxed);
            match reason {
                SkipReason::Rejected { pattern } => {
                    engine_debug!("{target}: rejected by {pattern}")
                }
                SkipReason::Excluded { pattern } => {
                    engine_debug!("{target}: excluded by {pattern}")
                }
            }
            continue;
        }
        children.push(Discovered {
            url: target,
            guessed,
        });
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_granted_once() {
        let session = MirrorSession::new(MirrorOptions::default()).unwrap();
        let url = Url::parse("http://example.com/a").unwrap();
        assert!(session.claim(&url));
        assert!(!session.claim(&url));
        assert!(session.is_in_flight(&url));
        session.settle(&url, None);
        assert!(!session.is_in_flight(&url));
        assert_eq!(session.stored_path(&url), Some(None));
    }

    #[test]
    fn local_file_belongs_to_the_first_url() {
        let session = MirrorSession::new(MirrorOptions::default()).unwrap();
        let page = Url::parse("http://example.com/x").unwrap();
        let alias = Url::parse("http://example.com/x/").unwrap();
        let file = Path::new("example.com/x/index.html");
        assert_eq!(session.claim_file(file, &page), Ok(()));
        assert_eq!(session.claim_file(file, &page), Ok(()));
        assert_eq!(session.claim_file(file, &alias), Err(page.to_string()));
    }
}
