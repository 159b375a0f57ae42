use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::engine_trace;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Receives the number of bytes consumed during each elapsed second.
pub type RateListener = Arc<dyn Fn(u64) + Send + Sync>;

const REFILL_INTERVAL: Duration = Duration::from_secs(1);

struct Bucket {
    rate: u64,
    tokens: AtomicU64,
    refilled: Notify,
}

impl Bucket {
    fn consume(&self, amount: u64) {
        let _ = self
            .tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                Some(tokens.saturating_sub(amount))
            });
    }

    /// Reset to a full bucket, returning what was spent since the last refill.
    fn refill(&self) -> u64 {
        let remaining = self.tokens.swap(self.rate, Ordering::AcqRel);
        self.rate.saturating_sub(remaining)
    }
}

/// Token bucket wrapped around a byte source.
///
/// The bucket holds `rate` tokens and is refilled to exactly `rate` once per
/// second by a ticker task; unused tokens never carry over. Each read takes at
/// most the current token count and blocks while the bucket is empty. The
/// ticker starts on the first non-empty read and stops when the governor is
/// closed or dropped.
///
/// Reads borrow the governor mutably, so at most one reader ever waits for a
/// refill.
pub struct RateGovernor<R> {
    source: R,
    bucket: Arc<Bucket>,
    listener: Option<RateListener>,
    ticker: Option<JoinHandle<()>>,
}

impl<R: AsyncRead + Unpin> RateGovernor<R> {
    /// `rate_per_second <= 0` disables throttling; the rate listener still
    /// receives per-second totals.
    pub fn new(rate_per_second: i64, source: R) -> Self {
        let rate = u64::try_from(rate_per_second)
            .ok()
            .filter(|rate| *rate > 0)
            .unwrap_or(u64::MAX);
        Self {
            source,
            bucket: Arc::new(Bucket {
                rate,
                tokens: AtomicU64::new(rate),
                refilled: Notify::new(),
            }),
            listener: None,
            ticker: None,
        }
    }

    pub fn with_listener(mut self, listener: RateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn is_unlimited(&self) -> bool {
        self.bucket.rate == u64::MAX
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// Read up to `buf.len()` bytes, capped by the tokens currently available.
    ///
    /// Returns `Ok(0)` at end of input, or immediately for an empty buffer.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.start_ticker();

        let available = loop {
            let tokens = self.bucket.tokens.load(Ordering::Acquire);
            if tokens > 0 {
                break tokens;
            }
            self.bucket.refilled.notified().await;
        };
        let allowed = usize::try_from(available)
            .unwrap_or(usize::MAX)
            .min(buf.len());

        let read = self.source.read(&mut buf[..allowed]).await?;
        self.bucket.consume(read as u64);
        Ok(read)
    }

    /// Stop the ticker and release the wrapped source.
    pub fn close(mut self) {
        self.stop_ticker();
    }

    fn start_ticker(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let bucket = Arc::clone(&self.bucket);
        let listener = self.listener.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(Instant::now() + REFILL_INTERVAL, REFILL_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let used = bucket.refill();
                if let Some(listener) = &listener {
                    listener(used);
                }
                bucket.refilled.notify_one();
            }
        }));
        engine_trace!("rate governor ticker started");
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl<R> Drop for RateGovernor<R> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
