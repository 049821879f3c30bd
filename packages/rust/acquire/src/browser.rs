//! Browser-automation fallback for soft-blocked URLs.
//!
//! A single browser session is owned by [`BrowserFallback`] behind a mutex,
//! so concurrent callers take turns. Rendering itself sits behind the
//! [`PageRenderer`] trait; [`ChromiumRenderer`] drives headless Chromium over
//! the DevTools protocol.

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use absorber_shared::{AbsorberError, BrowserConfig, FetchResult, FetchStrategy, Result};

/// Titles shown by common challenge interstitials (lowercase).
const CHALLENGE_TITLES: &[&str] = &[
    "just a moment",
    "attention required",
    "access denied",
    "security check",
    "please wait",
];

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body ? document.body.scrollHeight : 0)";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Loads a URL in a real browser and returns the rendered HTML.
#[async_trait::async_trait]
pub trait PageRenderer: Send {
    /// Render `url`, reusing the session if one is open.
    async fn render(&mut self, url: &Url) -> Result<String>;

    /// Tear the session down. Called after every failed render.
    async fn shutdown(&mut self);
}

// ---------------------------------------------------------------------------
// BrowserFallback
// ---------------------------------------------------------------------------

/// The one shared browser resource. Access is serialized.
pub struct BrowserFallback {
    renderer: Mutex<Box<dyn PageRenderer>>,
    render_timeout: Duration,
}

impl BrowserFallback {
    pub fn new(renderer: Box<dyn PageRenderer>, render_timeout: Duration) -> Self {
        Self {
            renderer: Mutex::new(renderer),
            render_timeout,
        }
    }

    /// Fallback backed by headless Chromium.
    pub fn chromium(config: BrowserConfig) -> Self {
        let timeout = config.overall_timeout;
        Self::new(Box::new(ChromiumRenderer::new(config)), timeout)
    }

    /// Render `url` in the shared session.
    ///
    /// The render is bounded by the configured timeout once the session lock
    /// is held. Any failure tears the session down before returning.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch_via_browser(&self, url: &Url) -> Result<FetchResult> {
        let mut renderer = self.renderer.lock().await;
        let started = std::time::Instant::now();

        let result = match tokio::time::timeout(self.render_timeout, renderer.render(url)).await {
            Ok(result) => result,
            Err(_) => Err(AbsorberError::Automation(format!(
                "timed out after {}s",
                self.render_timeout.as_secs()
            ))),
        };

        match result {
            Ok(html) => {
                info!(
                    bytes = html.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "browser render complete"
                );
                Ok(FetchResult {
                    body: html.into_bytes(),
                    content_type: Some("text/html; charset=utf-8".into()),
                    final_url: url.clone(),
                    strategy: FetchStrategy::Browser,
                })
            }
            Err(e) => {
                warn!(error = %e, "browser render failed, tearing down session");
                renderer.shutdown().await;
                Err(e)
            }
        }
    }

    /// Close the session at the end of a batch.
    pub async fn close(&self) {
        self.renderer.lock().await.shutdown().await;
    }
}

/// Whether a page title belongs to a challenge interstitial.
pub fn is_challenge_title(title: &str) -> bool {
    let lower = title.trim().to_lowercase();
    CHALLENGE_TITLES.iter().any(|t| lower.contains(t))
}

// ---------------------------------------------------------------------------
// Chromium renderer
// ---------------------------------------------------------------------------

struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromeSession {
    async fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut builder = ChromeConfig::builder()
            .arg(format!("--user-agent={}", config.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .window_size(1366, 900);
        if let Some(path) = &config.executable {
            builder = builder.chrome_executable(path);
        }
        if !config.headless {
            builder = builder.with_head();
        }
        let chrome_config = builder.build().map_err(AbsorberError::Automation)?;

        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| AbsorberError::Automation(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!(executable = ?config.executable, "browser session started");
        Ok(Self { browser, handler })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

/// Drives headless Chromium: navigate, settle, scroll, dismiss, snapshot.
pub struct ChromiumRenderer {
    config: BrowserConfig,
    session: Option<ChromeSession>,
}

impl ChromiumRenderer {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }
}

async fn ensure_session<'a>(
    slot: &'a mut Option<ChromeSession>,
    config: &BrowserConfig,
) -> Result<&'a mut ChromeSession> {
    if slot.is_none() {
        *slot = Some(ChromeSession::launch(config).await?);
    }
    slot.as_mut()
        .ok_or_else(|| AbsorberError::Automation("browser session unavailable".into()))
}

fn automation(context: &str) -> impl FnOnce(chromiumoxide::error::CdpError) -> AbsorberError + '_ {
    move |e| AbsorberError::Automation(format!("{context}: {e}"))
}

#[async_trait::async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&mut self, url: &Url) -> Result<String> {
        let config = &self.config;
        let session = ensure_session(&mut self.session, config).await?;

        let page = session
            .browser
            .new_page(url.as_str())
            .await
            .map_err(automation("navigation failed"))?;

        let result = drive_page(&page, config).await;
        if let Err(e) = page.close().await {
            debug!(error = %e, "page close failed");
        }
        result
    }

    async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            debug!("browser session closed");
        }
    }
}

async fn drive_page(page: &Page, config: &BrowserConfig) -> Result<String> {
    tokio::time::sleep(config.settle).await;

    // Single-page apps render progressively; one snapshot under-captures.
    for pass in 0..config.scroll_passes {
        page.evaluate(SCROLL_SCRIPT)
            .await
            .map_err(automation("scroll failed"))?;
        tokio::time::sleep(config.scroll_wait).await;
        debug!(pass = pass + 1, "scrolled to bottom");
    }

    dismiss_modal(page, &config.modal_selector).await;

    wait_out_challenge(|| page_title(page), config.challenge_wait).await?;

    page.content()
        .await
        .map_err(automation("content read failed"))
}

async fn page_title(page: &Page) -> Result<String> {
    Ok(page
        .get_title()
        .await
        .map_err(automation("title read failed"))?
        .unwrap_or_default())
}

/// Wait once if the page still shows a challenge title; fail if it persists.
async fn wait_out_challenge<F, Fut>(mut read_title: F, wait: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let title = read_title().await?;
    if !is_challenge_title(&title) {
        return Ok(());
    }

    debug!(%title, "challenge title detected, waiting once more");
    tokio::time::sleep(wait).await;

    let title = read_title().await?;
    if is_challenge_title(&title) {
        return Err(AbsorberError::Automation(format!(
            "challenge page persisted: \"{}\"",
            title.trim()
        )));
    }
    Ok(())
}

/// Click the close button of a known overlay. Absence is not an error.
async fn dismiss_modal(page: &Page, selector: &str) {
    match page.find_element(selector).await {
        Ok(button) => match button.click().await {
            Ok(_) => debug!(selector, "dismissed modal"),
            Err(e) => debug!(selector, error = %e, "modal click failed"),
        },
        Err(_) => debug!(selector, "no modal present"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        renders: AtomicUsize,
        shutdowns: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    struct ScriptedRenderer {
        counters: Arc<Counters>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl PageRenderer for ScriptedRenderer {
        async fn render(&mut self, url: &Url) -> Result<String> {
            let c = &self.counters;
            c.renders.fetch_add(1, Ordering::SeqCst);
            let now = c.active.fetch_add(1, Ordering::SeqCst) + 1;
            c.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            c.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                Err(AbsorberError::Automation("navigation failed".into()))
            } else {
                Ok(format!("<html><body>{url}</body></html>"))
            }
        }

        async fn shutdown(&mut self) {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fallback(
        delay: Duration,
        fail: bool,
        timeout: Duration,
    ) -> (BrowserFallback, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let renderer = ScriptedRenderer {
            counters: counters.clone(),
            delay,
            fail,
        };
        (BrowserFallback::new(Box::new(renderer), timeout), counters)
    }

    fn url() -> Url {
        Url::parse("https://blocked.example.com/page").unwrap()
    }

    #[tokio::test]
    async fn success_is_tagged_as_browser_strategy() {
        let (fb, counters) = fallback(Duration::ZERO, false, Duration::from_secs(5));
        let fetched = fb.fetch_via_browser(&url()).await.unwrap();
        assert_eq!(fetched.strategy, FetchStrategy::Browser);
        assert!(String::from_utf8_lossy(&fetched.body).contains("blocked.example.com"));
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_tears_down_session() {
        let (fb, counters) = fallback(Duration::ZERO, true, Duration::from_secs(5));
        let err = fb.fetch_via_browser(&url()).await.unwrap_err();
        assert!(matches!(err, AbsorberError::Automation(_)));
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn render_is_bounded_by_timeout() {
        let (fb, counters) = fallback(Duration::from_secs(5), false, Duration::from_millis(50));
        let err = fb.fetch_via_browser(&url()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let (fb, counters) = fallback(Duration::from_millis(20), false, Duration::from_secs(5));
        let fb = Arc::new(fb);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let fb = fb.clone();
            handles.push(tokio::spawn(async move { fb.fetch_via_browser(&url()).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(counters.renders.load(Ordering::SeqCst), 4);
        assert_eq!(counters.max_active.load(Ordering::SeqCst), 1);
    }

    fn scripted_titles(titles: &[&str]) -> impl FnMut() -> std::future::Ready<Result<String>> {
        let titles: Vec<String> = titles.iter().map(|t| t.to_string()).collect();
        let mut next = 0;
        move || {
            let title = titles.get(next).cloned().unwrap_or_default();
            next += 1;
            std::future::ready(Ok(title))
        }
    }

    #[tokio::test]
    async fn challenge_that_clears_after_waiting_is_accepted() {
        let titles = scripted_titles(&["Just a moment...", "Benchmarks"]);
        wait_out_challenge(titles, Duration::from_millis(5)).await.unwrap();
    }

    #[tokio::test]
    async fn persistent_challenge_fails_the_render() {
        let titles = scripted_titles(&["Just a moment...", "Just a moment..."]);
        let err = wait_out_challenge(titles, Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AbsorberError::Automation(ref m) if m.contains("challenge page persisted")
        ));
    }

    #[tokio::test]
    async fn ordinary_title_reads_once() {
        let reads = AtomicUsize::new(0);
        wait_out_challenge(
            || {
                reads.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok("Vector Database Benchmarks".to_string()))
            },
            Duration::from_secs(60),
        )
        .await
        .unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn challenge_titles() {
        assert!(is_challenge_title("Just a moment..."));
        assert!(is_challenge_title("Attention Required! | Cloudflare"));
        assert!(!is_challenge_title("Vector Database Benchmarks"));
    }
}
