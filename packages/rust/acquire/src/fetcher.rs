//! Direct HTTP fetcher with soft-block classification.
//!
//! One request per call, no retries. The caller decides whether a
//! [`FetchOutcome::SoftBlocked`] or [`FetchOutcome::TransportError`] is worth
//! escalating to the browser fallback.

use std::net::IpAddr;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, UPGRADE_INSECURE_REQUESTS};
use reqwest::{Client, Response};
use tracing::{debug, instrument, warn};
use url::Url;

use absorber_shared::{
    AbsorberError, FetchConfig, FetchResult, FetchStrategy, ResourceLoader, Result,
};

/// Statuses that signal the server rejected the lightweight strategy.
const SOFT_BLOCK_STATUSES: &[u16] = &[403, 429, 503];

/// Challenge pages are small; only bodies below this size are scanned for markers.
const CHALLENGE_SCAN_BYTES: usize = 16 * 1024;

/// Phrases that only appear on anti-bot interstitials, matched anywhere in a
/// small body.
const ANTI_BOT_PHRASES: &[&str] = &[
    "checking your browser before accessing",
    "cf-browser-verification",
    "cf-challenge",
    "challenge-platform",
    "enable javascript and cookies to continue",
    "ddos protection by",
    "verify you are human",
    "are you a robot",
];

/// Phrases matched against the `<title>` only. Ordinary pages mention these
/// words in their body.
const ANTI_BOT_TITLES: &[&str] = &[
    "just a moment",
    "attention required",
    "access denied",
    "captcha",
    "security check",
];

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Classified result of one direct request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 2xx with plausible, non-challenge content.
    Success(FetchResult),
    /// Denial signal: blocked status, challenge markers, or an empty JS shell.
    SoftBlocked { status: u16, reason: String },
    /// Timeout, DNS, connect, body read, or an unexpected status.
    TransportError(String),
    /// Body exceeds the byte ceiling. Never escalated.
    TooLarge { size: u64, limit: u64 },
}

impl FetchOutcome {
    /// Whether the browser fallback should be attempted.
    pub fn should_escalate(&self) -> bool {
        matches!(self, Self::SoftBlocked { .. } | Self::TransportError(_))
    }

    /// Short description for error markers.
    pub fn describe(&self) -> String {
        match self {
            Self::Success(_) => "success".into(),
            Self::SoftBlocked { status, reason } => {
                format!("soft blocked (HTTP {status}): {reason}")
            }
            Self::TransportError(detail) => format!("transport error: {detail}"),
            Self::TooLarge { size, limit } => {
                format!("too large: {size} bytes exceeds the {limit} byte limit")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Lightweight fetcher using a desktop browser header set.
pub struct Fetcher {
    config: FetchConfig,
    client: Client,
}

impl Fetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AbsorberError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Byte ceiling applied to every body.
    pub fn max_bytes(&self) -> u64 {
        self.config.max_bytes
    }

    /// Fetch `url` once and classify the response.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let response = match self.client.get(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                let detail = describe_reqwest_error(&e, &self.config);
                debug!(%detail, "request failed");
                return FetchOutcome::TransportError(format!("{url}: {detail}"));
            }
        };

        let status = response.status();
        let code = status.as_u16();

        if SOFT_BLOCK_STATUSES.contains(&code) {
            debug!(status = code, "blocked status");
            return FetchOutcome::SoftBlocked {
                status: code,
                reason: format!("HTTP {status}"),
            };
        }

        if !status.is_success() {
            return FetchOutcome::TransportError(format!("{url}: HTTP {status}"));
        }

        let limit = self.config.max_bytes;
        if let Some(len) = response.content_length() {
            if len > limit {
                return FetchOutcome::TooLarge { size: len, limit };
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let final_url = response.url().clone();

        let body = match read_capped(response, limit).await {
            Ok(body) => body,
            Err(BodyError::TooLarge(size)) => return FetchOutcome::TooLarge { size, limit },
            Err(BodyError::Read(detail)) => {
                return FetchOutcome::TransportError(format!("{url}: body read failed: {detail}"));
            }
        };

        if let Some(reason) =
            classify_body(&body, content_type.as_deref(), self.config.min_body_bytes)
        {
            debug!(status = code, bytes = body.len(), %reason, "soft block detected in body");
            return FetchOutcome::SoftBlocked { status: code, reason };
        }

        debug!(status = code, bytes = body.len(), "fetched");
        FetchOutcome::Success(FetchResult {
            body,
            content_type,
            final_url,
            strategy: FetchStrategy::Direct,
        })
    }
}

#[async_trait::async_trait]
impl ResourceLoader for Fetcher {
    /// Load an auxiliary resource (a page image). Refuses private hosts
    /// unless allowed, since these URLs come from untrusted page markup.
    async fn load(&self, url: &Url) -> Result<Vec<u8>> {
        if !self.config.allow_private_hosts && is_ssrf_target(url) {
            warn!(%url, "SSRF protection: blocked");
            return Err(AbsorberError::Transport(format!(
                "{url}: refusing private or non-http host"
            )));
        }

        match self.fetch(url).await {
            FetchOutcome::Success(fetched) => Ok(fetched.body),
            FetchOutcome::TooLarge { size, limit } => {
                Err(AbsorberError::SizeLimitExceeded { size, limit })
            }
            FetchOutcome::SoftBlocked { reason, .. } => Err(AbsorberError::SoftBlocked(reason)),
            FetchOutcome::TransportError(detail) => Err(AbsorberError::Transport(detail)),
        }
    }
}

// ---------------------------------------------------------------------------
// Body handling
// ---------------------------------------------------------------------------

enum BodyError {
    TooLarge(u64),
    Read(String),
}

/// Read the body chunk by chunk, stopping as soon as the ceiling is passed.
async fn read_capped(
    mut response: Response,
    limit: u64,
) -> std::result::Result<Vec<u8>, BodyError> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| BodyError::Read(e.to_string()))?
    {
        body.extend_from_slice(&chunk);
        if body.len() as u64 > limit {
            return Err(BodyError::TooLarge(body.len() as u64));
        }
    }
    Ok(body)
}

fn is_html(body: &[u8], content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || (ct.starts_with("text/plain") && looks_like_markup(body))
        }
        None => looks_like_markup(body),
    }
}

fn looks_like_markup(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

/// Return a soft-block reason if the body is a challenge page or an empty shell.
pub fn classify_body(
    body: &[u8],
    content_type: Option<&str>,
    min_body_bytes: usize,
) -> Option<String> {
    if !is_html(body, content_type) {
        return None;
    }

    if body.len() < CHALLENGE_SCAN_BYTES {
        let lower = String::from_utf8_lossy(body).to_lowercase();
        if let Some(phrase) = ANTI_BOT_PHRASES.iter().find(|p| lower.contains(*p)) {
            return Some(format!("anti-bot marker \"{phrase}\""));
        }
        if let Some(title) = html_title(&lower) {
            if ANTI_BOT_TITLES.iter().any(|m| title.contains(m)) {
                return Some(format!("anti-bot title \"{}\"", title.trim()));
            }
        }
    }

    if body.len() < min_body_bytes {
        return Some(format!(
            "near-empty page ({} bytes), likely rendered by JavaScript",
            body.len()
        ));
    }

    None
}

/// Text of the first `<title>` element of an already lowercased document.
fn html_title(lower: &str) -> Option<&str> {
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    Some(&lower[start..end])
}

fn describe_reqwest_error(e: &reqwest::Error, config: &FetchConfig) -> String {
    if e.is_timeout() {
        format!("timed out after {}s", config.timeout.as_secs_f32())
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else if e.is_redirect() {
        format!("redirect loop: {e}")
    } else {
        e.to_string()
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
