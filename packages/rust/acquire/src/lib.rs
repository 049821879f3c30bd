//! Content acquisition: direct HTTP fetch with a browser-automation fallback.

pub mod browser;
pub mod fetcher;

pub use browser::{BrowserFallback, ChromiumRenderer, PageRenderer, is_challenge_title};
pub use fetcher::{FetchOutcome, Fetcher, classify_body, is_ssrf_target};
