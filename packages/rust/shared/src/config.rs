//! Application configuration for the absorber.
//!
//! User config lives at `~/.absorber/absorber.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AbsorberError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "absorber.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".absorber";

/// Desktop browser user-agent used by both fetch strategies.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// 10 MiB.
const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Config structs (matching absorber.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fetch: FetchSection,

    #[serde(default)]
    pub browser: BrowserSection,

    #[serde(default)]
    pub extract: ExtractSection,

    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub conflicts: ConflictSection,
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// HTML bodies shorter than this are treated as JS-rendered shells.
    #[serde(default = "default_min_body_bytes")]
    pub min_body_bytes: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            min_body_bytes: default_min_body_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    15
}
fn default_min_body_bytes() -> usize {
    512
}
fn default_user_agent() -> String {
    DESKTOP_USER_AGENT.into()
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSection {
    /// Resolved browser executable. Written back once discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_scroll_passes")]
    pub scroll_passes: u32,

    #[serde(default = "default_scroll_wait_ms")]
    pub scroll_wait_ms: u64,

    #[serde(default = "default_challenge_wait_ms")]
    pub challenge_wait_ms: u64,

    /// Upper bound for one browser render once the session is acquired.
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,

    /// CSS locator for the login/overlay close button.
    #[serde(default = "default_modal_selector")]
    pub modal_selector: String,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            settle_ms: default_settle_ms(),
            scroll_passes: default_scroll_passes(),
            scroll_wait_ms: default_scroll_wait_ms(),
            challenge_wait_ms: default_challenge_wait_ms(),
            overall_timeout_secs: default_overall_timeout_secs(),
            modal_selector: default_modal_selector(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_settle_ms() -> u64 {
    3000
}
fn default_scroll_passes() -> u32 {
    3
}
fn default_scroll_wait_ms() -> u64 {
    1500
}
fn default_challenge_wait_ms() -> u64 {
    8000
}
fn default_overall_timeout_secs() -> u64 {
    90
}
fn default_modal_selector() -> String {
    r#"[role="dialog"] button[aria-label="Close"], .modal .close, button[aria-label="Dismiss"]"#
        .into()
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSection {
    /// Byte ceiling for local files and remote resources.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Images below this size are skipped before OCR.
    #[serde(default = "default_min_image_bytes")]
    pub min_image_bytes: u64,

    #[serde(default = "default_true")]
    pub skip_small_images: bool,

    /// OCR `<img>` references found on fetched HTML pages.
    #[serde(default = "default_true")]
    pub ocr_page_images: bool,

    #[serde(default = "default_max_page_images")]
    pub max_page_images: usize,

    /// Allow page images on loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,

    /// Command used for `.doc` → `.docx` conversion.
    #[serde(default = "default_legacy_converter")]
    pub legacy_converter: String,
}

impl Default for ExtractSection {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            min_image_bytes: default_min_image_bytes(),
            skip_small_images: true,
            ocr_page_images: true,
            max_page_images: default_max_page_images(),
            allow_private_hosts: false,
            legacy_converter: default_legacy_converter(),
        }
    }
}

fn default_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}
fn default_min_image_bytes() -> u64 {
    5 * 1024
}
fn default_max_page_images() -> usize {
    20
}
fn default_legacy_converter() -> String {
    "soffice".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Concurrent inputs; 0 = available parallelism.
    #[serde(default)]
    pub workers: usize,

    /// Concurrent pages/images per document; 0 = available parallelism.
    #[serde(default)]
    pub unit_workers: usize,
}

/// `[conflicts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSection {
    #[serde(default = "default_numeric_subjects")]
    pub numeric_subjects: Vec<String>,

    #[serde(default = "default_sentiment_subjects")]
    pub sentiment_subjects: Vec<String>,

    #[serde(default = "default_numeric_lookahead")]
    pub numeric_lookahead_chars: usize,

    #[serde(default = "default_sentiment_window")]
    pub sentiment_window_chars: usize,
}

impl Default for ConflictSection {
    fn default() -> Self {
        Self {
            numeric_subjects: default_numeric_subjects(),
            sentiment_subjects: default_sentiment_subjects(),
            numeric_lookahead_chars: default_numeric_lookahead(),
            sentiment_window_chars: default_sentiment_window(),
        }
    }
}

fn default_numeric_subjects() -> Vec<String> {
    [
        "Throughput",
        "Latency",
        "Recall",
        "Precision",
        "Accuracy",
        "Cost",
        "Price",
        "Memory",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_sentiment_subjects() -> Vec<String> {
    [
        "Milvus",
        "Pinecone",
        "Qdrant",
        "Weaviate",
        "Chroma",
        "FAISS",
        "Elasticsearch",
        "PostgreSQL",
        "Redis",
        "LanceDB",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_numeric_lookahead() -> usize {
    80
}
fn default_sentiment_window() -> usize {
    100
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime settings for the direct fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub min_body_bytes: usize,
    pub user_agent: String,
    pub max_bytes: u64,
    /// Refuse loads from loopback/private hosts (page images only).
    pub allow_private_hosts: bool,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            min_body_bytes: config.fetch.min_body_bytes,
            user_agent: config.fetch.user_agent.clone(),
            max_bytes: config.extract.max_bytes,
            allow_private_hosts: config.extract.allow_private_hosts,
        }
    }
}

/// Runtime settings for the browser fallback.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
    pub settle: Duration,
    pub scroll_passes: u32,
    pub scroll_wait: Duration,
    pub challenge_wait: Duration,
    pub overall_timeout: Duration,
    pub modal_selector: String,
}

impl From<&AppConfig> for BrowserConfig {
    fn from(config: &AppConfig) -> Self {
        let b = &config.browser;
        Self {
            executable: b.executable.as_ref().map(PathBuf::from),
            headless: b.headless,
            user_agent: config.fetch.user_agent.clone(),
            settle: Duration::from_millis(b.settle_ms),
            scroll_passes: b.scroll_passes.max(1),
            scroll_wait: Duration::from_millis(b.scroll_wait_ms),
            challenge_wait: Duration::from_millis(b.challenge_wait_ms),
            overall_timeout: Duration::from_secs(b.overall_timeout_secs),
            modal_selector: b.modal_selector.clone(),
        }
    }
}

/// Runtime settings for the extraction dispatcher.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub max_bytes: u64,
    /// `None` disables the small-image skip.
    pub min_image_bytes: Option<u64>,
    pub ocr_page_images: bool,
    pub max_page_images: usize,
    pub unit_workers: usize,
    pub legacy_converter: String,
}

impl From<&AppConfig> for ExtractConfig {
    fn from(config: &AppConfig) -> Self {
        let e = &config.extract;
        Self {
            max_bytes: e.max_bytes,
            min_image_bytes: e.skip_small_images.then_some(e.min_image_bytes),
            ocr_page_images: e.ocr_page_images,
            max_page_images: e.max_page_images,
            unit_workers: resolve_workers(config.pipeline.unit_workers),
            legacy_converter: e.legacy_converter.clone(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Runtime settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: resolve_workers(config.pipeline.workers),
        }
    }
}

/// Runtime settings for conflict detection.
#[derive(Debug, Clone)]
pub struct ConflictConfig {
    pub numeric_subjects: Vec<String>,
    pub sentiment_subjects: Vec<String>,
    pub numeric_lookahead_chars: usize,
    pub sentiment_window_chars: usize,
}

impl From<&AppConfig> for ConflictConfig {
    fn from(config: &AppConfig) -> Self {
        let c = &config.conflicts;
        Self {
            numeric_subjects: c.numeric_subjects.clone(),
            sentiment_subjects: c.sentiment_subjects.clone(),
            numeric_lookahead_chars: c.numeric_lookahead_chars,
            sentiment_window_chars: c.sentiment_window_chars,
        }
    }
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// `0` means one worker per logical CPU.
pub fn resolve_workers(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.absorber/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AbsorberError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.absorber/absorber.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AbsorberError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AbsorberError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AbsorberError::io(dir, e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| AbsorberError::config(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| AbsorberError::io(path, e))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    save_config_to(&AppConfig::default(), &path)?;
    tracing::info!(?path, "created default config file");
    Ok(path)
}

// ---------------------------------------------------------------------------
// Browser executable resolution
// ---------------------------------------------------------------------------

/// Platform default browser locations, tried in order.
pub fn browser_candidates() -> Vec<PathBuf> {
    let list: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };
    list.iter().map(PathBuf::from).collect()
}

/// Resolve the browser executable once.
///
/// A configured path that exists wins; otherwise the first existing
/// candidate is chosen and its path alone is written back to `config_path`,
/// leaving every other setting in the file as it was. Returns `None` when
/// nothing is installed.
pub fn resolve_browser_executable(
    config: &mut AppConfig,
    config_path: Option<&Path>,
    candidates: &[PathBuf],
) -> Option<PathBuf> {
    if let Some(configured) = config.browser.executable.as_deref() {
        let path = PathBuf::from(configured);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(
            path = %configured,
            "configured browser executable missing, searching defaults"
        );
    }

    let found = candidates.iter().find(|c| c.exists())?.clone();
    config.browser.executable = Some(found.display().to_string());

    if let Some(path) = config_path {
        match persist_browser_path(path, &found) {
            Ok(()) => tracing::info!(browser = %found.display(), ?path, "persisted browser path"),
            Err(e) => tracing::warn!(error = %e, "could not persist browser path"),
        }
    }

    Some(found)
}

fn persist_browser_path(path: &Path, executable: &Path) -> Result<()> {
    let mut on_disk = if path.exists() {
        load_config_from(path)?
    } else {
        AppConfig::default()
    };
    on_disk.browser.executable = Some(executable.display().to_string());
    save_config_to(&on_disk, path)
}
