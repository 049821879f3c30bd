//! Error types for the absorber pipeline.
//!
//! Library crates use [`AbsorberError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Every variant can be rendered as a bracketed marker with
//! [`AbsorberError::marker`], which is how failures appear inline in the
//! normalized output.

use std::path::PathBuf;

/// Top-level error type for all absorber operations.
#[derive(Debug, thiserror::Error)]
pub enum AbsorberError {
    /// Network/HTTP failure: timeout, DNS, connect, unexpected status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server denied the lightweight fetch (403/429/503 or a challenge page).
    #[error("soft blocked: {0}")]
    SoftBlocked(String),

    /// Browser automation session failure.
    #[error("automation error: {0}")]
    Automation(String),

    /// Bytes could not be decoded with any supported text encoding.
    #[error("decode error: {0}")]
    Decode(String),

    /// No extractor handles this content.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Local file or remote resource exceeds the byte ceiling.
    #[error("too large: {size} bytes exceeds the {limit} byte limit")]
    SizeLimitExceeded { size: u64, limit: u64 },

    /// An optional engine (OCR, legacy-doc converter) is missing.
    #[error("{engine} unavailable: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    /// Local input path does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Document parsing error (PDF object tree, DOCX container, HTML).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AbsorberError>;

impl AbsorberError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create an engine-unavailable error.
    pub fn unavailable(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short uppercase label naming the failure kind.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT ERROR",
            Self::SoftBlocked(_) => "SOFT BLOCKED",
            Self::Automation(_) => "AUTOMATION ERROR",
            Self::Decode(_) => "DECODE ERROR",
            Self::UnsupportedFormat(_) => "UNSUPPORTED FORMAT",
            Self::SizeLimitExceeded { .. } => "SIZE LIMIT EXCEEDED",
            Self::EngineUnavailable { .. } => "ENGINE UNAVAILABLE",
            Self::NotFound(_) => "NOT FOUND",
            Self::Config { .. } => "CONFIG ERROR",
            Self::Parse { .. } => "PARSE ERROR",
            Self::Conversion(_) => "CONVERSION ERROR",
            Self::Io { .. } => "IO ERROR",
        }
    }

    /// Human-readable cause without the kind prefix.
    fn detail(&self) -> String {
        match self {
            Self::Transport(d)
            | Self::SoftBlocked(d)
            | Self::Automation(d)
            | Self::Decode(d)
            | Self::UnsupportedFormat(d)
            | Self::Conversion(d) => d.clone(),
            Self::SizeLimitExceeded { size, limit } => {
                format!("{size} bytes exceeds the {limit} byte limit")
            }
            Self::EngineUnavailable { engine, reason } => format!("{engine}: {reason}"),
            Self::NotFound(path) => path.display().to_string(),
            Self::Config { message } | Self::Parse { message } => message.clone(),
            Self::Io { path, source } => format!("{}: {source}", path.display()),
        }
    }

    /// Bracketed marker embedded in the output at the point of failure.
    pub fn marker(&self) -> String {
        format!("[{}: {}]", self.kind_label(), self.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AbsorberError::config("missing browser path");
        assert_eq!(err.to_string(), "config error: missing browser path");

        let err = AbsorberError::SizeLimitExceeded {
            size: 11,
            limit: 10,
        };
        assert!(err.to_string().contains("11 bytes"));
    }

    #[test]
    fn marker_names_kind_and_cause() {
        let err = AbsorberError::NotFound(PathBuf::from("missing.pdf"));
        assert_eq!(err.marker(), "[NOT FOUND: missing.pdf]");

        let err = AbsorberError::unavailable("legacy-doc converter", "conversion unavailable");
        assert_eq!(
            err.marker(),
            "[ENGINE UNAVAILABLE: legacy-doc converter: conversion unavailable]"
        );
    }
}
