//! Plain-text decoding: UTF-8 first, windows-1252 as the only fallback.

use encoding_rs::WINDOWS_1252;
use tracing::debug;

use absorber_shared::{AbsorberError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode a text file's bytes.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(utf8_err) => {
            debug!(valid_up_to = utf8_err.valid_up_to(), "not UTF-8, retrying as windows-1252");
            WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned())
                .ok_or_else(|| {
                    AbsorberError::Decode(format!(
                        "invalid UTF-8 at byte {} and not windows-1252",
                        utf8_err.valid_up_to()
                    ))
                })
        }
    }
}

/// Last-resort gate for files with no recognised extension.
pub fn is_probably_text(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_ok() || !bytes.contains(&0)
}
