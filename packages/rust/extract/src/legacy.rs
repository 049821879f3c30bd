//! Legacy `.doc` → `.docx` through a headless office suite.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};
use url::Url;

use absorber_shared::{AbsorberError, Capability, Result};

const ENGINE: &str = "legacy-doc converter";
const CONVERT_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs one conversion at a time, each with a private office profile under
/// its output directory.
pub struct LegacyDocConverter {
    command: String,
    capability: OnceCell<Capability>,
    turn: Mutex<()>,
}

impl LegacyDocConverter {
    /// `command` is the office binary, normally `soffice`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            capability: OnceCell::new(),
            turn: Mutex::new(()),
        }
    }

    /// Run `<command> --version` once and cache the answer.
    pub async fn probe(&self) -> Capability {
        self.capability
            .get_or_init(|| async {
                let probe = Command::new(&self.command).arg("--version").output().await;
                let capability = match probe {
                    Ok(out) if out.status.success() => {
                        let version = String::from_utf8_lossy(&out.stdout);
                        let first = version.lines().next().unwrap_or("").trim();
                        Capability::Available(first.to_string())
                    }
                    Ok(out) => Capability::Unavailable(format!(
                        "`{} --version` exited with {}",
                        self.command, out.status
                    )),
                    Err(e) => {
                        Capability::Unavailable(format!("`{}` not runnable: {e}", self.command))
                    }
                };
                debug!(command = %self.command, %capability, "legacy converter probed");
                capability
            })
            .await
            .clone()
    }

    /// Convert `doc` into `out_dir`, returning the new `.docx` path.
    #[instrument(skip_all, fields(doc = %doc.display()))]
    pub async fn convert(&self, doc: &Path, out_dir: &Path) -> Result<PathBuf> {
        if let Capability::Unavailable(reason) = self.probe().await {
            return Err(AbsorberError::unavailable(
                ENGINE,
                format!("conversion unavailable: {reason}"),
            ));
        }

        let _turn = self.turn.lock().await;

        let mut cmd = Command::new(&self.command);
        if let Ok(profile) = Url::from_directory_path(out_dir.join("office-profile")) {
            cmd.arg(format!("-env:UserInstallation={profile}"));
        }
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg("docx")
            .arg("--outdir")
            .arg(out_dir)
            .arg(doc)
            .kill_on_drop(true);

        let output = tokio::time::timeout(CONVERT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| {
                AbsorberError::Conversion(format!(
                    "{ENGINE} timed out after {}s",
                    CONVERT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| AbsorberError::Conversion(format!("{ENGINE} failed to start: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "legacy conversion failed");
            return Err(AbsorberError::Conversion(format!(
                "{ENGINE} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stem = doc.file_stem().ok_or_else(|| {
            AbsorberError::Conversion(format!("{} has no file name", doc.display()))
        })?;
        let converted = out_dir.join(format!("{}.docx", stem.to_string_lossy()));
        if !converted.is_file() {
            return Err(AbsorberError::Conversion(format!(
                "{ENGINE} produced no output at {}",
                converted.display()
            )));
        }

        info!(out = %converted.display(), "converted legacy document");
        Ok(converted)
    }
}
