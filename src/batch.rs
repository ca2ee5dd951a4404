//! Batch Driver
//!
//! Sanitizes every eligible PDF directly inside a directory, one after the
//! other, writing each result under its original name into the output
//! directory. A failing document is recorded and the run moves on.

use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, error, info, instrument};

use crate::config::{BatchConfig, Mode};
use crate::error::{Error, Result};
use crate::pipeline::SanitizationEngine;
use crate::redaction::ZoneMap;
use crate::report::{BatchSummary, FileOutcome};

/// File selection rules of a batch run
#[derive(Debug, Clone)]
pub struct BatchSelector {
    pattern: Pattern,
    markers: Vec<String>,
    markers_ci: Vec<String>,
    excluded_dirs: Vec<String>,
}

impl BatchSelector {
    pub fn new(config: &BatchConfig) -> Result<Self> {
        let pattern = Pattern::new(&config.pattern)
            .map_err(|e| Error::ConfigError(format!("Invalid batch pattern '{}': {}", config.pattern, e)))?;
        Ok(Self {
            pattern,
            markers: config.exclude_markers.clone(),
            markers_ci: config
                .exclude_markers_ci
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
            excluded_dirs: config.exclude_dirs.clone(),
        })
    }

    /// Whether a file named `file_name`, located in a directory named
    /// `parent`, should be processed. No filesystem access.
    pub fn is_candidate(&self, file_name: &str, parent: Option<&str>) -> bool {
        if !self.pattern.matches(file_name) {
            return false;
        }
        if self.markers.iter().any(|m| file_name.contains(m.as_str())) {
            return false;
        }
        let lowered = file_name.to_lowercase();
        if self.markers_ci.iter().any(|m| lowered.contains(m.as_str())) {
            return false;
        }
        match parent {
            Some(dir) => !self.excluded_dirs.iter().any(|d| d == dir),
            None => true,
        }
    }

    /// Regular files directly inside `dir` that pass [`Self::is_candidate`],
    /// sorted by path.
    pub async fn select_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        // `.` and `..` have no name of their own
        let resolved = tokio::fs::canonicalize(dir).await?;
        let parent = resolved.file_name().map(|n| n.to_string_lossy().into_owned());
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut selected = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_candidate(&name, parent.as_deref()) {
                selected.push(entry.path());
            } else {
                debug!("Skipping {}", name);
            }
        }

        selected.sort();
        Ok(selected)
    }
}

/// Runs the engine over every selected file of `dir`.
///
/// Only configuration and directory errors abort the run; document failures
/// end up in the summary.
#[instrument(skip(engine, config, zones))]
pub async fn run_batch(
    engine: &SanitizationEngine,
    dir: &Path,
    config: &BatchConfig,
    zones: Option<&ZoneMap>,
) -> Result<BatchSummary> {
    let mode: Mode = engine.config().mode;
    config.validate(dir, mode)?;
    let selector = BatchSelector::new(config)?;
    let output_dir = config.resolve_output_dir(dir, mode);

    let files = selector.select_files(dir).await?;
    info!("🚦 Batch: {} files selected in {}", files.len(), dir.display());
    tokio::fs::create_dir_all(&output_dir).await?;

    let mut summary = BatchSummary::default();
    for input in files {
        let Some(name) = input.file_name() else {
            continue;
        };
        let output = output_dir.join(name);
        let outcome = match engine.sanitize_file(&input, &output, zones).await {
            Ok(report) => FileOutcome {
                input,
                output,
                report: Some(report),
                error: None,
            },
            Err(e) => {
                error!("❌ {}: {}", input.display(), e);
                FileOutcome {
                    input,
                    output,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        };
        summary.record(outcome);
    }

    info!(
        "Batch finished: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    );
    Ok(summary)
}
