//! Sanitization reports
//!
//! One [`SanitizeReport`] per document and a [`BatchSummary`] per directory
//! run. Both serialize to JSON for `--report` and print as plain text.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Mode;
use crate::error::Result;

/// Which engine strategy produced the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Primary,
    Fallback,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Primary => write!(f, "primary"),
            StrategyKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// Per-document counters and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub mode: Mode,
    pub strategy: StrategyKind,
    pub fields_seen: usize,
    pub fields_cleared: usize,
    pub fields_failed: usize,
    pub fields_reset: usize,
    pub fields_forced: usize,
    pub widgets_removed: usize,
    pub widgets_flattened: usize,
    pub annotations_removed: usize,
    pub annotations_failed: usize,
    pub embedded_files_removed: usize,
    pub embedded_files_failed: usize,
    pub zones_applied: usize,
    pub zones_skipped: usize,
    pub glyphs_removed: usize,
    pub images_removed: usize,
    pub objects_pruned: usize,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl SanitizeReport {
    pub fn new(mode: Mode, strategy: StrategyKind) -> Self {
        Self {
            input: None,
            output: None,
            mode,
            strategy,
            fields_seen: 0,
            fields_cleared: 0,
            fields_failed: 0,
            fields_reset: 0,
            fields_forced: 0,
            widgets_removed: 0,
            widgets_flattened: 0,
            annotations_removed: 0,
            annotations_failed: 0,
            embedded_files_removed: 0,
            embedded_files_failed: 0,
            zones_applied: 0,
            zones_skipped: 0,
            glyphs_removed: 0,
            images_removed: 0,
            objects_pruned: 0,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now().to_rfc3339());
    }

    pub async fn write_json(&self, path: &Path) -> Result<()> {
        write_json(self, path).await
    }
}

impl fmt::Display for SanitizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(input), Some(output)) = (&self.input, &self.output) {
            writeln!(f, "{} -> {}", input.display(), output.display())?;
        }
        writeln!(f, "Strategy: {}", self.strategy)?;
        match self.mode {
            Mode::Clear => writeln!(
                f,
                "Fields cleared: {} (failed: {}, reset: {}, forced: {})",
                self.fields_cleared, self.fields_failed, self.fields_reset, self.fields_forced
            )?,
            Mode::Purge => writeln!(f, "Widgets removed: {}", self.widgets_removed)?,
            Mode::Flatten => writeln!(
                f,
                "Fields cleared: {} (failed: {}), widgets flattened: {}",
                self.fields_cleared, self.fields_failed, self.widgets_flattened
            )?,
        }
        writeln!(f, "Annotations removed: {}", self.annotations_removed)?;
        writeln!(f, "Embedded files removed: {}", self.embedded_files_removed)?;
        if self.zones_applied + self.zones_skipped > 0 {
            writeln!(
                f,
                "Redaction zones applied: {} (skipped: {})",
                self.zones_applied, self.zones_skipped
            )?;
        }
        write!(f, "Objects pruned on save: {}", self.objects_pruned)
    }
}

/// Result of one file in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub report: Option<SanitizeReport>,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<FileOutcome>,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: FileOutcome) {
        self.processed += 1;
        if outcome.succeeded() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub async fn write_json(&self, path: &Path) -> Result<()> {
        write_json(self, path).await
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            let name = outcome
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match &outcome.error {
                None => writeln!(f, "OK      {}", name)?,
                Some(e) => writeln!(f, "FAILED  {}: {}", name, e)?,
            }
        }
        write!(
            f,
            "Processed {} files: {} succeeded, {} failed",
            self.processed, self.succeeded, self.failed
        )
    }
}

async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
