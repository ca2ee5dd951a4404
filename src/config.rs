//! Configuration types and validation for sanitization runs
//!
//! Settings come from built-in defaults, optionally overlaid by a JSON or
//! YAML file (`--config`), then by command-line flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// What happens to form fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Keep the fields, empty their values
    #[default]
    Clear,
    /// Delete the widgets and leave an empty form behind
    Purge,
    /// Clear, then draw the emptied widgets into the page and drop the form
    Flatten,
}

impl Mode {
    /// Suffix appended to the file stem of the default output path.
    pub fn output_suffix(self) -> &'static str {
        match self {
            Mode::Clear => "_cleared",
            Mode::Purge => "_purged",
            Mode::Flatten => "_flattened",
        }
    }

    pub fn default_output_dir(self) -> &'static str {
        match self {
            Mode::Clear => "cleared_pdfs",
            Mode::Purge => "purged_pdfs",
            Mode::Flatten => "flattened_pdfs",
        }
    }
}

/// Which strategies the engine may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Primary first, fallback on a recoverable failure
    #[default]
    Auto,
    Primary,
    Fallback,
}

/// Which annotations the annotation purger deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationScope {
    /// Markup annotations that carry user input
    #[default]
    Removable,
    /// Every annotation except form widgets
    All,
}

/// Per-document sanitization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeConfig {
    pub mode: Mode,
    pub method: Method,
    pub annotation_scope: AnnotationScope,
    /// Drop the XFA form description, which keeps its own copy of the data
    pub strip_xfa: bool,
    /// Compress streams when saving
    pub compress: bool,
    /// Ask viewers to regenerate field appearances
    pub need_appearances: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Clear,
            method: Method::Auto,
            annotation_scope: AnnotationScope::Removable,
            strip_xfa: true,
            compress: true,
            need_appearances: true,
        }
    }
}

/// Directory batch selection rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Glob matched against the file name
    pub pattern: String,
    /// Name substrings marking earlier outputs (case-sensitive)
    pub exclude_markers: Vec<String>,
    /// Name substrings marking test files (case-insensitive)
    pub exclude_markers_ci: Vec<String>,
    /// Files whose parent directory has one of these names are skipped
    pub exclude_dirs: Vec<String>,
    /// Output directory; defaults to `<input>/cleared_pdfs` or `<input>/purged_pdfs`
    pub output_dir: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pattern: "*.pdf".into(),
            exclude_markers: vec!["_cleared".into(), "_flattened".into(), "_purged".into()],
            exclude_markers_ci: vec!["test".into(), "blank".into()],
            exclude_dirs: vec!["cleared_pdfs".into(), "purged_pdfs".into(), "flattened_pdfs".into()],
            output_dir: None,
        }
    }
}

impl BatchConfig {
    /// Output directory for a batch over `input_dir`.
    pub fn resolve_output_dir(&self, input_dir: &Path, mode: Mode) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| input_dir.join(mode.default_output_dir()))
    }

    pub fn validate(&self, input_dir: &Path, mode: Mode) -> Result<()> {
        if self.pattern.trim().is_empty() {
            return Err(Error::ConfigError("Batch pattern must not be empty".into()));
        }
        glob::Pattern::new(&self.pattern)
            .map_err(|e| Error::ConfigError(format!("Invalid batch pattern '{}': {}", self.pattern, e)))?;
        if self.resolve_output_dir(input_dir, mode) == input_dir {
            return Err(Error::ConfigError(
                "Output directory must differ from the input directory".into(),
            ));
        }
        Ok(())
    }
}

/// Contents of a `--config` file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub sanitize: SanitizeConfig,
    pub batch: BatchConfig,
}

impl FileConfig {
    /// Parses JSON first, then YAML.
    pub fn parse(content: &str) -> Result<Self> {
        match serde_json::from_str(content) {
            Ok(config) => Ok(config),
            Err(json_err) => serde_yaml::from_str(content).map_err(|yaml_err| {
                Error::ConfigError(format!(
                    "Not valid JSON ({}) or YAML ({})",
                    json_err, yaml_err
                ))
            }),
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::ConfigError(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
