//! Sanitization Engine
//!
//! A document is sanitized by one of two strategies. The primary strategy
//! clears every field according to its type and verifies the result; the
//! fallback strategy works on the raw field tree without type semantics.
//! Both continue with annotation purging, embedded-file purging and optional
//! zone redaction, and the engine finishes with the save compactor. Purge and
//! flatten modes remove the widgets after the fields are dealt with.

use std::path::{Path, PathBuf};

use lopdf::Object;
use tracing::{debug, info, instrument, warn};

use crate::cleaner::{
    AnnotationPurger, EmbeddedFilePurger, FieldClearer, StructureCleaner, VerificationPass, WidgetFlattener,
    WidgetPurger,
};
use crate::config::{Method, Mode, SanitizeConfig};
use crate::error::{Error, Result};
use crate::output::SaveCompactor;
use crate::pdf_document::PdfDocument;
use crate::redaction::{ZoneMap, ZoneRedactor};
use crate::report::{SanitizeReport, StrategyKind};

/// One way of emptying a document's form data
pub trait SanitizeStrategy {
    fn kind(&self) -> StrategyKind;

    /// Runs every pass of the strategy on `doc`. An `Err` means the strategy
    /// could not handle this document; per-entity failures are only counted.
    fn apply(&self, doc: &mut PdfDocument, zones: Option<&ZoneMap>, report: &mut SanitizeReport) -> Result<()>;
}

/// Field-type-aware clearing with a verification pass
#[derive(Debug, Clone)]
pub struct PrimaryStrategy {
    config: SanitizeConfig,
}

impl PrimaryStrategy {
    pub fn new(config: SanitizeConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self, doc, report))]
    fn stage_clear_fields(&self, doc: &mut PdfDocument, report: &mut SanitizeReport) -> Result<()> {
        info!("🧹 Clearing form fields");
        let widgets = doc.all_widgets()?;
        let cleared = FieldClearer::new().clear_all(doc, &widgets);
        report.fields_seen = cleared.seen;
        report.fields_cleared = cleared.cleared;
        report.fields_failed = cleared.failed;
        report.fields_reset = cleared.reset;

        info!("🔍 Verifying fields");
        let widgets = doc.all_widgets()?;
        let verified = VerificationPass::new().run(doc, &widgets);
        report.fields_forced = verified.forced;
        if verified.residual > 0 {
            warn!("{} fields still hold a value after verification", verified.residual);
        }

        finalize_form(doc, &self.config);
        Ok(())
    }

    #[instrument(skip(self, doc, report))]
    fn stage_purge_widgets(&self, doc: &mut PdfDocument, report: &mut SanitizeReport) -> Result<()> {
        info!("🧹 Purging form widgets");
        let purged = WidgetPurger::new().run(doc)?;
        report.widgets_removed = purged.removed;
        report.fields_seen = purged.cleared_instead.seen;
        report.fields_cleared = purged.cleared_instead.cleared;
        report.fields_failed = purged.cleared_instead.failed;
        report.fields_reset = purged.cleared_instead.reset;
        Ok(())
    }

    /// Runs after the fields were cleared and verified.
    #[instrument(skip(self, doc, report))]
    fn stage_flatten(&self, doc: &mut PdfDocument, report: &mut SanitizeReport) -> Result<()> {
        info!("🖨️ Flattening emptied widgets");
        let flattened = WidgetFlattener::new().run(doc)?;
        report.widgets_flattened = flattened.drawn;
        if flattened.pages_failed > 0 {
            warn!("{} pages could not be flattened", flattened.pages_failed);
        }

        let purged = WidgetPurger::new().run(doc)?;
        report.widgets_removed = purged.removed;
        Ok(())
    }
}

impl SanitizeStrategy for PrimaryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Primary
    }

    fn apply(&self, doc: &mut PdfDocument, zones: Option<&ZoneMap>, report: &mut SanitizeReport) -> Result<()> {
        match self.config.mode {
            Mode::Clear => self.stage_clear_fields(doc, report)?,
            Mode::Purge => self.stage_purge_widgets(doc, report)?,
            Mode::Flatten => {
                self.stage_clear_fields(doc, report)?;
                self.stage_flatten(doc, report)?;
            }
        }
        run_content_passes(&self.config, doc, zones, report);
        Ok(())
    }
}

/// Structural clearing of the field tree, without per-type semantics
#[derive(Debug, Clone)]
pub struct FallbackStrategy {
    config: SanitizeConfig,
}

impl FallbackStrategy {
    pub fn new(config: SanitizeConfig) -> Self {
        Self { config }
    }
}

impl SanitizeStrategy for FallbackStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fallback
    }

    #[instrument(skip(self, doc, zones, report))]
    fn apply(&self, doc: &mut PdfDocument, zones: Option<&ZoneMap>, report: &mut SanitizeReport) -> Result<()> {
        info!("🧱 Clearing the form structurally");
        let cleaned = StructureCleaner::new().clean_form(doc)?;
        report.fields_seen = cleaned.fields_visited;
        report.fields_cleared = cleaned.fields_cleared;

        // Structural clearing leaves no appearance worth flattening
        if matches!(self.config.mode, Mode::Purge | Mode::Flatten) {
            match WidgetPurger::new().run(doc) {
                Ok(purged) => report.widgets_removed = purged.removed,
                Err(e) => warn!("Widgets left in place: {}", e),
            }
        }

        run_content_passes(&self.config, doc, zones, report);
        Ok(())
    }
}

/// Passes shared by both strategies. Their failures are absorbed.
fn run_content_passes(
    config: &SanitizeConfig,
    doc: &mut PdfDocument,
    zones: Option<&ZoneMap>,
    report: &mut SanitizeReport,
) {
    info!("🗒️ Purging annotations");
    let annotations = AnnotationPurger::new(config.annotation_scope).run(doc);
    report.annotations_removed = annotations.removed;
    report.annotations_failed = annotations.failed;

    info!("📎 Purging embedded files");
    let embedded = EmbeddedFilePurger::new().run(doc);
    report.embedded_files_removed = embedded.removed;
    report.embedded_files_failed = embedded.failed;

    if let Some(zones) = zones.filter(|z| !z.is_empty()) {
        info!("⬜ Redacting {} zones", zones.len());
        let redacted = ZoneRedactor::new().apply(doc, zones);
        report.zones_applied = redacted.applied;
        report.zones_skipped = redacted.skipped;
        report.glyphs_removed = redacted.content.glyphs_removed;
        report.images_removed = redacted.content.images_removed;
    }
}

/// Asks viewers to redraw emptied fields and drops the XFA copy of the data.
fn finalize_form(doc: &mut PdfDocument, config: &SanitizeConfig) {
    let Some(form) = doc.acroform_mut() else {
        return;
    };
    if config.need_appearances {
        form.set("NeedAppearances", Object::Boolean(true));
    }
    if config.strip_xfa && form.remove(b"XFA").is_some() {
        debug!("Removed XFA form data");
    }
}

/// Opens, sanitizes and saves documents
#[derive(Debug, Clone, Default)]
pub struct SanitizationEngine {
    config: SanitizeConfig,
}

impl SanitizationEngine {
    pub fn new(config: SanitizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SanitizeConfig {
        &self.config
    }

    fn strategies(&self) -> Vec<Box<dyn SanitizeStrategy>> {
        let primary = || Box::new(PrimaryStrategy::new(self.config.clone())) as Box<dyn SanitizeStrategy>;
        let fallback = || Box::new(FallbackStrategy::new(self.config.clone())) as Box<dyn SanitizeStrategy>;
        match self.config.method {
            Method::Auto => vec![primary(), fallback()],
            Method::Primary => vec![primary()],
            Method::Fallback => vec![fallback()],
        }
    }

    /// Sanitizes a loaded document in memory. With `Method::Auto`, a
    /// recoverable failure of the primary strategy restarts from the
    /// untouched document with the fallback strategy.
    #[instrument(skip(self, doc, zones))]
    pub fn sanitize_document(
        &self,
        mut doc: PdfDocument,
        zones: Option<&ZoneMap>,
    ) -> Result<(PdfDocument, SanitizeReport)> {
        let promoted = doc.promote_direct_widgets();
        if promoted > 0 {
            debug!("Moved {} direct widget dictionaries into objects", promoted);
        }

        let strategies = self.strategies();
        let count = strategies.len();
        let mut pristine = Some(doc);
        let mut primary_failure: Option<Error> = None;

        for (attempt, strategy) in strategies.iter().enumerate() {
            let Some(source) = pristine.take() else {
                break;
            };
            let last = attempt + 1 == count;
            let mut working = if last {
                source
            } else {
                let copy = source.clone();
                pristine = Some(source);
                copy
            };

            let mut report = SanitizeReport::new(self.config.mode, strategy.kind());
            match strategy.apply(&mut working, zones, &mut report) {
                Ok(()) => {
                    info!("✅ {} strategy succeeded", strategy.kind());
                    return Ok((working, report));
                }
                Err(e) if !last && e.is_recoverable_by_fallback() => {
                    warn!("{} strategy failed: {}; trying the next one", strategy.kind(), e);
                    primary_failure = Some(e);
                }
                Err(e) => {
                    return Err(match primary_failure {
                        Some(primary) => Error::StrategiesExhausted {
                            primary: primary.to_string(),
                            fallback: e.to_string(),
                        },
                        None => e,
                    });
                }
            }
        }

        Err(primary_failure.unwrap_or_else(|| Error::ConfigError("no sanitization strategy selected".into())))
    }

    /// Sanitizes PDF bytes and returns the compacted output bytes.
    pub fn sanitize_bytes(&self, bytes: &[u8], zones: Option<&ZoneMap>) -> Result<(Vec<u8>, SanitizeReport)> {
        let doc = PdfDocument::from_bytes(bytes)?;
        let (doc, mut report) = self.sanitize_document(doc, zones)?;
        let (output, saved) = SaveCompactor::new(self.config.compress).to_bytes(doc)?;
        report.objects_pruned = saved.objects_pruned;
        report.finish();
        Ok((output, report))
    }

    /// Full run for one file: open, sanitize, compact and save.
    #[instrument(skip(self, zones))]
    pub async fn sanitize_file(&self, input: &Path, output: &Path, zones: Option<&ZoneMap>) -> Result<SanitizeReport> {
        info!("🚦 Sanitizing {}", input.display());
        let doc = PdfDocument::open(input).await?;
        let (doc, mut report) = self.sanitize_document(doc, zones)?;

        info!("📦 Compacting and saving");
        let saved = SaveCompactor::new(self.config.compress).save(doc, output).await?;

        report.input = Some(input.to_path_buf());
        report.output = Some(output.to_path_buf());
        report.objects_pruned = saved.objects_pruned;
        report.finish();
        Ok(report)
    }
}

/// `form.pdf` becomes `form_cleared.pdf` (or `form_purged.pdf`,
/// `form_flattened.pdf`) beside it.
pub fn default_output_path(input: &Path, mode: Mode) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, mode.output_suffix(), ext.to_string_lossy()),
        None => format!("{}{}", stem, mode.output_suffix()),
    };
    input.with_file_name(name)
}
