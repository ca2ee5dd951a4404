//! formscrub command-line interface
//!
//! Clears or purges filled-in PDF forms, one file at a time or over a whole
//! directory, with optional zone redaction.

use clap::{Arg, ArgAction, Command, ValueEnum};
use formscrub::config::{AnnotationScope, FileConfig, Method, Mode};
use formscrub::utils::init_logging;
use formscrub::{default_output_path, run_batch, SanitizationEngine, ZoneMap};
use std::path::PathBuf;
use std::process;
use tracing::{debug, error, info};

#[derive(Debug, Clone, ValueEnum)]
enum CliMethod {
    /// Primary strategy, falling back to structural clearing (default)
    Auto,
    /// Field-type-aware clearing only
    Primary,
    /// Structural clearing only
    Fallback,
}

#[derive(Debug, Clone, ValueEnum)]
enum CliMode {
    /// Empty every field, keep the form (default)
    Clear,
    /// Remove the form widgets entirely
    Purge,
    /// Clear, then draw the empty form into the pages
    Flatten,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages (default)
    Info,
    /// Debug and all messages
    Debug,
    /// Trace and all messages (most verbose)
    Trace,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let log_level = matches.get_one::<LogLevel>("verbose").unwrap_or(&LogLevel::Info);
    init_logging(log_level.as_filter()).expect("Failed to set tracing subscriber");

    let Some(input) = matches.get_one::<String>("input").map(PathBuf::from) else {
        error!("❌ No input given");
        process::exit(2);
    };

    // Configuration file first, command-line flags on top
    let mut file_config = match matches.get_one::<String>("config") {
        Some(path) => match FileConfig::load(path.as_ref()).await {
            Ok(config) => config,
            Err(e) => {
                error!("❌ Failed to load config file: {}", e);
                process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    let config = &mut file_config.sanitize;
    if let Some(method) = matches.get_one::<CliMethod>("method") {
        config.method = match method {
            CliMethod::Auto => Method::Auto,
            CliMethod::Primary => Method::Primary,
            CliMethod::Fallback => Method::Fallback,
        };
    }
    if let Some(mode) = matches.get_one::<CliMode>("mode") {
        config.mode = match mode {
            CliMode::Clear => Mode::Clear,
            CliMode::Purge => Mode::Purge,
            CliMode::Flatten => Mode::Flatten,
        };
    }
    if matches.get_flag("all-annotations") {
        config.annotation_scope = AnnotationScope::All;
    }
    if matches.get_flag("keep-xfa") {
        config.strip_xfa = false;
    }
    if let Some(pattern) = matches.get_one::<String>("pattern") {
        file_config.batch.pattern = pattern.clone();
    }
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        file_config.batch.output_dir = Some(PathBuf::from(dir));
    }
    debug!("Configuration: {:?}", file_config);

    let zones = match matches.get_one::<String>("zones") {
        Some(path) => match ZoneMap::load(path.as_ref()).await {
            Ok(zones) => {
                info!("⬜ Loaded {} zones from {}", zones.len(), path);
                Some(zones)
            }
            Err(e) => {
                error!("❌ Failed to load zone file: {}", e);
                process::exit(1);
            }
        },
        None => None,
    };

    let engine = SanitizationEngine::new(file_config.sanitize.clone());
    let report_path = matches.get_one::<String>("report").map(PathBuf::from);

    if matches.get_flag("batch") {
        let summary = match run_batch(&engine, &input, &file_config.batch, zones.as_ref()).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("❌ Batch run failed: {}", e);
                process::exit(1);
            }
        };
        println!("{}", summary);
        if let Some(path) = report_path {
            if let Err(e) = summary.write_json(&path).await {
                error!("❌ Failed to write report {}: {}", path.display(), e);
            }
        }
        return;
    }

    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&input, engine.config().mode));

    match engine.sanitize_file(&input, &output, zones.as_ref()).await {
        Ok(report) => {
            println!("{}", report);
            if let Some(path) = report_path {
                if let Err(e) = report.write_json(&path).await {
                    error!("❌ Failed to write report {}: {}", path.display(), e);
                }
            }
        }
        Err(e) => {
            error!("❌ Sanitization failed: {}", e);
            println!("FAILED  {}: {}", input.display(), e);
        }
    }
}

fn build_cli() -> Command {
    Command::new("formscrub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Clears, purges and zone-redacts filled-in PDF forms")
        .long_about("Removes user-entered data from PDF forms: field values, markup annotations, \
                    embedded files and, with a zone file, page content inside the given rectangles. \
                    The output is garbage-collected so removed data does not survive in the file.")

        // Input/Output
        .arg(Arg::new("input")
            .value_name("INPUT")
            .help("Input PDF file, or a directory with --batch")
            .required(true))

        .arg(Arg::new("output")
            .value_name("OUTPUT")
            .help("Output PDF file (default: input with a _cleared, _purged or _flattened suffix)")
            .conflicts_with("batch"))

        // Processing options
        .arg(Arg::new("zones")
            .short('z')
            .long("zones")
            .value_name("FILE")
            .help("Zone file (JSON) with page rectangles to redact"))

        .arg(Arg::new("method")
            .long("method")
            .value_parser(clap::builder::EnumValueParser::<CliMethod>::new())
            .help("Sanitization strategy [default: auto]"))

        .arg(Arg::new("mode")
            .long("mode")
            .value_parser(clap::builder::EnumValueParser::<CliMode>::new())
            .help("Clear field values, purge the form, or clear and flatten it [default: clear]"))

        .arg(Arg::new("all-annotations")
            .long("all-annotations")
            .action(ArgAction::SetTrue)
            .help("Remove every non-widget annotation, not only markup"))

        .arg(Arg::new("keep-xfa")
            .long("keep-xfa")
            .action(ArgAction::SetTrue)
            .help("Leave the XFA form data in place"))

        // Configuration
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("Configuration file (JSON/YAML)"))

        .arg(Arg::new("report")
            .short('r')
            .long("report")
            .value_name("FILE")
            .help("Write the sanitization report as JSON"))

        // Batch mode
        .arg(Arg::new("batch")
            .long("batch")
            .action(ArgAction::SetTrue)
            .help("Process every eligible PDF in the INPUT directory"))

        .arg(Arg::new("pattern")
            .long("pattern")
            .value_name("GLOB")
            .requires("batch")
            .help("File name pattern for batch mode [default: *.pdf]"))

        .arg(Arg::new("output-dir")
            .long("output-dir")
            .value_name("DIR")
            .requires("batch")
            .help("Output directory for batch mode"))

        // Logging
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .value_parser(clap::builder::EnumValueParser::<LogLevel>::new())
            .default_value("info")
            .help("Set logging verbosity"))
}
