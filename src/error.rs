//! Error types for form sanitization
//!
//! Only [`Error`] ever reaches a caller. The per-entity enums below describe
//! failures that the passes absorb and count.

use std::{io, path::PathBuf, result::Result as StdResult};

use lopdf::ObjectId;
use thiserror::Error;

/// Result type for document-level operations
pub type Result<T> = StdResult<T, Error>;

/// Document-level failure: the current document cannot be sanitized
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Zone file error: {0}")]
    ZoneFileError(String),

    #[error("Failed to open {path}: {source}")]
    OpenError {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("PDF structure error: {0}")]
    StructureError(#[from] StructureError),

    #[error("Failed to save {path}: {reason}")]
    SaveError { path: PathBuf, reason: String },

    #[error("Both strategies failed: primary: {primary}; fallback: {fallback}")]
    StrategiesExhausted { primary: String, fallback: String },

    #[error("PDF error: {0}")]
    PdfError(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Broken document structure; terminal for the strategy that hit it
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StructureError {
    #[error("Missing required object: {0}")]
    MissingObject(String),

    #[error("Object {0:?} has the wrong type: expected {1}")]
    WrongType(ObjectId, &'static str),

    #[error("Page {0} is out of range")]
    PageOutOfRange(usize),

    #[error("Corrupted structure: {0}")]
    Corrupted(String),
}

/// Failure to drive one form field to its empty value
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FieldError {
    #[error("Field object {0:?} is missing")]
    Missing(ObjectId),

    #[error("Field object {0:?} is not a dictionary")]
    NotADictionary(ObjectId),

    #[error("Field {0:?} still holds a value after clearing")]
    StillFilled(ObjectId),
}

/// Failure to delete one annotation
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AnnotationError {
    #[error("Annotation list of page {0} is unreadable")]
    UnreadableList(usize),

    #[error("Annotation {0:?} could not be detached: {1}")]
    Detach(ObjectId, String),
}

/// Failure while enumerating or removing embedded files
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EmbeddedFileError {
    #[error("Document has no embedded-file table")]
    Unsupported,

    #[error("Embedded file entry {0} has no usable name")]
    Unnamed(usize),

    #[error("Embedded file {0:?} could not be removed")]
    NotRemoved(String),
}

/// Failure to apply one redaction zone or one page batch
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RedactionError {
    #[error("Page index {0} is outside the document")]
    PageOutOfRange(usize),

    #[error("Content of page {page} could not be rewritten: {reason}")]
    Content { page: usize, reason: String },
}

/// Failure to draw a page's widget appearances into its content
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FlattenError {
    #[error("Page {0} is not a dictionary")]
    NotAPage(usize),

    #[error("Content of page {page} could not be extended: {reason}")]
    Content { page: usize, reason: String },
}

impl Error {
    /// Whether the fallback strategy may still succeed after this failure.
    /// Open, save and I/O failures are final for the document.
    pub fn is_recoverable_by_fallback(&self) -> bool {
        matches!(self, Error::StructureError(_) | Error::PdfError(_))
    }
}
