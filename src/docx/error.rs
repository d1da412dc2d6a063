use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures of the zip container itself, before any XML is involved.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("open {path}: {source}")]
    Open {
        path: PathBuf,
        source: io::Error,
    },
    #[error("{path}: not a zip archive: {source}")]
    NotAZip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    #[error("archive entry {name}: {source}")]
    Corrupt {
        name: String,
        source: zip::result::ZipError,
    },
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        source: zip::result::ZipError,
    },
}

/// Failures parsing or interpreting an XML part.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("{part}: malformed xml: {detail}")]
    Malformed { part: String, detail: String },
    #[error("{part}: no root element")]
    NoRoot { part: String },
    #[error("{part}: namespace not declared: {uri}")]
    UnresolvableNamespace { part: String, uri: String },
}

/// Violations of the package's internal reference graph.
#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("package has no main document part")]
    MissingMainDocument,
    #[error("referenced part missing from archive: {part}")]
    MissingPart { part: String },
    #[error("{part}: dangling relationship reference {rel_id}")]
    DanglingReference { part: String, rel_id: String },
    #[error("no content type for part: {part}")]
    ContentTypeGap { part: String },
}

/// Failures of image extraction and replacement.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("{rel_id}: not an image relationship")]
    UnknownRelationship { rel_id: String },
    #[error("{content_type}: not an image content type")]
    NotAnImage { content_type: String },
    #[error("media part missing: {target}")]
    MissingMedia { target: String },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
}

/// Failures reported by an injected PDF renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no pdf renderer available: {0}")]
    Unavailable(String),
    #[error("render timed out after {0:?}")]
    Timeout(Duration),
    #[error("renderer failed: {0}")]
    Failed(String),
}

/// Umbrella error for document-level operations.
#[derive(Debug, Error)]
pub enum DocxError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    Structure(#[from] StructuralError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

pub type Result<T> = std::result::Result<T, DocxError>;
