//! Everything that reads, edits and writes .docx packages: the zip
//! container, the XML part model, relationships and content types, the
//! run-level text engine, placeholder merging, image assets, and the
//! round-trip verifier.

pub mod content_types;
pub mod document;
pub mod error;
pub mod media;
pub mod merge;
pub mod package;
pub mod rels;
pub mod text;
pub mod verify;
pub mod xml;

#[cfg(test)]
pub(crate) mod testutil;

pub use document::{Document, ParagraphRef, TextScope};
pub use error::{DocxError, Result};
