//! Mail-merge and text surgery for .docx files with byte-faithful
//! round-tripping of everything the operation does not touch.

pub mod docx;
pub mod progress;
pub mod render;
