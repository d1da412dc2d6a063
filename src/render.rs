use std::path::Path;

use crate::docx::error::RenderError;

/// Converts a saved document file into PDF bytes.
///
/// The engine never renders on its own. Rendering needs an external
/// word-processor installation, so callers inject an implementation and own
/// its lifecycle, including any timeout; `RenderError::Timeout` is how an
/// implementation reports that the caller's deadline elapsed.
pub trait PdfRenderer {
    fn render(&self, document_path: &Path) -> Result<Vec<u8>, RenderError>;
}
