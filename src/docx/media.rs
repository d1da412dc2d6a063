use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::docx::document::Document;
use crate::docx::error::{AssetError, DocxError};
use crate::docx::rels::{self, REL_TYPE_IMAGE};

/// One image relationship: its id, the part that declares it, the resolved
/// media part name and the registered content type.
#[derive(Debug, Clone)]
pub struct MediaImage {
    pub rel_id: String,
    pub owner_part: String,
    pub target: String,
    pub content_type: Option<String>,
}

impl MediaImage {
    /// Registered content type, `-` when the registry has no entry.
    pub fn content_type_label(&self) -> &str {
        self.content_type.as_deref().unwrap_or("-")
    }
}

/// Image relationships of the main part first, then header and footer
/// parts, each in relationship order.
pub fn images(doc: &Document) -> Vec<MediaImage> {
    let mut out = Vec::new();
    for owner in doc.text_part_names() {
        let Some(owner_rels) = doc.part_rels.get(&owner) else {
            continue;
        };
        let base = rels::part_dir(&owner);
        for rel in owner_rels.of_type(REL_TYPE_IMAGE) {
            if rel.external {
                continue;
            }
            let target = rels::resolve_target(base, &rel.target);
            let content_type = doc.content_types.resolve(&target).map(|s| s.to_string());
            out.push(MediaImage {
                rel_id: rel.id.clone(),
                owner_part: owner.clone(),
                target,
                content_type,
            });
        }
    }
    out
}

#[derive(Debug)]
pub struct ExtractOutcome {
    pub rel_id: String,
    pub target: String,
    pub path: PathBuf,
    pub result: Result<(), AssetError>,
}

/// Writes every image media part into `dir`, one file per distinct media
/// part, named after the relationship id with an extension from the content
/// type. A failure writing one file is recorded in its outcome and the
/// remaining images are still written.
pub fn extract_all(doc: &Document, dir: &Path) -> Result<Vec<ExtractOutcome>, DocxError> {
    fs::create_dir_all(dir).map_err(|source| {
        DocxError::from(AssetError::Io {
            path: dir.to_path_buf(),
            source,
        })
    })?;
    let mut outcomes = Vec::new();
    let mut seen_targets: BTreeSet<String> = BTreeSet::new();
    let mut used_names: BTreeSet<String> = BTreeSet::new();
    for image in images(doc) {
        if !seen_targets.insert(image.target.clone()) {
            // same media part referenced again, e.g. from a header
            continue;
        }
        let ext = extension_for(&image);
        let mut file_name = format!("{}.{}", image.rel_id, ext);
        let mut n = 1;
        while !used_names.insert(file_name.clone()) {
            n += 1;
            file_name = format!("{}-{}.{}", image.rel_id, n, ext);
        }
        let path = dir.join(&file_name);
        let result = match doc.pkg.part(&image.target) {
            None => Err(AssetError::MissingMedia {
                target: image.target.clone(),
            }),
            Some(bytes) => fs::write(&path, bytes).map_err(|source| AssetError::Io {
                path: path.clone(),
                source,
            }),
        };
        outcomes.push(ExtractOutcome {
            rel_id: image.rel_id,
            target: image.target,
            path,
            result,
        });
    }
    Ok(outcomes)
}

/// Byte-level swap of the media part an image relationship points at. The
/// relationship graph, part name and display geometry are untouched; the
/// content-type registry gets an override only when the declared type
/// differs from the current one. Relationship ids are scoped to the part
/// declaring them, so the id is looked up in the main part first, then
/// headers and footers in discovery order; the first declaring part wins.
pub fn replace_image(
    doc: &mut Document,
    rel_id: &str,
    bytes: Vec<u8>,
    content_type: &str,
) -> Result<(), DocxError> {
    if !content_type.starts_with("image/") {
        return Err(AssetError::NotAnImage {
            content_type: content_type.to_string(),
        }
        .into());
    }
    let target = doc
        .text_part_names()
        .into_iter()
        .find_map(|owner| {
            let rel = doc
                .part_rels
                .get(&owner)?
                .by_id(rel_id)
                .filter(|r| r.rel_type == REL_TYPE_IMAGE && !r.external)?;
            Some(rels::resolve_target(rels::part_dir(&owner), &rel.target))
        })
        .ok_or_else(|| AssetError::UnknownRelationship {
            rel_id: rel_id.to_string(),
        })?;
    if !doc.pkg.has_part(&target) {
        return Err(AssetError::MissingMedia { target }.into());
    }
    doc.content_types.set_override(&target, content_type);
    doc.pkg.set_part(&target, bytes);
    Ok(())
}

fn extension_for(image: &MediaImage) -> String {
    if let Some(ct) = image.content_type.as_deref() {
        if let Some(ext) = extension_for_content_type(ct) {
            return ext.to_string();
        }
    }
    image
        .target
        .rsplit_once('.')
        .map(|(_, e)| e.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpeg"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        "image/x-emf" => Some("emf"),
        "image/x-wmf" => Some("wmf"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "emf" => Some("image/x-emf"),
        "wmf" => Some("image/x-wmf"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}
