use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::docx::document::{Document, TextScope};
use crate::docx::error::{AssetError, DocxError};

/// A value to substitute. The kind is declared by the caller, never sniffed
/// from the bytes: text values go through the run engine, image values are
/// routed to the media layer with the key taken as a relationship id.
#[derive(Debug, Clone)]
pub enum PlaceholderValue {
    Text(String),
    Image { bytes: Vec<u8>, content_type: String },
}

/// Keys are matched verbatim; text keys are usually `{TOKEN}` literals,
/// image keys are relationship ids like `rId4`. Ordered so application
/// order is deterministic.
pub type PlaceholderMap = BTreeMap<String, PlaceholderValue>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SubstitutionWarning {
    /// A key from the map matched nothing in the document.
    UnmatchedKey { key: String },
    /// A `{TOKEN}`-shaped token is still present after the merge.
    LeftoverToken { token: String },
}

/// Per-key substitution counts plus collected warnings. Warnings never
/// abort a merge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub counts: BTreeMap<String, usize>,
    pub warnings: Vec<SubstitutionWarning>,
}

impl MergeReport {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn note_leftovers(&mut self, tokens: &BTreeSet<String>) {
        for token in tokens {
            if !self.counts.contains_key(token) {
                self.warnings.push(SubstitutionWarning::LeftoverToken {
                    token: token.clone(),
                });
            }
        }
    }

    fn note(&mut self, key: &str, count: usize) {
        self.counts.insert(key.to_string(), count);
        if count == 0 {
            self.warnings.push(SubstitutionWarning::UnmatchedKey {
                key: key.to_string(),
            });
        }
    }
}

/// Applies every map entry once. Text keys replace across body, header,
/// footer and textbox paragraphs in a single pass per paragraph: every key
/// is matched against the paragraph's original text, so a replacement value
/// containing another key is left alone. An image key whose relationship id
/// is unknown becomes an unmatched-key warning rather than an error; other
/// media failures abort.
pub fn merge(doc: &mut Document, values: &PlaceholderMap) -> Result<MergeReport, DocxError> {
    let mut report = MergeReport::default();

    let text_pairs: Vec<(&str, &str)> = values
        .iter()
        .filter_map(|(key, value)| match value {
            PlaceholderValue::Text(replacement) => Some((key.as_str(), replacement.as_str())),
            PlaceholderValue::Image { .. } => None,
        })
        .collect();
    let counts = doc.replace_each(&text_pairs, TextScope::All)?;
    for ((key, _), count) in text_pairs.iter().zip(counts) {
        report.note(key, count);
    }

    for (key, value) in values {
        let PlaceholderValue::Image {
            bytes,
            content_type,
        } = value
        else {
            continue;
        };
        let count = match doc.replace_image(key, bytes.clone(), content_type) {
            Ok(()) => 1,
            Err(DocxError::Asset(AssetError::UnknownRelationship { .. })) => 0,
            Err(e) => return Err(e),
        };
        report.note(key, count);
    }
    Ok(report)
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[A-Za-z0-9_]+\}").expect("placeholder regex"));

/// `{TOKEN}`-shaped tokens present in any text-bearing paragraph, body,
/// headers, footers and textboxes included. Run after a merge to warn
/// about tokens the map did not cover.
pub fn scan_placeholders(doc: &mut Document) -> Result<BTreeSet<String>, DocxError> {
    let mut found = BTreeSet::new();
    let paras = doc.paragraphs(TextScope::All)?;
    for pref in &paras {
        let text = doc.paragraph_logical_text(pref)?;
        for m in PLACEHOLDER_RE.find_iter(&text) {
            found.insert(m.as_str().to_string());
        }
    }
    Ok(found)
}

/// Merge values loaded from a TOML file:
///
/// ```toml
/// version = 1
///
/// [text]
/// "{NAME}" = "Ada Lovelace"
///
/// [image.rId4]
/// path = "logo.png"
/// content_type = "image/png"
/// ```
///
/// Image bytes come from `path` (relative to the TOML file) or inline
/// `data_base64`, exactly one of the two.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeSpec {
    pub version: u32,
    #[serde(default)]
    pub text: BTreeMap<String, String>,
    #[serde(default)]
    pub image: BTreeMap<String, ImageSource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSource {
    pub path: Option<PathBuf>,
    pub data_base64: Option<String>,
    pub content_type: String,
}

impl MergeSpec {
    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read merge file: {}", path.display()))?;
        let spec: MergeSpec = toml::from_str(&raw)
            .with_context(|| format!("parse merge file: {}", path.display()))?;
        if spec.version != 1 {
            bail!("unsupported merge file version: {}", spec.version);
        }
        Ok(spec)
    }

    /// Resolves image sources into bytes. `base_dir` anchors relative image
    /// paths, normally the merge file's directory.
    pub fn into_placeholder_map(self, base_dir: &Path) -> anyhow::Result<PlaceholderMap> {
        let mut map: PlaceholderMap = BTreeMap::new();
        for (key, value) in self.text {
            map.insert(key, PlaceholderValue::Text(value));
        }
        for (rel_id, source) in self.image {
            if map.contains_key(&rel_id) {
                bail!("duplicate merge key: {rel_id}");
            }
            if !source.content_type.starts_with("image/") {
                bail!("{rel_id}: not an image content type: {}", source.content_type);
            }
            let bytes = match (&source.path, &source.data_base64) {
                (Some(p), None) => {
                    let full = if p.is_absolute() {
                        p.clone()
                    } else {
                        base_dir.join(p)
                    };
                    std::fs::read(&full)
                        .with_context(|| format!("read image for {rel_id}: {}", full.display()))?
                }
                (None, Some(b64)) => base64::engine::general_purpose::STANDARD
                    .decode(b64.trim())
                    .with_context(|| format!("decode base64 image for {rel_id}"))?,
                _ => bail!("{rel_id}: image needs exactly one of path or data_base64"),
            };
            map.insert(
                rel_id,
                PlaceholderValue::Image {
                    bytes,
                    content_type: source.content_type,
                },
            );
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::package::Package;
    use crate::docx::testutil::{docx_with_image, minimal_docx, para, run, split_runs, PNG_BYTES};

    fn doc_from(bytes: Vec<u8>) -> Document {
        Document::from_package(Package::from_bytes(bytes).unwrap()).unwrap()
    }

    fn text_map(pairs: &[(&str, &str)]) -> PlaceholderMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PlaceholderValue::Text(v.to_string())))
            .collect()
    }

    #[test]
    fn merge_counts_per_key() {
        let body = format!(
            "{}{}",
            para(&run("Dear {NAME}, your id is {ID}.")),
            para(&run("Bye {NAME}!"))
        );
        let mut doc = doc_from(minimal_docx(&body));
        let report = merge(&mut doc, &text_map(&[("{NAME}", "Ada"), ("{ID}", "7")])).unwrap();
        assert_eq!(report.counts["{NAME}"], 2);
        assert_eq!(report.counts["{ID}"], 1);
        assert!(report.warnings.is_empty());
        assert_eq!(
            doc.paragraph_text().unwrap(),
            vec!["Dear Ada, your id is 7.", "Bye Ada!"]
        );
    }

    #[test]
    fn split_run_placeholder_is_found_and_replaced() {
        let body = para(&split_runs(&["Hello ", "{NA", "ME}!"]));
        let mut doc = doc_from(minimal_docx(&body));
        let report = merge(&mut doc, &text_map(&[("{NAME}", "World")])).unwrap();
        assert_eq!(report.counts["{NAME}"], 1);
        assert_eq!(doc.paragraph_text().unwrap(), vec!["Hello World!"]);
    }

    #[test]
    fn unmatched_key_warns_with_zero_count() {
        let mut doc = doc_from(minimal_docx(&para(&run("no tokens here"))));
        let report = merge(&mut doc, &text_map(&[("{MISSING}", "x")])).unwrap();
        assert_eq!(report.counts["{MISSING}"], 0);
        assert!(matches!(
            report.warnings.as_slice(),
            [SubstitutionWarning::UnmatchedKey { key }] if key == "{MISSING}"
        ));
    }

    #[test]
    fn replacement_values_are_not_rescanned_by_other_keys() {
        let mut doc = doc_from(minimal_docx(&para(&run("{A} and {B}"))));
        let report = merge(
            &mut doc,
            &text_map(&[("{A}", "see {B}"), ("{B}", "two")]),
        )
        .unwrap();
        assert_eq!(report.counts["{A}"], 1);
        assert_eq!(report.counts["{B}"], 1);
        assert_eq!(doc.paragraph_text().unwrap(), vec!["see {B} and two"]);
    }

    #[test]
    fn merge_twice_is_a_no_op() {
        let body = para(&split_runs(&["{GREETING", "} world"]));
        let mut doc = doc_from(minimal_docx(&body));
        let map = text_map(&[("{GREETING}", "hello")]);
        assert_eq!(merge(&mut doc, &map).unwrap().counts["{GREETING}"], 1);
        assert_eq!(merge(&mut doc, &map).unwrap().counts["{GREETING}"], 0);
        assert_eq!(doc.paragraph_text().unwrap(), vec!["hello world"]);
    }

    #[test]
    fn image_key_routes_to_media_layer() {
        let mut doc = doc_from(docx_with_image(&para(&run("x"))));
        let mut map = PlaceholderMap::new();
        map.insert(
            "rId4".to_string(),
            PlaceholderValue::Image {
                bytes: vec![1, 2, 3],
                content_type: "image/png".to_string(),
            },
        );
        let report = merge(&mut doc, &map).unwrap();
        assert_eq!(report.counts["rId4"], 1);
        let out = doc.to_bytes().unwrap();
        let pkg = Package::from_bytes(out).unwrap();
        assert_eq!(pkg.part("word/media/image1.png"), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn unknown_image_key_is_a_warning_not_an_error() {
        let mut doc = doc_from(docx_with_image(&para(&run("x"))));
        let mut map = PlaceholderMap::new();
        map.insert(
            "rId99".to_string(),
            PlaceholderValue::Image {
                bytes: PNG_BYTES.to_vec(),
                content_type: "image/png".to_string(),
            },
        );
        let report = merge(&mut doc, &map).unwrap();
        assert_eq!(report.counts["rId99"], 0);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn scan_finds_leftover_tokens() {
        let body = format!(
            "{}{}",
            para(&run("done {A}")),
            para(&split_runs(&["{B", "_2}"]))
        );
        let mut doc = doc_from(minimal_docx(&body));
        let tokens = scan_placeholders(&mut doc).unwrap();
        let names: Vec<&str> = tokens.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["{A}", "{B_2}"]);
    }

    #[test]
    fn merge_spec_toml_round_trip() {
        let toml_src = r#"
version = 1

[text]
"{NAME}" = "Ada"

[image.rId4]
data_base64 = "AQID"
content_type = "image/png"
"#;
        let spec: MergeSpec = toml::from_str(toml_src).unwrap();
        assert_eq!(spec.version, 1);
        let map = spec.into_placeholder_map(Path::new(".")).unwrap();
        assert!(matches!(map.get("{NAME}"), Some(PlaceholderValue::Text(v)) if v == "Ada"));
        assert!(matches!(
            map.get("rId4"),
            Some(PlaceholderValue::Image { bytes, content_type })
                if bytes == &[1, 2, 3] && content_type == "image/png"
        ));
    }

    #[test]
    fn merge_spec_rejects_ambiguous_image_source() {
        let toml_src = r#"
version = 1

[image.rId4]
path = "a.png"
data_base64 = "AQID"
content_type = "image/png"
"#;
        let spec: MergeSpec = toml::from_str(toml_src).unwrap();
        assert!(spec.into_placeholder_map(Path::new(".")).is_err());
    }
}
