use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::docx::content_types::{ContentTypes, CONTENT_TYPES_PART};
use crate::docx::error::{DocxError, StructuralError, XmlError};
use crate::docx::media::{self, ExtractOutcome, MediaImage};
use crate::docx::merge::{self, MergeReport, PlaceholderMap};
use crate::docx::package::Package;
use crate::docx::rels::{
    self, Relationships, NS_RELATIONSHIPS, NS_WORDPROCESSINGML, REL_TYPE_FOOTER, REL_TYPE_HEADER,
    REL_TYPE_IMAGE, REL_TYPE_OFFICE_DOCUMENT,
};
use crate::docx::text;
use crate::docx::xml::{qname, Element, XmlNode, XmlPart};

/// Which paragraphs a text operation touches. Body, header and footer
/// scopes exclude textbox content; the textbox scope is those paragraphs
/// alone, wherever the textbox occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextScope {
    Body,
    Headers,
    Footers,
    Textboxes,
    All,
}

/// Locator for one paragraph: part name plus the child-index path from the
/// part root to the `w:p`. Valid until the document is structurally
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphRef {
    pub part: String,
    pub path: Vec<usize>,
}

/// A docx package with its parsed parts. Parts are parsed on first use and
/// serialized back only when an operation changed them, so untouched parts
/// keep their original bytes through a save.
#[derive(Debug)]
pub struct Document {
    pub(crate) pkg: Package,
    parts: HashMap<String, XmlPart>,
    dirty: BTreeSet<String>,
    pub(crate) content_types: ContentTypes,
    pub(crate) main_part: String,
    pub(crate) headers: Vec<String>,
    pub(crate) footers: Vec<String>,
    pub(crate) part_rels: HashMap<String, Relationships>,
}

impl Document {
    pub fn open(path: &Path) -> Result<Self, DocxError> {
        let pkg = Package::open(path)?;
        Self::from_package(pkg)
    }

    pub fn from_package(pkg: Package) -> Result<Self, DocxError> {
        let ct_bytes = pkg
            .part(CONTENT_TYPES_PART)
            .ok_or_else(|| StructuralError::MissingPart {
                part: CONTENT_TYPES_PART.to_string(),
            })?;
        let content_types = ContentTypes::parse(&XmlPart::parse(CONTENT_TYPES_PART, ct_bytes)?);

        let package_rels_name = rels::rels_part_name("");
        let package_rels = match pkg.part(&package_rels_name) {
            Some(bytes) => Relationships::parse(&XmlPart::parse(&package_rels_name, bytes)?),
            None => Relationships::default(),
        };
        let main_part = package_rels
            .first_of_type(REL_TYPE_OFFICE_DOCUMENT)
            .filter(|r| !r.external)
            .map(|r| rels::resolve_target("", &r.target))
            .ok_or(StructuralError::MissingMainDocument)?;
        if !pkg.has_part(&main_part) {
            return Err(StructuralError::MissingMainDocument.into());
        }

        let mut doc = Document {
            pkg,
            parts: HashMap::new(),
            dirty: BTreeSet::new(),
            content_types,
            main_part: main_part.clone(),
            headers: Vec::new(),
            footers: Vec::new(),
            part_rels: HashMap::new(),
        };
        doc.load_rels(&main_part)?;

        let base = rels::part_dir(&main_part).to_string();
        let mut headers = Vec::new();
        let mut footers = Vec::new();
        if let Some(main_rels) = doc.part_rels.get(&main_part) {
            for rel in main_rels.iter() {
                if rel.external {
                    continue;
                }
                if rel.rel_type == REL_TYPE_HEADER {
                    headers.push(rels::resolve_target(&base, &rel.target));
                } else if rel.rel_type == REL_TYPE_FOOTER {
                    footers.push(rels::resolve_target(&base, &rel.target));
                }
            }
        }
        doc.headers = headers;
        doc.footers = footers;

        let hf: Vec<String> = doc.headers.iter().chain(doc.footers.iter()).cloned().collect();
        for name in &hf {
            if !doc.pkg.has_part(name) {
                return Err(StructuralError::MissingPart { part: name.clone() }.into());
            }
            doc.load_rels(name)?;
        }

        doc.validate()?;
        Ok(doc)
    }

    fn load_rels(&mut self, part_name: &str) -> Result<(), DocxError> {
        let rels_name = rels::rels_part_name(part_name);
        let rels = match self.pkg.part(&rels_name) {
            Some(bytes) => Relationships::parse(&XmlPart::parse(&rels_name, bytes)?),
            None => Relationships::default(),
        };
        self.part_rels.insert(part_name.to_string(), rels);
        Ok(())
    }

    /// Structural invariants checked up front: every stored part has a
    /// content type, every image relationship points at a stored part, and
    /// every image reference, `r:embed` or `r:id` on a VML `imagedata`,
    /// resolves in its owning part's relationships.
    fn validate(&mut self) -> Result<(), DocxError> {
        for entry in self.pkg.entries() {
            if entry.is_dir || entry.name == CONTENT_TYPES_PART {
                continue;
            }
            if self.content_types.resolve(&entry.name).is_none() {
                return Err(StructuralError::ContentTypeGap {
                    part: entry.name.clone(),
                }
                .into());
            }
        }

        for (owner, owner_rels) in &self.part_rels {
            let base = rels::part_dir(owner);
            for rel in owner_rels.of_type(REL_TYPE_IMAGE) {
                if rel.external {
                    continue;
                }
                let target = rels::resolve_target(base, &rel.target);
                if !self.pkg.has_part(&target) {
                    return Err(StructuralError::MissingPart { part: target }.into());
                }
            }
        }

        for part_name in self.text_part_names() {
            self.ensure_parsed(&part_name)?;
            let Some(part) = self.parts.get(&part_name) else {
                continue;
            };
            let Some(r) = part.root.prefix_for_uri(NS_RELATIONSHIPS) else {
                continue;
            };
            if r.is_empty() {
                continue;
            }
            let embed_key = format!("{r}:embed");
            let id_key = format!("{r}:id");
            let mut refs = Vec::new();
            collect_attr_values(&part.root, &embed_key, &mut refs);
            collect_imagedata_refs(&part.root, &id_key, &mut refs);
            for rel_id in refs {
                let known = self
                    .part_rels
                    .get(&part_name)
                    .map(|rr| rr.by_id(&rel_id).is_some())
                    .unwrap_or(false);
                if !known {
                    return Err(StructuralError::DanglingReference {
                        part: part_name.clone(),
                        rel_id,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn main_part_name(&self) -> &str {
        &self.main_part
    }

    pub fn header_part_names(&self) -> &[String] {
        &self.headers
    }

    pub fn footer_part_names(&self) -> &[String] {
        &self.footers
    }

    pub(crate) fn text_part_names(&self) -> Vec<String> {
        let mut names = vec![self.main_part.clone()];
        names.extend(self.headers.iter().cloned());
        names.extend(self.footers.iter().cloned());
        names
    }

    fn ensure_parsed(&mut self, name: &str) -> Result<(), DocxError> {
        if self.parts.contains_key(name) {
            return Ok(());
        }
        let bytes = self
            .pkg
            .part(name)
            .ok_or_else(|| StructuralError::MissingPart {
                part: name.to_string(),
            })?;
        let part = XmlPart::parse(name, bytes)?;
        self.parts.insert(name.to_string(), part);
        Ok(())
    }

    /// Prefix the part binds to the wordprocessingml namespace (usually
    /// `w`, possibly `` for a default-namespace producer).
    fn w_prefix_of(&self, part_name: &str) -> Result<String, DocxError> {
        let part = self
            .parts
            .get(part_name)
            .ok_or_else(|| StructuralError::MissingPart {
                part: part_name.to_string(),
            })?;
        part.root
            .prefix_for_uri(NS_WORDPROCESSINGML)
            .ok_or_else(|| {
                XmlError::UnresolvableNamespace {
                    part: part_name.to_string(),
                    uri: NS_WORDPROCESSINGML.to_string(),
                }
                .into()
            })
    }

    pub fn paragraphs(&mut self, scope: TextScope) -> Result<Vec<ParagraphRef>, DocxError> {
        let mut out = Vec::new();
        match scope {
            TextScope::Body => {
                let main = self.main_part.clone();
                self.collect_scope(&main, false, &mut out)?;
            }
            TextScope::Headers => {
                for name in self.headers.clone() {
                    self.collect_scope(&name, false, &mut out)?;
                }
            }
            TextScope::Footers => {
                for name in self.footers.clone() {
                    self.collect_scope(&name, false, &mut out)?;
                }
            }
            TextScope::Textboxes => {
                for name in self.text_part_names() {
                    self.collect_scope(&name, true, &mut out)?;
                }
            }
            TextScope::All => {
                out.extend(self.paragraphs(TextScope::Body)?);
                out.extend(self.paragraphs(TextScope::Headers)?);
                out.extend(self.paragraphs(TextScope::Footers)?);
                out.extend(self.paragraphs(TextScope::Textboxes)?);
            }
        }
        Ok(out)
    }

    fn collect_scope(
        &mut self,
        part_name: &str,
        textbox: bool,
        out: &mut Vec<ParagraphRef>,
    ) -> Result<(), DocxError> {
        self.ensure_parsed(part_name)?;
        let w = self.w_prefix_of(part_name)?;
        let Some(part) = self.parts.get(part_name) else {
            return Ok(());
        };
        let p_tag = qname(&w, "p");
        let txbx_tag = qname(&w, "txbxContent");
        let mut path = Vec::new();
        collect_paragraphs(
            &part.root, &p_tag, &txbx_tag, false, textbox, &mut path, part_name, out,
        );
        Ok(())
    }

    /// Replaces every occurrence of `needle` within single paragraphs of the
    /// scope. Matches never cross a paragraph boundary. Returns the number
    /// of occurrences replaced.
    pub fn find_replace(
        &mut self,
        needle: &str,
        replacement: &str,
        scope: TextScope,
    ) -> Result<usize, DocxError> {
        let counts = self.replace_each(&[(needle, replacement)], scope)?;
        Ok(counts.first().copied().unwrap_or(0))
    }

    /// Replaces several needles at once, one pass per paragraph. All matches
    /// are taken over a paragraph's text before any of them is applied, so a
    /// replacement value containing another needle is never matched itself.
    /// Returns per-pair counts in pair order.
    pub fn replace_each(
        &mut self,
        pairs: &[(&str, &str)],
        scope: TextScope,
    ) -> Result<Vec<usize>, DocxError> {
        let mut counts = vec![0usize; pairs.len()];
        if pairs.iter().all(|(needle, _)| needle.is_empty()) {
            return Ok(counts);
        }
        let mut paras = self.paragraphs(scope)?;
        // Textbox paragraphs nest inside body paragraphs. Deeper paths go
        // first so run removal in an enclosing paragraph cannot shift a
        // pending inner path.
        paras.sort_by(|a, b| a.part.cmp(&b.part).then_with(|| b.path.cmp(&a.path)));
        for pref in &paras {
            let w = self.w_prefix_of(&pref.part)?;
            let Some(part) = self.parts.get_mut(&pref.part) else {
                continue;
            };
            let Some(para) = part.element_mut(&pref.path) else {
                continue;
            };
            let per = text::replace_each_in_paragraph(para, &w, pairs);
            if per.iter().any(|&n| n > 0) {
                self.dirty.insert(pref.part.clone());
            }
            for (slot, n) in counts.iter_mut().zip(per) {
                *slot += n;
            }
        }
        Ok(counts)
    }

    /// Matchable text of one paragraph, the concatenation its runs form.
    pub fn paragraph_logical_text(&mut self, pref: &ParagraphRef) -> Result<String, DocxError> {
        self.ensure_parsed(&pref.part)?;
        let w = self.w_prefix_of(&pref.part)?;
        let Some(part) = self.parts.get(&pref.part) else {
            return Ok(String::new());
        };
        let Some(el) = part.element(&pref.path) else {
            return Ok(String::new());
        };
        Ok(text::ParagraphText::collect(el, &w).text().to_string())
    }

    /// Reading text of every paragraph of the main part in document order,
    /// textbox paragraphs included where they occur.
    pub fn paragraph_text(&mut self) -> Result<Vec<String>, DocxError> {
        let main = self.main_part.clone();
        self.ensure_parsed(&main)?;
        let w = self.w_prefix_of(&main)?;
        let Some(part) = self.parts.get(&main) else {
            return Ok(Vec::new());
        };
        let p_tag = qname(&w, "p");
        let mut out = Vec::new();
        collect_all_paragraph_text(&part.root, &p_tag, &w, &mut out);
        Ok(out)
    }

    /// Reading text of every textbox paragraph across main, header and
    /// footer parts.
    pub fn textbox_text(&mut self) -> Result<Vec<String>, DocxError> {
        let paras = self.paragraphs(TextScope::Textboxes)?;
        let mut out = Vec::new();
        for pref in &paras {
            let w = self.w_prefix_of(&pref.part)?;
            let Some(part) = self.parts.get(&pref.part) else {
                continue;
            };
            let Some(el) = part.element(&pref.path) else {
                continue;
            };
            out.push(text::paragraph_display_text(el, &w));
        }
        Ok(out)
    }

    pub fn merge(&mut self, values: &PlaceholderMap) -> Result<MergeReport, DocxError> {
        merge::merge(self, values)
    }

    pub fn media_images(&self) -> Vec<MediaImage> {
        media::images(self)
    }

    pub fn extract_images(&self, dir: &Path) -> Result<Vec<ExtractOutcome>, DocxError> {
        media::extract_all(self, dir)
    }

    pub fn replace_image(
        &mut self,
        rel_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DocxError> {
        media::replace_image(self, rel_id, bytes, content_type)
    }

    /// Serializes dirty parts back into the archive. Untouched parts keep
    /// their original bytes.
    fn flush(&mut self) {
        let dirty = std::mem::take(&mut self.dirty);
        for name in dirty {
            if let Some(part) = self.parts.get(&name) {
                self.pkg.set_part(&name, part.serialize());
            }
        }
        if self.content_types.is_dirty() {
            self.pkg.set_part(CONTENT_TYPES_PART, self.content_types.serialize());
            self.content_types.clear_dirty();
        }
    }

    /// Writes the package to `path` via a temp file promoted on success.
    /// The file this document was opened from is never touched.
    pub fn save(&mut self, path: &Path) -> Result<(), DocxError> {
        self.flush();
        self.pkg.write(path)?;
        Ok(())
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>, DocxError> {
        self.flush();
        Ok(self.pkg.to_bytes()?)
    }
}

fn collect_attr_values(el: &Element, key: &str, out: &mut Vec<String>) {
    if let Some(v) = el.attr_unescaped(key) {
        out.push(v);
    }
    for c in el.child_elements() {
        collect_attr_values(c, key, out);
    }
}

/// `r:id` values on VML `imagedata` elements, the fallback form an image
/// takes inside `mc:AlternateContent` and legacy picts. `r:id` appears on
/// many other elements (hyperlinks among them), so the element name is what
/// scopes this to media references.
fn collect_imagedata_refs(el: &Element, id_key: &str, out: &mut Vec<String>) {
    for c in el.child_elements() {
        let local = c.name.rsplit_once(':').map(|(_, l)| l).unwrap_or(&c.name);
        if local == "imagedata" {
            if let Some(v) = c.attr_unescaped(id_key) {
                out.push(v);
            }
        }
        collect_imagedata_refs(c, id_key, out);
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_paragraphs(
    el: &Element,
    p_tag: &str,
    txbx_tag: &str,
    inside_txbx: bool,
    want_txbx: bool,
    path: &mut Vec<usize>,
    part_name: &str,
    out: &mut Vec<ParagraphRef>,
) {
    for (i, child) in el.children.iter().enumerate() {
        let XmlNode::Element(c) = child else { continue };
        path.push(i);
        if c.name == p_tag && inside_txbx == want_txbx {
            out.push(ParagraphRef {
                part: part_name.to_string(),
                path: path.clone(),
            });
        }
        let inside = inside_txbx || c.name == txbx_tag;
        collect_paragraphs(c, p_tag, txbx_tag, inside, want_txbx, path, part_name, out);
        path.pop();
    }
}

fn collect_all_paragraph_text(el: &Element, p_tag: &str, w: &str, out: &mut Vec<String>) {
    for c in el.child_elements() {
        if c.name == p_tag {
            out.push(text::paragraph_display_text(c, w));
        }
        collect_all_paragraph_text(c, p_tag, w, out);
    }
}
