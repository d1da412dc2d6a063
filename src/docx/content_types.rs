use std::collections::BTreeMap;

use crate::docx::xml::{Element, XmlDecl, XmlNode, XmlPart};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// The `[Content_Types].xml` registry: extension defaults plus per-part
/// overrides. Extensions compare case-insensitively; part names are exact.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
    dirty: bool,
}

impl ContentTypes {
    pub fn parse(part: &XmlPart) -> Self {
        let mut defaults = BTreeMap::new();
        let mut overrides = BTreeMap::new();
        for el in part.root.child_elements() {
            match el.name.as_str() {
                "Default" => {
                    if let (Some(ext), Some(ct)) = (
                        el.attr_unescaped("Extension"),
                        el.attr_unescaped("ContentType"),
                    ) {
                        defaults.insert(ext.to_lowercase(), ct);
                    }
                }
                "Override" => {
                    if let (Some(name), Some(ct)) = (
                        el.attr_unescaped("PartName"),
                        el.attr_unescaped("ContentType"),
                    ) {
                        // Overrides are written with a leading slash; keys
                        // here use zip-style names without it.
                        overrides.insert(name.trim_start_matches('/').to_string(), ct);
                    }
                }
                _ => {}
            }
        }
        ContentTypes {
            defaults,
            overrides,
            dirty: false,
        }
    }

    pub fn resolve(&self, part_name: &str) -> Option<&str> {
        if let Some(ct) = self.overrides.get(part_name) {
            return Some(ct);
        }
        let ext = part_name.rsplit_once('.')?.1.to_lowercase();
        self.defaults.get(&ext).map(|s| s.as_str())
    }

    /// Records a per-part override. A no-op when the part already resolves
    /// to `content_type`, so untouched registries keep their original bytes.
    pub fn set_override(&mut self, part_name: &str, content_type: &str) {
        if self.resolve(part_name) == Some(content_type) {
            return;
        }
        self.overrides
            .insert(part_name.to_string(), content_type.to_string());
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Regenerates the part: defaults then overrides, each sorted, so the
    /// output is deterministic.
    pub fn serialize(&self) -> Vec<u8> {
        let mut root = Element::new("Types");
        root.attrs
            .push(("xmlns".to_string(), CONTENT_TYPES_NS.to_string()));
        for (ext, ct) in &self.defaults {
            let mut el = Element::new("Default");
            el.set_attr("Extension", ext);
            el.set_attr("ContentType", ct);
            root.children.push(XmlNode::Element(el));
        }
        for (name, ct) in &self.overrides {
            let mut el = Element::new("Override");
            el.set_attr("PartName", &format!("/{name}"));
            el.set_attr("ContentType", ct);
            root.children.push(XmlNode::Element(el));
        }
        XmlPart {
            name: CONTENT_TYPES_PART.to_string(),
            decl: Some(XmlDecl {
                version: "1.0".to_string(),
                encoding: Some("UTF-8".to_string()),
                standalone: Some("yes".to_string()),
            }),
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
        .serialize()
    }
}
