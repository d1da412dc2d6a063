use crate::docx::xml::XmlPart;

pub const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_TYPE_HEADER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub const REL_TYPE_FOOTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
pub const REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

pub const NS_WORDPROCESSINGML: &str =
    "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

#[derive(Debug, Clone)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Target as written in the part, not yet resolved.
    pub target: String,
    pub external: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Relationships {
    rels: Vec<Relationship>,
}

impl Relationships {
    /// Reads `<Relationship Id= Type= Target= TargetMode=>` entries from a
    /// `.rels` part. Unknown elements are ignored.
    pub fn parse(part: &XmlPart) -> Self {
        let mut rels = Vec::new();
        for el in part.root.child_elements() {
            if el.name != "Relationship" {
                continue;
            }
            let (Some(id), Some(rel_type), Some(target)) = (
                el.attr_unescaped("Id"),
                el.attr_unescaped("Type"),
                el.attr_unescaped("Target"),
            ) else {
                continue;
            };
            let external = el
                .attr_unescaped("TargetMode")
                .map(|m| m == "External")
                .unwrap_or(false);
            rels.push(Relationship {
                id,
                rel_type,
                target,
                external,
            });
        }
        Relationships { rels }
    }

    pub fn by_id(&self, id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.id == id)
    }

    pub fn of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.rels.iter().filter(move |r| r.rel_type == rel_type)
    }

    pub fn first_of_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.rel_type == rel_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }
}

/// `.rels` part name for a part, e.g. `word/document.xml` ->
/// `word/_rels/document.xml.rels`. The package-level part name is `""`.
pub fn rels_part_name(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Directory of a part inside the archive, `""` for root-level parts.
pub fn part_dir(part_name: &str) -> &str {
    match part_name.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    }
}

/// Resolves a relationship target against the directory of its source part.
/// Leading `/` means archive-absolute; `..` and `.` segments collapse.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segs: Vec<&str> = Vec::new();
    for seg in base_dir.split('/').chain(target.split('/')) {
        match seg {
            "" | "." => {}
            ".." => {
                segs.pop();
            }
            s => segs.push(s),
        }
    }
    segs.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rels_part(xml: &str) -> Relationships {
        let part = XmlPart::parse("test.rels", xml.as_bytes()).unwrap();
        Relationships::parse(&part)
    }

    #[test]
    fn parses_entries_and_looks_up_by_id_and_type() {
        let rels = rels_part(
            r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="https://example.com/x.png" TargetMode="External"/>
</Relationships>"#,
        );
        assert_eq!(rels.by_id("rId2").unwrap().target, "media/image1.png");
        assert_eq!(rels.of_type(REL_TYPE_IMAGE).count(), 2);
        assert!(rels.by_id("rId3").unwrap().external);
        assert_eq!(
            rels.first_of_type(REL_TYPE_OFFICE_DOCUMENT).unwrap().id,
            "rId1"
        );
    }

    #[test]
    fn target_with_escaped_ampersand_is_unescaped() {
        let rels = rels_part(
            r#"<Relationships><Relationship Id="rId9" Type="t" Target="media/a&amp;b.png"/></Relationships>"#,
        );
        assert_eq!(rels.by_id("rId9").unwrap().target, "media/a&b.png");
    }

    #[test]
    fn rels_part_names() {
        assert_eq!(rels_part_name(""), "_rels/.rels");
        assert_eq!(
            rels_part_name("word/document.xml"),
            "word/_rels/document.xml.rels"
        );
        assert_eq!(rels_part_name("word/header1.xml"), "word/_rels/header1.xml.rels");
    }

    #[test]
    fn target_resolution() {
        assert_eq!(resolve_target("word", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("word", "../media/image1.png"), "media/image1.png");
        assert_eq!(resolve_target("word", "/docProps/thumbnail.jpeg"), "docProps/thumbnail.jpeg");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
        assert_eq!(resolve_target("word", "./header1.xml"), "word/header1.xml");
    }
}
