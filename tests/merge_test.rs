//! End-to-end tests against real files on disk: open, merge, save, and
//! the byte-level guarantees around them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use docmerge::docx::merge::{PlaceholderMap, PlaceholderValue};
use docmerge::docx::package::Package;
use docmerge::docx::verify::verify_equivalent;
use docmerge::docx::{Document, DocxError, TextScope};

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn content_types() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#,
        r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        r#"</Types>"#
    )
    .to_string()
}

fn package_rels() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
        r#"</Relationships>"#
    )
    .to_string()
}

fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{NS_W}" xmlns:r="{NS_R}"><w:body>{body}</w:body></w:document>"#
    )
}

fn write_docx(path: &Path, parts: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut zout = ZipWriter::new(file);
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in parts {
        zout.start_file(*name, opts).unwrap();
        zout.write_all(data).unwrap();
    }
    zout.finish().unwrap();
}

fn template(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("template.docx");
    write_docx(
        &path,
        &[
            ("[Content_Types].xml", content_types().as_bytes()),
            ("_rels/.rels", package_rels().as_bytes()),
            ("word/document.xml", document_xml(body).as_bytes()),
        ],
    );
    path
}

fn text_map(pairs: &[(&str, &str)]) -> PlaceholderMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), PlaceholderValue::Text(v.to_string())))
        .collect()
}

#[test]
fn merge_writes_output_and_never_touches_input() {
    let tmp = TempDir::new().unwrap();
    let input = template(tmp.path(), "<w:p><w:r><w:t>Dear {NAME},</w:t></w:r></w:p>");
    let original = fs::read(&input).unwrap();
    let out = tmp.path().join("filled.docx");

    let mut doc = Document::open(&input).unwrap();
    let report = doc.merge(&text_map(&[("{NAME}", "Ada")])).unwrap();
    assert_eq!(report.total(), 1);
    doc.save(&out).unwrap();

    assert_eq!(fs::read(&input).unwrap(), original);
    let mut filled = Document::open(&out).unwrap();
    assert_eq!(filled.paragraph_text().unwrap(), vec!["Dear Ada,"]);
}

#[test]
fn save_leaves_no_temp_files_behind() {
    let tmp = TempDir::new().unwrap();
    let input = template(tmp.path(), "<w:p><w:r><w:t>{X}</w:t></w:r></w:p>");
    let out = tmp.path().join("out.docx");

    let mut doc = Document::open(&input).unwrap();
    doc.merge(&text_map(&[("{X}", "y")])).unwrap();
    doc.save(&out).unwrap();

    let mut names: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["out.docx", "template.docx"]);
}

#[test]
fn merging_an_already_merged_file_changes_nothing() {
    let tmp = TempDir::new().unwrap();
    let input = template(
        tmp.path(),
        "<w:p><w:r><w:t>Hello {WHO}, welcome.</w:t></w:r></w:p>",
    );
    let out1 = tmp.path().join("once.docx");
    let out2 = tmp.path().join("twice.docx");
    let map = text_map(&[("{WHO}", "Ada")]);

    let mut doc = Document::open(&input).unwrap();
    assert_eq!(doc.merge(&map).unwrap().total(), 1);
    doc.save(&out1).unwrap();

    let mut again = Document::open(&out1).unwrap();
    let second = again.merge(&map).unwrap();
    assert_eq!(second.total(), 0);
    assert_eq!(second.warnings.len(), 1);
    again.save(&out2).unwrap();

    verify_equivalent(&out1, &out2).unwrap();
}

#[test]
fn untouched_parts_survive_byte_identical() {
    let tmp = TempDir::new().unwrap();
    // deliberately odd spacing that a re-serialization would normalize
    let styles = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
        "<w:styles xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"  >\n",
        "  <w:style w:styleId=\"Normal\"  />\n",
        "</w:styles>\n"
    );
    let input = tmp.path().join("styled.docx");
    write_docx(
        &input,
        &[
            ("[Content_Types].xml", content_types().as_bytes()),
            ("_rels/.rels", package_rels().as_bytes()),
            (
                "word/document.xml",
                document_xml("<w:p><w:r><w:t>swap {K}</w:t></w:r></w:p>").as_bytes(),
            ),
            ("word/styles.xml", styles.as_bytes()),
        ],
    );
    let out = tmp.path().join("swapped.docx");

    let mut doc = Document::open(&input).unwrap();
    assert_eq!(doc.find_replace("{K}", "v", TextScope::Body).unwrap(), 1);
    doc.save(&out).unwrap();

    let written = Package::open(&out).unwrap();
    assert_eq!(written.part("word/styles.xml"), Some(styles.as_bytes()));
}

#[test]
fn save_replaces_an_existing_output_file() {
    let tmp = TempDir::new().unwrap();
    let input = template(tmp.path(), "<w:p><w:r><w:t>{A}</w:t></w:r></w:p>");
    let out = tmp.path().join("target.docx");
    fs::write(&out, b"stale bytes").unwrap();

    let mut doc = Document::open(&input).unwrap();
    doc.merge(&text_map(&[("{A}", "b")])).unwrap();
    doc.save(&out).unwrap();

    let mut written = Document::open(&out).unwrap();
    assert_eq!(written.paragraph_text().unwrap(), vec!["b"]);
}

#[test]
fn open_missing_file_reports_archive_error() {
    let err = Document::open(Path::new("/nonexistent/nope.docx")).unwrap_err();
    assert!(matches!(err, DocxError::Archive(_)));
}
