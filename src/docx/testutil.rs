//! In-memory docx fixtures for tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub(crate) const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x00,
];

pub(crate) fn zip_bytes(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in parts {
        zout.start_file(*name, opts).unwrap();
        zout.write_all(data).unwrap();
    }
    zout.finish().unwrap().into_inner()
}

pub(crate) fn content_types_xml() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#,
        r#"<Default Extension="png" ContentType="image/png"/>"#,
        r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        r#"</Types>"#
    )
    .to_string()
}

pub(crate) fn package_rels_xml() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
        r#"</Relationships>"#
    )
    .to_string()
}

pub(crate) fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{NS_W}" xmlns:r="{NS_R}"><w:body>{body}</w:body></w:document>"#
    )
}

pub(crate) fn doc_rels_xml(entries: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{entries}</Relationships>"#
    )
}

pub(crate) fn run(text: &str) -> String {
    format!("<w:r><w:t>{text}</w:t></w:r>")
}

pub(crate) fn para(runs: &str) -> String {
    format!("<w:p>{runs}</w:p>")
}

pub(crate) fn split_runs(texts: &[&str]) -> String {
    texts.iter().map(|t| run(t)).collect::<Vec<_>>().join("")
}

pub(crate) fn minimal_docx(body: &str) -> Vec<u8> {
    zip_bytes(&[
        ("[Content_Types].xml", content_types_xml().as_bytes()),
        ("_rels/.rels", package_rels_xml().as_bytes()),
        ("word/document.xml", document_xml(body).as_bytes()),
    ])
}

fn image_para(rel_id: &str) -> String {
    format!(
        r#"<w:p><w:r><w:drawing><a:blip xmlns:a="urn:drawing" r:embed="{rel_id}"/></w:drawing></w:r></w:p>"#
    )
}

pub(crate) fn docx_with_image(body: &str) -> Vec<u8> {
    let body = format!("{body}{}", image_para("rId4"));
    let rels = doc_rels_xml(
        r#"<Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>"#,
    );
    zip_bytes(&[
        ("[Content_Types].xml", content_types_xml().as_bytes()),
        ("_rels/.rels", package_rels_xml().as_bytes()),
        ("word/document.xml", document_xml(&body).as_bytes()),
        ("word/_rels/document.xml.rels", rels.as_bytes()),
        ("word/media/image1.png", PNG_BYTES),
    ])
}

pub(crate) fn docx_with_two_images(body: &str) -> Vec<u8> {
    let body = format!("{body}{}{}", image_para("rId4"), image_para("rId5"));
    let rels = doc_rels_xml(concat!(
        r#"<Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>"#,
        r#"<Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image2.png"/>"#
    ));
    zip_bytes(&[
        ("[Content_Types].xml", content_types_xml().as_bytes()),
        ("_rels/.rels", package_rels_xml().as_bytes()),
        ("word/document.xml", document_xml(&body).as_bytes()),
        ("word/_rels/document.xml.rels", rels.as_bytes()),
        ("word/media/image1.png", PNG_BYTES),
        ("word/media/image2.png", &[0xFFu8, 0xD8, 0xFF, 0xE0]),
    ])
}

pub(crate) fn header_docx(body_text: &str, header_text: &str) -> Vec<u8> {
    let rels = doc_rels_xml(
        r#"<Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>"#,
    );
    let header = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr xmlns:w="{NS_W}" xmlns:r="{NS_R}"><w:p><w:r><w:t>{header_text}</w:t></w:r></w:p></w:hdr>"#
    );
    zip_bytes(&[
        ("[Content_Types].xml", content_types_xml().as_bytes()),
        ("_rels/.rels", package_rels_xml().as_bytes()),
        (
            "word/document.xml",
            document_xml(&para(&run(body_text))).as_bytes(),
        ),
        ("word/_rels/document.xml.rels", rels.as_bytes()),
        ("word/header1.xml", header.as_bytes()),
    ])
}

pub(crate) fn docx_with_header_image() -> Vec<u8> {
    let doc_rels = doc_rels_xml(
        r#"<Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>"#,
    );
    let header_rels = doc_rels_xml(
        r#"<Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image9.png"/>"#,
    );
    let header = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr xmlns:w="{NS_W}" xmlns:r="{NS_R}"><w:p><w:r><w:t>logo here</w:t></w:r></w:p></w:hdr>"#
    );
    zip_bytes(&[
        ("[Content_Types].xml", content_types_xml().as_bytes()),
        ("_rels/.rels", package_rels_xml().as_bytes()),
        (
            "word/document.xml",
            document_xml(&para(&run("body"))).as_bytes(),
        ),
        ("word/_rels/document.xml.rels", doc_rels.as_bytes()),
        ("word/header1.xml", header.as_bytes()),
        ("word/_rels/header1.xml.rels", header_rels.as_bytes()),
        ("word/media/image9.png", PNG_BYTES),
    ])
}

pub(crate) fn textbox_docx(outer_text: &str, box_text: &str) -> Vec<u8> {
    let body = format!(
        r#"<w:p><w:r><w:t>{outer_text}</w:t></w:r><w:r><w:pict><v:shape xmlns:v="urn:schemas-microsoft-com:vml"><v:textbox><w:txbxContent><w:p><w:r><w:t>{box_text}</w:t></w:r></w:p></w:txbxContent></v:textbox></v:shape></w:pict></w:r></w:p>"#
    );
    minimal_docx(&body)
}
