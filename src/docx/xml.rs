use std::collections::BTreeMap;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};

use crate::docx::error::XmlError;

/// Nesting deeper than this is rejected at parse time so tree recursion
/// stays bounded on hostile input.
const MAX_DEPTH: usize = 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Element {
    /// Qualified tag name, prefix kept verbatim.
    pub name: String,
    /// Attributes in source order. Values are raw (already-escaped) XML
    /// bytes; see `collect_attrs`.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// Parsed from `<x/>`; honored on write only while `children` is empty.
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Element {
            name: name.to_string(),
            self_closing: true,
            ..Element::default()
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value with entity references resolved. Falls back to the
    /// raw value when the reference syntax is broken.
    pub fn attr_unescaped(&self, key: &str) -> Option<String> {
        self.attr(key).map(|raw| match quick_xml::escape::unescape(raw) {
            Ok(v) => v.into_owned(),
            Err(_) => raw.to_string(),
        })
    }

    /// Updates an attribute in place or appends it. `value` is escaped here,
    /// so callers pass plain text.
    pub fn set_attr(&mut self, key: &str, value: &str) {
        let escaped = escape_attr(value);
        for kv in self.attrs.iter_mut() {
            if kv.0 == key {
                kv.1 = escaped;
                return;
            }
        }
        self.attrs.push((key.to_string(), escaped));
    }

    /// Concatenated direct text and CDATA children.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }

    pub fn set_text(&mut self, text: &str) {
        if text.is_empty() {
            self.children.clear();
        } else {
            self.children = vec![XmlNode::Text(text.to_string())];
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Element at a child-index path below this one. Steps that land on a
    /// non-element node resolve to `None`.
    pub fn descendant(&self, path: &[usize]) -> Option<&Element> {
        let mut cur = self;
        for &i in path {
            match cur.children.get(i)? {
                XmlNode::Element(e) => cur = e,
                _ => return None,
            }
        }
        Some(cur)
    }

    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut cur = self;
        for &i in path {
            match cur.children.get_mut(i)? {
                XmlNode::Element(e) => cur = e,
                _ => return None,
            }
        }
        Some(cur)
    }

    /// Resolves the prefix bound to `uri` by an `xmlns` declaration on this
    /// element. `Some("")` means the default namespace.
    pub fn prefix_for_uri(&self, uri: &str) -> Option<String> {
        for (k, v) in &self.attrs {
            if k == "xmlns" && v == uri {
                return Some(String::new());
            }
            if let Some(prefix) = k.strip_prefix("xmlns:") {
                if v == uri {
                    return Some(prefix.to_string());
                }
            }
        }
        None
    }
}

/// One parsed XML part: declaration, nodes around the root, and the root
/// element tree.
#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub decl: Option<XmlDecl>,
    pub prolog: Vec<XmlNode>,
    pub root: Element,
    pub epilog: Vec<XmlNode>,
}

pub fn qname(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{prefix}:{local}")
    }
}

impl XmlPart {
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self, XmlError> {
        let (text, transcoded) = decode_part_bytes(bytes);
        let malformed = |detail: String| XmlError::Malformed {
            part: name.to_string(),
            detail,
        };

        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(false);

        let mut decl: Option<XmlDecl> = None;
        let mut prolog: Vec<XmlNode> = Vec::new();
        let mut root: Option<Element> = None;
        let mut epilog: Vec<XmlNode> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();

        // Attaches a finished node to the open element, or to the
        // prolog/root/epilog when nothing is open.
        fn attach(
            node: XmlNode,
            stack: &mut Vec<Element>,
            prolog: &mut Vec<XmlNode>,
            root: &mut Option<Element>,
            epilog: &mut Vec<XmlNode>,
        ) -> Result<(), String> {
            if let Some(top) = stack.last_mut() {
                top.children.push(node);
                return Ok(());
            }
            match node {
                XmlNode::Element(el) => {
                    if root.is_some() {
                        return Err("multiple root elements".to_string());
                    }
                    *root = Some(el);
                }
                XmlNode::Text(t) => {
                    if !t.trim().is_empty() {
                        return Err("text outside root element".to_string());
                    }
                }
                other => {
                    if root.is_none() {
                        prolog.push(other);
                    } else {
                        epilog.push(other);
                    }
                }
            }
            Ok(())
        }

        loop {
            let ev = reader
                .read_event()
                .map_err(|e| malformed(e.to_string()))?;
            match ev {
                Event::Eof => break,
                Event::Decl(d) => {
                    let version = d
                        .version()
                        .map(|v| bytes_to_string(v.as_ref()))
                        .map_err(|e| malformed(e.to_string()))?;
                    let encoding = d
                        .encoding()
                        .map(|r| r.map(|v| bytes_to_string(v.as_ref())))
                        .transpose()
                        .unwrap_or(None);
                    let standalone = d
                        .standalone()
                        .map(|r| r.map(|v| bytes_to_string(v.as_ref())))
                        .transpose()
                        .unwrap_or(None);
                    // Serialized output is UTF-8, so the label of a part
                    // that arrived in another encoding is rewritten to
                    // match.
                    let encoding = if transcoded {
                        encoding.map(|_| "UTF-8".to_string())
                    } else {
                        encoding
                    };
                    decl = Some(XmlDecl {
                        version,
                        encoding,
                        standalone,
                    });
                }
                Event::Start(s) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(malformed("element nesting too deep".to_string()));
                    }
                    stack.push(Element {
                        name: bytes_to_string(s.name().as_ref()),
                        attrs: collect_attrs(name, &s)?,
                        children: Vec::new(),
                        self_closing: false,
                    });
                }
                Event::Empty(s) => {
                    let el = Element {
                        name: bytes_to_string(s.name().as_ref()),
                        attrs: collect_attrs(name, &s)?,
                        children: Vec::new(),
                        self_closing: true,
                    };
                    attach(XmlNode::Element(el), &mut stack, &mut prolog, &mut root, &mut epilog)
                        .map_err(malformed)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| malformed("unexpected closing tag".to_string()))?;
                    attach(XmlNode::Element(el), &mut stack, &mut prolog, &mut root, &mut epilog)
                        .map_err(malformed)?;
                }
                Event::Text(t) => {
                    let txt = t
                        .unescape()
                        .map_err(|e| malformed(e.to_string()))?
                        .into_owned();
                    attach(XmlNode::Text(txt), &mut stack, &mut prolog, &mut root, &mut epilog)
                        .map_err(malformed)?;
                }
                Event::CData(t) => {
                    let txt = bytes_to_string(t.into_inner());
                    attach(XmlNode::CData(txt), &mut stack, &mut prolog, &mut root, &mut epilog)
                        .map_err(malformed)?;
                }
                Event::Comment(t) => {
                    let txt = bytes_to_string(t.into_inner());
                    attach(XmlNode::Comment(txt), &mut stack, &mut prolog, &mut root, &mut epilog)
                        .map_err(malformed)?;
                }
                Event::PI(t) => {
                    let target = bytes_to_string(t.target());
                    let content = bytes_to_string(t.content());
                    attach(
                        XmlNode::ProcessingInstruction(format!("{target}{content}")),
                        &mut stack,
                        &mut prolog,
                        &mut root,
                        &mut epilog,
                    )
                    .map_err(malformed)?;
                }
                Event::DocType(t) => {
                    let txt = bytes_to_string(t.into_inner());
                    attach(XmlNode::DocType(txt), &mut stack, &mut prolog, &mut root, &mut epilog)
                        .map_err(malformed)?;
                }
            }
        }

        if !stack.is_empty() {
            return Err(malformed("unclosed element at end of input".to_string()));
        }
        let root = root.ok_or_else(|| XmlError::NoRoot {
            part: name.to_string(),
        })?;
        Ok(XmlPart {
            name: name.to_string(),
            decl,
            prolog,
            root,
            epilog,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        if let Some(decl) = &self.decl {
            out.extend_from_slice(b"<?xml version=\"");
            out.extend_from_slice(decl.version.as_bytes());
            out.extend_from_slice(b"\"");
            if let Some(enc) = &decl.encoding {
                out.extend_from_slice(b" encoding=\"");
                out.extend_from_slice(enc.as_bytes());
                out.extend_from_slice(b"\"");
            }
            if let Some(sa) = &decl.standalone {
                out.extend_from_slice(b" standalone=\"");
                out.extend_from_slice(sa.as_bytes());
                out.extend_from_slice(b"\"");
            }
            out.extend_from_slice(b"?>");
        }
        for node in &self.prolog {
            write_node(&mut out, node);
        }
        write_element(&mut out, &self.root);
        for node in &self.epilog {
            write_node(&mut out, node);
        }
        out
    }

    pub fn element(&self, path: &[usize]) -> Option<&Element> {
        self.root.descendant(path)
    }

    pub fn element_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        self.root.descendant_mut(path)
    }

    /// Digest over declaration, names, attributes (sorted) and text, so two
    /// serializations compare by content rather than bytes.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(decl) = &self.decl {
            hasher.update(b"D:");
            hasher.update(decl.version.as_bytes());
            hasher.update(b"|");
            if let Some(e) = decl.encoding.as_ref() {
                hasher.update(e.as_bytes());
            }
            hasher.update(b"|");
            if let Some(s) = decl.standalone.as_ref() {
                hasher.update(s.as_bytes());
            }
            hasher.update(b"\n");
        }
        for node in &self.prolog {
            hash_node(&mut hasher, node, "");
        }
        hash_element(&mut hasher, &self.root);
        for node in &self.epilog {
            hash_node(&mut hasher, node, "");
        }
        hex::encode(hasher.finalize())
    }
}

fn collect_attrs(part: &str, s: &quick_xml::events::BytesStart<'_>) -> Result<Vec<(String, String)>, XmlError> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.map_err(|e| XmlError::Malformed {
            part: part.to_string(),
            detail: e.to_string(),
        })?;
        let key = bytes_to_string(a.key.as_ref());
        // Keep raw (already-escaped) attribute bytes. Required for lossless
        // round-trip of values such as VML `o:gfxdata`, which encodes CRLF
        // as character references (`&#13;&#10;`); unescaping and re-escaping
        // would turn those newlines into spaces under XML normalization.
        let val = bytes_to_string(a.value.as_ref());
        attrs.push((key, val));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// UTF-8 with BOM sniffing first (this also catches UTF-16 BOMs), then a
/// declared-encoding hint, then windows-1252. The flag reports whether the
/// bytes came in under some other encoding and were transcoded.
fn decode_part_bytes(bytes: &[u8]) -> (String, bool) {
    let (text, used, had_errors) = UTF_8.decode(bytes);
    if !had_errors {
        return (text.into_owned(), used != UTF_8);
    }
    if let Some(label) = sniff_decl_encoding(bytes) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            let (text, used, _) = enc.decode(bytes);
            return (text.into_owned(), used != UTF_8);
        }
    }
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    (text.into_owned(), true)
}

fn sniff_decl_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let at = head.find("encoding=")? + "encoding=".len();
    let rest = &head[at..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn escape_text_into(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn write_element(out: &mut Vec<u8>, el: &Element) {
    out.extend_from_slice(b"<");
    out.extend_from_slice(el.name.as_bytes());
    // Attribute values are raw (already-escaped) XML bytes. Do NOT escape
    // again.
    for (k, v) in &el.attrs {
        out.extend_from_slice(b" ");
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\"");
    }
    if el.children.is_empty() && el.self_closing {
        out.extend_from_slice(b"/>");
        return;
    }
    out.extend_from_slice(b">");
    for child in &el.children {
        write_node(out, child);
    }
    out.extend_from_slice(b"</");
    out.extend_from_slice(el.name.as_bytes());
    out.extend_from_slice(b">");
}

fn write_node(out: &mut Vec<u8>, node: &XmlNode) {
    match node {
        XmlNode::Element(el) => write_element(out, el),
        XmlNode::Text(text) => escape_text_into(out, text),
        XmlNode::CData(text) => {
            // CDATA must remain unescaped.
            out.extend_from_slice(b"<![CDATA[");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b"]]>");
        }
        XmlNode::Comment(text) => {
            out.extend_from_slice(b"<!--");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b"-->");
        }
        XmlNode::ProcessingInstruction(content) => {
            out.extend_from_slice(b"<?");
            out.extend_from_slice(content.as_bytes());
            out.extend_from_slice(b"?>");
        }
        XmlNode::DocType(text) => {
            out.extend_from_slice(b"<!DOCTYPE");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b">");
        }
    }
}

fn hash_element(hasher: &mut Sha256, el: &Element) {
    hasher.update(b"S:");
    hasher.update(el.name.as_bytes());
    hasher.update(b"|");
    let mut map: BTreeMap<&str, &str> = BTreeMap::new();
    for (k, v) in &el.attrs {
        map.insert(k, v);
    }
    for (k, v) in map {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"\n");
    for child in &el.children {
        hash_node(hasher, child, &el.name);
    }
    hasher.update(b"E:");
    hasher.update(el.name.as_bytes());
    hasher.update(b"\n");
}

fn hash_node(hasher: &mut Sha256, node: &XmlNode, parent: &str) {
    match node {
        XmlNode::Element(el) => hash_element(hasher, el),
        XmlNode::Text(text) => {
            hasher.update(b"T:");
            hasher.update(parent.as_bytes());
            hasher.update(b"|");
            hasher.update(text.as_bytes());
            hasher.update(b"\n");
        }
        XmlNode::CData(text) => {
            hasher.update(b"C:");
            hasher.update(text.as_bytes());
            hasher.update(b"\n");
        }
        XmlNode::Comment(text) => {
            hasher.update(b"M:");
            hasher.update(text.as_bytes());
            hasher.update(b"\n");
        }
        XmlNode::ProcessingInstruction(content) => {
            hasher.update(b"P:");
            hasher.update(content.as_bytes());
            hasher.update(b"\n");
        }
        XmlNode::DocType(text) => {
            hasher.update(b"Y:");
            hasher.update(text.as_bytes());
            hasher.update(b"\n");
        }
    }
}
