use std::collections::BTreeSet;
use std::ops::Range;

use crate::docx::xml::{qname, Element, XmlNode};

/// Paragraph-relative location of one `w:t` plus its current text.
#[derive(Debug, Clone)]
struct RunSlot {
    t_path: Vec<usize>,
    text: String,
}

/// Logical text of a paragraph. `spans` holds the byte range each `w:t`
/// contributes to `text`, which is how a match maps back onto runs.
#[derive(Debug)]
pub struct ParagraphText {
    text: String,
    slots: Vec<RunSlot>,
    spans: Vec<Range<usize>>,
}

impl ParagraphText {
    /// Collects every `w:t` under the paragraph in document order. Nested
    /// `w:txbxContent` subtrees are skipped; their paragraphs belong to the
    /// textbox scope.
    pub fn collect(para: &Element, w: &str) -> Self {
        let t_tag = qname(w, "t");
        let txbx_tag = qname(w, "txbxContent");
        let mut slots = Vec::new();
        let mut path = Vec::new();
        collect_runs(para, &t_tag, &txbx_tag, &mut path, &mut slots);
        let mut text = String::new();
        let mut spans = Vec::with_capacity(slots.len());
        for slot in &slots {
            let start = text.len();
            text.push_str(&slot.text);
            spans.push(start..text.len());
        }
        ParagraphText { text, slots, spans }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Non-overlapping matches, leftmost first.
    pub fn find_all(&self, needle: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        if needle.is_empty() {
            return out;
        }
        let mut from = 0;
        while let Some(pos) = self.text[from..].find(needle) {
            let start = from + pos;
            out.push(start..start + needle.len());
            from = start + needle.len();
        }
        out
    }

    fn slot_containing(&self, pos: usize) -> usize {
        let mut idx = 0;
        for (i, s) in self.spans.iter().enumerate() {
            if s.start <= pos && pos < s.end {
                return i;
            }
            if s.start <= pos {
                idx = i;
            }
        }
        idx
    }
}

fn collect_runs(
    el: &Element,
    t_tag: &str,
    txbx_tag: &str,
    path: &mut Vec<usize>,
    out: &mut Vec<RunSlot>,
) {
    for (i, child) in el.children.iter().enumerate() {
        let XmlNode::Element(c) = child else { continue };
        if c.name == txbx_tag {
            continue;
        }
        path.push(i);
        if c.name == t_tag {
            out.push(RunSlot {
                t_path: path.clone(),
                text: c.text_content(),
            });
        } else {
            collect_runs(c, t_tag, txbx_tag, path, out);
        }
        path.pop();
    }
}

/// Replaces every occurrence of `needle` in the paragraph's logical text.
/// Matches may straddle run boundaries: the first spanned run keeps its
/// prefix and receives the replacement (and so its formatting), interior
/// runs are emptied, the last run keeps its suffix. Runs emptied by the
/// replacement are removed, along with a `w:r` shell left holding nothing
/// but its `w:rPr`. Matches never cross a paragraph boundary; a needle
/// split across two paragraphs is not found. Returns the number of
/// occurrences replaced.
pub fn replace_in_paragraph(
    para: &mut Element,
    w: &str,
    needle: &str,
    replacement: &str,
) -> usize {
    replace_each_in_paragraph(para, w, &[(needle, replacement)])
        .first()
        .copied()
        .unwrap_or(0)
}

/// Multi-needle form of [`replace_in_paragraph`]: every pair is matched
/// against the paragraph's text as collected, before any replacement is
/// applied, so text one pair inserts is never matched by another. The
/// leftmost candidate wins; at the same start the longest needle, then the
/// earliest pair. Returns per-pair occurrence counts in pair order.
pub fn replace_each_in_paragraph(
    para: &mut Element,
    w: &str,
    pairs: &[(&str, &str)],
) -> Vec<usize> {
    let mut counts = vec![0usize; pairs.len()];
    let mut pt = ParagraphText::collect(para, w);
    let chosen = combined_spans(&pt.text, pairs);
    if chosen.is_empty() {
        return counts;
    }

    // Right-to-left, so the untouched prefix of every earlier span keeps its
    // original byte offsets.
    let mut emptied: BTreeSet<usize> = BTreeSet::new();
    for (span, pair) in chosen.iter().rev() {
        apply_span(para, &mut pt, span, pairs[*pair].1, &mut emptied);
        counts[*pair] += 1;
    }

    let mut doomed: Vec<Vec<usize>> = emptied
        .iter()
        .map(|&i| pt.slots[i].t_path.clone())
        .collect();
    doomed.sort();

    let r_tag = qname(w, "r");
    let rpr_tag = qname(w, "rPr");
    // Deepest-last ordering backwards keeps earlier sibling indices valid.
    for t_path in doomed.iter().rev() {
        remove_node(para, t_path);
        if t_path.len() < 2 {
            continue;
        }
        let r_path = &t_path[..t_path.len() - 1];
        let prune = matches!(
            para.descendant(r_path),
            Some(run) if run.name == r_tag && !run_has_content(run, &rpr_tag)
        );
        if prune {
            remove_node(para, r_path);
        }
    }

    counts
}

/// Leftmost non-overlapping spans across all needles, each span tagged with
/// the pair it belongs to. The scan resumes after each chosen span, so a
/// needle can match right after another needle's match but never inside it.
fn combined_spans(text: &str, pairs: &[(&str, &str)]) -> Vec<(Range<usize>, usize)> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < text.len() {
        let mut best: Option<(usize, usize, usize)> = None;
        for (pair, (needle, _)) in pairs.iter().enumerate() {
            if needle.is_empty() {
                continue;
            }
            let Some(off) = text[pos..].find(needle) else {
                continue;
            };
            let cand = (pos + off, needle.len(), pair);
            let better = match best {
                None => true,
                Some(b) => cand.0 < b.0 || (cand.0 == b.0 && cand.1 > b.1),
            };
            if better {
                best = Some(cand);
            }
        }
        let Some((start, len, pair)) = best else { break };
        out.push((start..start + len, pair));
        pos = start + len;
    }
    out
}

fn apply_span(
    para: &mut Element,
    pt: &mut ParagraphText,
    span: &Range<usize>,
    replacement: &str,
    emptied: &mut BTreeSet<usize>,
) {
    let i0 = pt.slot_containing(span.start);
    let i1 = pt.slot_containing(span.end - 1);
    let off0 = span.start - pt.spans[i0].start;
    let off1 = span.end - pt.spans[i1].start;
    for i in i0..=i1 {
        let cur = pt.slots[i].text.clone();
        let new = if i == i0 && i == i1 {
            format!("{}{}{}", &cur[..off0], replacement, &cur[off1..])
        } else if i == i0 {
            format!("{}{}", &cur[..off0], replacement)
        } else if i == i1 {
            cur[off1..].to_string()
        } else {
            String::new()
        };
        if new.is_empty() {
            emptied.insert(i);
        } else {
            emptied.remove(&i);
        }
        if let Some(t) = para.descendant_mut(&pt.slots[i].t_path) {
            t.set_text(&new);
            if new.starts_with(' ') || new.ends_with(' ') {
                t.set_attr("xml:space", "preserve");
            }
        }
        pt.slots[i].text = new;
    }
}

fn remove_node(para: &mut Element, path: &[usize]) {
    let Some((&last, parent_path)) = path.split_last() else {
        return;
    };
    if let Some(parent) = para.descendant_mut(parent_path) {
        if last < parent.children.len() {
            parent.children.remove(last);
        }
    }
}

fn run_has_content(run: &Element, rpr_tag: &str) -> bool {
    run.children.iter().any(|c| match c {
        XmlNode::Element(e) => e.name != rpr_tag,
        XmlNode::Text(t) => !t.trim().is_empty(),
        XmlNode::CData(_) => true,
        _ => false,
    })
}

/// Reading text of a paragraph: `w:t` content with tabs and breaks rendered
/// as `\t` and `\n`, the way the text shows in the document. Nested textbox
/// content is skipped here too.
pub fn paragraph_display_text(para: &Element, w: &str) -> String {
    let t_tag = qname(w, "t");
    let tab_tag = qname(w, "tab");
    let br_tag = qname(w, "br");
    let cr_tag = qname(w, "cr");
    let hyphen_tag = qname(w, "noBreakHyphen");
    let txbx_tag = qname(w, "txbxContent");
    let mut out = String::new();
    append_display(
        para, &t_tag, &tab_tag, &br_tag, &cr_tag, &hyphen_tag, &txbx_tag, &mut out,
    );
    out
}

#[allow(clippy::too_many_arguments)]
fn append_display(
    el: &Element,
    t_tag: &str,
    tab_tag: &str,
    br_tag: &str,
    cr_tag: &str,
    hyphen_tag: &str,
    txbx_tag: &str,
    out: &mut String,
) {
    for c in el.child_elements() {
        if c.name == txbx_tag {
            continue;
        }
        if c.name == t_tag {
            out.push_str(&c.text_content());
        } else if c.name == tab_tag {
            out.push('\t');
        } else if c.name == br_tag || c.name == cr_tag {
            out.push('\n');
        } else if c.name == hyphen_tag {
            out.push('-');
        } else {
            append_display(c, t_tag, tab_tag, br_tag, cr_tag, hyphen_tag, txbx_tag, out);
        }
    }
}
