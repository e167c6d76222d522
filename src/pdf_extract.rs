// src/pdf_extract.rs

use crate::config::Limits;
use crate::dispatch::{ExtractedDocument, FormatExtractor, SourceFormat};
use crate::error::{ExtractError, Result};
use crate::heuristics::classify::{ParseState, collect_records};
use crate::heuristics::customer::resolve_customer_name;
use crate::heuristics::rules::{Policy, collapse_whitespace};
use crate::heuristics::{RawLine, number_lines};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, info, warn};

/// Minimum number of ASCII alphanumerics we expect from a "real" text
/// layer. Below this the positional walk is treated as unreadable.
const MIN_TEXT_CHARS: usize = 30;

/// Average glyph width as a share of the font size. Only used to keep
/// consecutive show operators apart on the x axis.
const GLYPH_WIDTH: f32 = 0.5;

/// `TJ` adjustments below this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

pub struct PdfExtractor;

impl FormatExtractor for PdfExtractor {
    fn format(&self) -> SourceFormat {
        SourceFormat::Pdf
    }

    fn extract(&self, bytes: &[u8], policy: &Policy) -> Result<ExtractedDocument> {
        let lines = extract_lines(bytes, &policy.limits)?;
        Ok(ExtractedDocument {
            customer_name: resolve_customer_name(&lines, policy),
            records: collect_records(&lines, ParseState::default(), policy),
        })
    }
}

/// A piece of text placed on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let v: Vec<f32> = operands.iter().filter_map(number).collect();
        (v.len() == 6).then(|| Matrix {
            a: v[0],
            b: v[1],
            c: v[2],
            d: v[3],
            e: v[4],
            f: v[5],
        })
    }

    /// `self × other` in PDF row-vector convention.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decode a string operand. UTF-16BE with BOM, else UTF-8, else Latin-1.
/// Control characters become spaces.
fn decode_pdf_string(bytes: &[u8]) -> String {
    let text = if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        }
    };
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Text state for one content stream.
#[derive(Debug)]
struct TextState {
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f32,
    font_size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            leading: 0.0,
            font_size: 1.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn position(&self) -> (f32, f32) {
        let (x, y) = self.text_matrix.apply(0.0, 0.0);
        self.ctm.apply(x, y)
    }

    fn advance(&mut self, text_space: f32) {
        self.text_matrix = Matrix::translate(text_space, 0.0).then(&self.text_matrix);
    }

    fn glyph_advance(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.font_size * GLYPH_WIDTH
    }

    fn show(&mut self, text: String, out: &mut Vec<Fragment>) {
        let (x, y) = self.position();
        let width = self.glyph_advance(&text);
        if !text.trim().is_empty() {
            out.push(Fragment { text, x, y });
        }
        self.advance(width);
    }

    fn show_array(&mut self, items: &[Object], out: &mut Vec<Fragment>) {
        let (x, y) = self.position();
        let mut text = String::new();
        for item in items {
            match item {
                Object::String(bytes, _) => {
                    let piece = decode_pdf_string(bytes);
                    self.advance(self.glyph_advance(&piece));
                    text.push_str(&piece);
                }
                other => {
                    let Some(adjust) = number(other) else {
                        continue;
                    };
                    if adjust < TJ_SPACE_THRESHOLD {
                        text.push(' ');
                    }
                    self.advance(-adjust / 1000.0 * self.font_size);
                }
            }
        }
        if !text.trim().is_empty() {
            out.push(Fragment { text, x, y });
        }
    }
}

fn string_operand(op: &Operation, index: usize) -> Option<String> {
    match op.operands.get(index) {
        Some(Object::String(bytes, _)) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

/// Walk decoded content operations and collect positioned fragments.
pub fn fragments_from_operations(operations: &[Operation]) -> Vec<Fragment> {
    let mut state = TextState::default();
    let mut out = Vec::new();

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.saved.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.saved.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.ctm = m.then(&state.ctm);
                }
            }
            "BT" => {
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(v) = operands.first().and_then(number) {
                    state.leading = v;
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "Td" | "TD" => {
                let tx = operands.first().and_then(number).unwrap_or(0.0);
                let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.move_line(tx, ty);
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(text) = string_operand(op, 0) {
                    state.show(text, &mut out);
                }
            }
            "'" => {
                state.next_line();
                if let Some(text) = string_operand(op, 0) {
                    state.show(text, &mut out);
                }
            }
            "\"" => {
                state.next_line();
                if let Some(text) = string_operand(op, 2) {
                    state.show(text, &mut out);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    state.show_array(items, &mut out);
                }
            }
            _ => {}
        }
    }
    out
}

#[derive(Debug)]
struct Row {
    anchor_y: f32,
    fragments: Vec<Fragment>,
}

/// Group one page's fragments into visual rows, top to bottom.
///
/// A fragment joins the first row whose anchor lies within `tolerance`
/// vertically; the anchor is the y of the fragment that opened the row.
pub fn group_rows(fragments: Vec<Fragment>, tolerance: f32) -> Vec<String> {
    let mut rows: Vec<Row> = Vec::new();
    for fragment in fragments {
        match rows
            .iter_mut()
            .find(|r| (r.anchor_y - fragment.y).abs() <= tolerance)
        {
            Some(row) => row.fragments.push(fragment),
            None => rows.push(Row {
                anchor_y: fragment.y,
                fragments: vec![fragment],
            }),
        }
    }

    rows.sort_by(|a, b| b.anchor_y.total_cmp(&a.anchor_y));
    rows.into_iter()
        .filter_map(|mut row| {
            row.fragments.sort_by(|a, b| a.x.total_cmp(&b.x));
            let joined: Vec<&str> = row.fragments.iter().map(|f| f.text.as_str()).collect();
            let text = collapse_whitespace(&joined.join(" "));
            (text.chars().filter(|c| !c.is_whitespace()).count() > 1).then_some(text)
        })
        .collect()
}

fn page_fragments(doc: &Document, page_id: ObjectId) -> Result<Vec<Fragment>> {
    let raw = doc.get_page_content(page_id)?;
    let content = Content::decode(&raw)?;
    Ok(fragments_from_operations(&content.operations))
}

fn is_readable(lines: &[String]) -> bool {
    let (alnum, visible) = lines
        .iter()
        .flat_map(|l| l.chars())
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(alnum, visible), c| {
            (alnum + usize::from(c.is_ascii_alphanumeric()), visible + 1)
        });
    alnum >= MIN_TEXT_CHARS && alnum * 2 >= visible
}

/// Plain text stream from `pdf-extract`, split into lines.
fn fallback_lines(bytes: &[u8]) -> Result<Vec<String>> {
    let text = ::pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf {
        reason: format!("text stream unreadable: {e}"),
    })?;
    Ok(text
        .lines()
        .map(collapse_whitespace)
        .filter(|l| l.chars().count() > 1)
        .collect())
}

/// Rebuild the document's visual lines in reading order.
pub fn extract_lines(bytes: &[u8], limits: &Limits) -> Result<Vec<RawLine>> {
    let doc = Document::load_mem(bytes)?;

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return Err(ExtractError::Pdf {
            reason: "no text layer (scanned pages)".into(),
        });
    }

    let pages = doc.get_pages();
    let mut lines: Vec<String> = Vec::new();
    for (page_no, page_id) in &pages {
        match page_fragments(&doc, *page_id) {
            Ok(fragments) => {
                let before = lines.len();
                let count = fragments.len();
                lines.extend(group_rows(fragments, limits.row_tolerance));
                debug!(page = page_no, fragments = count, rows = lines.len() - before, "page walked");
            }
            Err(e) => warn!(page = page_no, error = %e, "content stream unreadable"),
        }
    }

    if !is_readable(&lines) {
        warn!(rows = lines.len(), "positional walk unreadable, using plain text stream");
        let fallback = fallback_lines(bytes)?;
        if !is_readable(&fallback) {
            return Err(ExtractError::Pdf {
                reason: "no extractable text".into(),
            });
        }
        lines = fallback;
    }

    info!(pages = pages.len(), lines = lines.len(), "PDF lines rebuilt");
    Ok(number_lines(lines))
}

/// Heuristic: inspect the PDF object tree for signs that every page
/// is just a single image with no text operators.
///
/// We look at each page's `Resources` dictionary. If a page has
/// XObject images but **no** Font resources, it's almost certainly
/// a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let resource_entry_nonempty = |page_dict: &lopdf::Dictionary, key: &[u8]| {
        page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .and_then(|res| res.get(key).ok())
            .and_then(|x| doc.dereference(x).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .is_some_and(|d| !d.is_empty())
    };

    let mut image_only_pages = 0;
    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Ok(page_dict) = page_obj.as_dict() else {
            continue;
        };
        if resource_entry_nonempty(page_dict, b"XObject")
            && !resource_entry_nonempty(page_dict, b"Font")
        {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    // If ≥80% of pages are image-only, treat the whole PDF as scanned
    ratio >= 0.8
}
