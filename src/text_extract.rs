// src/text_extract.rs

use crate::dispatch::{ExtractedDocument, FormatExtractor, SourceFormat};
use crate::error::{ExtractError, Result};
use crate::heuristics::classify::{ParseState, collect_records};
use crate::heuristics::customer::resolve_customer_name;
use crate::heuristics::rules::{Policy, collapse_whitespace};
use crate::heuristics::RawLine;
use tracing::{debug, info};

pub struct TextExtractor;

impl FormatExtractor for TextExtractor {
    fn format(&self) -> SourceFormat {
        SourceFormat::Text
    }

    fn extract(&self, bytes: &[u8], policy: &Policy) -> Result<ExtractedDocument> {
        let lines = text_lines(bytes)?;
        Ok(ExtractedDocument {
            customer_name: resolve_customer_name(&lines, policy),
            records: collect_records(&lines, ParseState::default(), policy),
        })
    }
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Result<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| {
            if big_endian {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from_le_bytes([c[0], c[1]])
            }
        })
        .collect();
    String::from_utf16(&units).map_err(|e| ExtractError::Txt {
        reason: format!("invalid UTF-16: {e}"),
    })
}

/// Decode a plain-text upload. UTF-8 (with or without BOM), UTF-16 with a
/// BOM, and anything else read as Latin-1.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    let text = if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        decode_utf16(rest, false)?
    } else if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        decode_utf16(rest, true)?
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => {
                debug!("not UTF-8, reading as Latin-1");
                bytes.iter().map(|&b| b as char).collect()
            }
        }
    };

    if text.contains('\0') {
        return Err(ExtractError::Txt {
            reason: "binary content in a text upload".into(),
        });
    }
    Ok(text)
}

/// Non-blank, whitespace-normalized lines keyed by their line number.
pub fn text_lines(bytes: &[u8]) -> Result<Vec<RawLine>> {
    let text = decode_text(bytes)?;
    let lines: Vec<RawLine> = text
        .lines()
        .flat_map(|l| l.split('\r'))
        .enumerate()
        .map(|(i, l)| RawLine::new(i, collapse_whitespace(l)))
        .filter(|l| !l.text.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(ExtractError::EmptyFile);
    }
    info!(lines = lines.len(), "text lines read");
    Ok(lines)
}
