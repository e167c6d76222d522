// src/heuristics/tokens.rs

use super::CandidateRecord;
use super::pack::infer_pack;
use super::rules::{
    Policy, clean_description, collapse_whitespace, is_code_token, is_free_annotation,
    is_free_qualifier, is_numeric_code_token, is_price_token, meaningful_chars,
};

/// Raw fields pulled out of one data line before the validity gate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineFields {
    pub code: Option<String>,
    pub qty: Option<u32>,
    /// Description tokens as they appeared, before cleaning.
    pub raw_description: String,
}

/// Why a line or row did not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    NoQuantity,
    ShortDescription,
    NumericDescription,
    CityName,
    BannedKeyword,
}

/// Outcome of running the field extractor over one data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLine {
    Record(CandidateRecord),
    /// The line held nothing but an internal code.
    LoneCode(String),
    Skip(Reject),
}

fn is_serial(token: &str) -> bool {
    (1..=3).contains(&token.len()) && token.chars().all(|c| c.is_ascii_digit())
}

/// Split a line into code, quantity and description span.
pub fn split_fields(line: &str, policy: &Policy) -> LineFields {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let start = usize::from(tokens.len() > 3 && is_serial(tokens[0]));

    // Free stock annotations and the numbers they qualify are never fields.
    let is_free = |i: usize| {
        is_free_annotation(tokens[i])
            || is_free_qualifier(tokens[i])
            || (i > 0 && is_free_qualifier(tokens[i - 1]))
    };
    let last_field = (0..tokens.len()).rev().find(|&i| !is_free(i));

    // First code-shaped token. A trailing bare number is the quantity.
    let code_idx = (start..tokens.len()).find(|&i| {
        let tok = tokens[i];
        is_code_token(tok) && !(is_numeric_code_token(tok) && Some(i) == last_field && i > 0)
    });

    // Quantity: walk back from the end, never past the code.
    let floor = code_idx.map_or(start, |c| c + 1);
    let mut qty = None;
    for i in (floor..tokens.len()).rev() {
        if is_free(i) {
            continue;
        }
        if let Some(q) = policy.qty_token(tokens[i]) {
            qty = Some((i, q));
            break;
        }
    }

    let end = qty.map_or(tokens.len(), |(i, _)| i);
    let mut span: Vec<&str> = Vec::new();
    for (i, tok) in tokens.iter().enumerate().take(end).skip(start) {
        if Some(i) == code_idx {
            continue;
        }
        // A unit price marks the real end of the description.
        if qty.is_some() && is_price_token(tok) {
            break;
        }
        span.push(tok);
    }

    LineFields {
        code: code_idx.map(|i| tokens[i].to_uppercase()),
        qty: qty.map(|(_, q)| q),
        raw_description: span.join(" "),
    }
}

/// Validity gate shared by every source format.
pub fn check_description(description: &str, policy: &Policy) -> Result<(), Reject> {
    if meaningful_chars(description) < 3 {
        return Err(Reject::ShortDescription);
    }
    if description
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || c == '.' || c == ',')
    {
        return Err(Reject::NumericDescription);
    }
    if policy.is_city(description) {
        return Err(Reject::CityName);
    }
    if policy.has_banned_keyword(description) {
        return Err(Reject::BannedKeyword);
    }
    Ok(())
}

/// Validate and enrich the parts of one row into a candidate record.
///
/// `explicit_pack` is a pack the source states in its own field; when absent
/// the pack is inferred from the raw description.
pub fn build_candidate(
    code: Option<String>,
    raw_description: &str,
    qty: Option<u32>,
    explicit_pack: Option<u32>,
    stated_box_pack: Option<u32>,
    line: usize,
    policy: &Policy,
) -> Result<CandidateRecord, Reject> {
    let qty = qty
        .filter(|q| policy.is_valid_qty(*q))
        .ok_or(Reject::NoQuantity)?;
    let description = clean_description(raw_description);
    check_description(&description, policy)?;

    let explicit_pack = explicit_pack.filter(|p| policy.is_valid_pack(*p));
    let (pack, pack_inferred) = match explicit_pack {
        Some(p) => (p, false),
        None => match infer_pack(raw_description, policy.limits.max_pack) {
            Some(p) => (p, true),
            None => (0, false),
        },
    };

    Ok(CandidateRecord {
        internal_code: code.map(|c| collapse_whitespace(&c)).unwrap_or_default(),
        description,
        ordered_qty: qty,
        pack,
        box_pack: stated_box_pack,
        pack_inferred,
        division: String::new(),
        line,
    })
}

/// Run the token extractor over one data line.
pub fn parse_data_line(line: &str, index: usize, policy: &Policy) -> DataLine {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() == 1 && is_code_token(tokens[0]) {
        return DataLine::LoneCode(tokens[0].to_uppercase());
    }

    let fields = split_fields(line, policy);
    match build_candidate(
        fields.code,
        &fields.raw_description,
        fields.qty,
        None,
        None,
        index,
        policy,
    ) {
        Ok(record) => DataLine::Record(record),
        Err(reason) => DataLine::Skip(reason),
    }
}
