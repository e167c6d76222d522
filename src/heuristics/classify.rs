// src/heuristics/classify.rs

use super::rules::{LineRule, Policy, has_header_keywords, is_numeric_code_token};
use super::tokens::{DataLine, Reject, parse_data_line};
use super::{CandidateRecord, RawLine};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    OutsideTable,
    InsideTable,
}

/// An internal code seen alone on its line, waiting for the row it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCode {
    pub code: String,
    pub line: usize,
}

/// Cursor carried from one line to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseState {
    pub table: TableState,
    pub current_division: String,
    pub pending_code: Option<PendingCode>,
}

impl Default for ParseState {
    fn default() -> Self {
        Self {
            table: TableState::OutsideTable,
            current_division: String::new(),
            pending_code: None,
        }
    }
}

impl ParseState {
    /// Start already inside a table (grids with no recognizable header).
    pub fn inside() -> Self {
        Self {
            table: TableState::InsideTable,
            ..Self::default()
        }
    }

    pub fn is_inside(&self) -> bool {
        self.table == TableState::InsideTable
    }
}

/// What one line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    Metadata,
    Division(String),
    Header,
    Stop,
    Noise,
    /// Outside any table and not a table start.
    Outside,
    PendingCode(String),
    Data(CandidateRecord),
    Rejected(Reject),
}

/// Advance the state machine by one line.
pub fn step(mut state: ParseState, line: &RawLine, policy: &Policy) -> (ParseState, LineClass) {
    let text = line.text.trim();

    if policy.is_metadata(text) {
        return (state, LineClass::Metadata);
    }

    if let Some(division) = policy.division_banner(text) {
        state.current_division = division.clone();
        state.table = TableState::InsideTable;
        return (state, LineClass::Division(division));
    }

    if !state.is_inside() {
        if has_header_keywords(text) {
            state.table = TableState::InsideTable;
            if !policy.looks_like_data(text) {
                return (state, LineClass::Header);
            }
        } else if text
            .split_whitespace()
            .next()
            .is_some_and(is_numeric_code_token)
        {
            state.table = TableState::InsideTable;
        } else {
            let class = if policy.line_rule(text) == Some(LineRule::Noise) {
                LineClass::Noise
            } else {
                LineClass::Outside
            };
            return (state, class);
        }
    } else if policy.is_stop(text) {
        state.table = TableState::OutsideTable;
        state.pending_code = None;
        return (state, LineClass::Stop);
    }

    if policy.is_noise(text) {
        return (state, LineClass::Noise);
    }

    match parse_data_line(text, line.index, policy) {
        DataLine::LoneCode(code) => {
            state.pending_code = Some(PendingCode {
                code: code.clone(),
                line: line.index,
            });
            (state, LineClass::PendingCode(code))
        }
        DataLine::Record(mut record) => {
            if let Some(pending) = state.pending_code.take() {
                if record.internal_code.is_empty() {
                    record.internal_code = pending.code;
                }
            }
            record.division = state.current_division.clone();
            (state, LineClass::Data(record))
        }
        DataLine::Skip(reason) => {
            state.pending_code = None;
            (state, LineClass::Rejected(reason))
        }
    }
}

/// Walk every line in order and collect the data rows.
pub fn collect_records(lines: &[RawLine], initial: ParseState, policy: &Policy) -> Vec<CandidateRecord> {
    let mut state = initial;
    let mut records = Vec::new();
    let mut tables = 0usize;

    for line in lines {
        let was_inside = state.is_inside();
        let (next, class) = step(state, line, policy);
        if !was_inside && next.is_inside() {
            tables += 1;
            debug!(line = line.index, text = %line.text, "table start");
        }
        match class {
            LineClass::Data(record) => records.push(record),
            LineClass::Division(name) => debug!(line = line.index, division = %name, "division"),
            LineClass::Stop => debug!(line = line.index, text = %line.text, "table stop"),
            LineClass::Rejected(reason) => {
                debug!(line = line.index, ?reason, text = %line.text, "row rejected")
            }
            _ => {}
        }
        state = next;
    }

    info!(lines = lines.len(), tables, rows = records.len(), "classified lines");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::number_lines;

    fn run(lines: &[&str]) -> Vec<CandidateRecord> {
        collect_records(&number_lines(lines.iter().copied()), ParseState::default(), &Policy::default())
    }

    fn classes(lines: &[&str]) -> Vec<(TableState, LineClass)> {
        let policy = Policy::default();
        let mut state = ParseState::default();
        let mut out = Vec::new();
        for line in number_lines(lines.iter().copied()) {
            let (next, class) = step(state, &line, &policy);
            out.push((next.table, class));
            state = next;
        }
        out
    }

    #[test]
    fn test_no_rows_before_header() {
        let rows = run(&[
            "ABC Medical Agencies",
            "Order No 4471 dated 12/03/2025",
            "DOLO 650 TAB 30",
            "Sr Item Description Qty",
            "1 DOLO 650 TAB 15'S 30",
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "DOLO 650 TAB");
        assert_eq!(rows[0].line, 4);
    }

    #[test]
    fn test_header_that_is_data_is_reprocessed() {
        let out = classes(&["ITEM 30049079 ORDER QTY PANTOCID 40 20"]);
        assert_eq!(out[0].0, TableState::InsideTable);
        assert!(matches!(out[0].1, LineClass::Data(ref r) if r.ordered_qty == 20));
    }

    #[test]
    fn test_numeric_code_starts_table() {
        let rows = run(&["30049079 MICR DIAPRIDE 1 MG TAB 30 S 120"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].internal_code, "30049079");
        assert_eq!(rows[0].ordered_qty, 120);
    }

    #[test]
    fn test_stop_keyword_leaves_table() {
        let out = classes(&[
            "Product Name Qty",
            "DOLO 650 TAB 30",
            "Grand Total 30",
            "CALPOL 500 TAB 20",
        ]);
        assert_eq!(out[1].0, TableState::InsideTable);
        assert_eq!(out[2], (TableState::OutsideTable, LineClass::Stop));
        assert_eq!(out[3], (TableState::OutsideTable, LineClass::Outside));
    }

    #[test]
    fn test_division_scoping() {
        let rows = run(&[
            "Item Qty",
            "CARDIAC CARE",
            "ECOSPRIN 75 TAB 14'S 100",
            "TELMA 40 TAB 30",
            "Division: Gastro",
            "PANTOCID 40 TAB 60",
        ]);
        let divisions: Vec<&str> = rows.iter().map(|r| r.division.as_str()).collect();
        assert_eq!(divisions, vec!["CARDIAC CARE", "CARDIAC CARE", "GASTRO"]);
    }

    #[test]
    fn test_division_banner_opens_table() {
        let out = classes(&["NEURO DIVISION", "GABAPIN 100 CAP 40"]);
        assert_eq!(
            out[0],
            (TableState::InsideTable, LineClass::Division("NEURO DIVISION".into()))
        );
        assert!(matches!(out[1].1, LineClass::Data(ref r) if r.division == "NEURO DIVISION"));
    }

    #[test]
    fn test_pending_code_merges_with_next_row() {
        let rows = run(&["Item Qty", "30049079", "MICR DIAPRIDE 1 MG TAB 30 S 120", "DOLO 650 TAB 30"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].internal_code, "30049079");
        assert_eq!(rows[1].internal_code, "");
    }

    #[test]
    fn test_pending_code_not_attached_to_coded_row() {
        let rows = run(&["Item Qty", "A12345", "B67890 TELMA 40 TAB 30"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].internal_code, "B67890");
    }

    #[test]
    fn test_metadata_and_noise_never_rows() {
        let rows = run(&[
            "Item Qty",
            "GSTIN: 27AABCU9603R1ZM 100",
            "Remarks: send 20 urgently",
            "GST Breakup 12% 100",
            "DOLO 650 TAB 30",
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "DOLO 650 TAB");
    }

    #[test]
    fn test_second_table_after_page_footer() {
        let rows = run(&[
            "Item Name Qty",
            "DOLO 650 TAB 30",
            "Page 1 of 2",
            "DISCARDED OUTSIDE 99 TAB 10",
            "Item Name Qty",
            "CALPOL 500 TAB 20",
        ]);
        let names: Vec<&str> = rows.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(names, vec!["DOLO 650 TAB", "CALPOL 500 TAB"]);
    }
}
