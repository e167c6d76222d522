// src/sheet_extract.rs

use crate::dispatch::{ExtractedDocument, FormatExtractor, SourceFormat};
use crate::error::{ExtractError, Result};
use crate::heuristics::classify::{LineClass, ParseState, collect_records, step};
use crate::heuristics::customer::resolve_customer_name;
use crate::heuristics::pack::infer_pack;
use crate::heuristics::rules::{
    CODE_COLUMN_KEYS, DESCRIPTION_HEADER_KEYS, FREE_COLUMN_KEYS, Policy, QUANTITY_HEADER_KEYS,
    collapse_whitespace,
};
use crate::heuristics::tokens::build_candidate;
use crate::heuristics::{CandidateRecord, RawLine};
use calamine::{DataType, Range, Reader as CalamineReader, Xls, Xlsx};
use std::io::{Cursor, Read, Seek};
use tracing::{debug, info};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

pub struct SheetExtractor;

impl FormatExtractor for SheetExtractor {
    fn format(&self) -> SourceFormat {
        SourceFormat::Spreadsheet
    }

    fn extract(&self, bytes: &[u8], policy: &Policy) -> Result<ExtractedDocument> {
        let grid = read_grid(bytes)?;
        grid_to_document(&grid, policy)
    }
}

/// One spreadsheet cell, reduced to what the extractor cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    fn from_data(cell: &DataType) -> Self {
        match cell {
            DataType::String(s) | DataType::DateTimeIso(s) | DataType::DurationIso(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.to_string())
                }
            }
            DataType::Float(v) | DataType::DateTime(v) | DataType::Duration(v) => Cell::Number(*v),
            DataType::Int(v) => Cell::Number(*v as f64),
            DataType::Bool(b) => Cell::Text(b.to_string()),
            DataType::Error(_) | DataType::Empty => Cell::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
            Cell::Number(v) => format!("{v}"),
        }
    }

    /// A whole, non-negative count.
    fn whole_number(&self) -> Option<u32> {
        let v = match self {
            Cell::Number(v) => *v,
            Cell::Text(s) => s.replace(',', "").trim().parse::<f64>().ok()?,
            Cell::Empty => return None,
        };
        (v.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&v)).then_some(v as u32)
    }

    /// Pack size stated in a pack column: a bare number or a pack expression.
    fn pack(&self, max_pack: u32) -> Option<u32> {
        self.whole_number().or_else(|| match self {
            Cell::Text(s) => infer_pack(s, max_pack),
            _ => None,
        })
    }
}

fn cell_at(row: &[Cell], col: usize) -> &Cell {
    row.get(col).unwrap_or(&Cell::Empty)
}

fn row_text(row: &[Cell]) -> String {
    let parts: Vec<String> = row.iter().filter(|c| !c.is_empty()).map(Cell::text).collect();
    collapse_whitespace(&parts.join(" "))
}

fn first_sheet<RS, R>(workbook: &mut R) -> Result<Range<DataType>>
where
    RS: Read + Seek,
    R: CalamineReader<RS>,
    R::Error: std::fmt::Display,
{
    let excel = |reason: String| ExtractError::Excel { reason };
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| excel("workbook has no sheets".into()))?;
    match workbook.worksheet_range(&name) {
        Some(Ok(range)) => Ok(range),
        Some(Err(e)) => Err(excel(format!("failed to read sheet {name:?}: {e}"))),
        None => Err(excel(format!("sheet {name:?} missing"))),
    }
}

/// Read the first sheet of an `.xlsx` or `.xls` workbook as a grid.
pub fn read_grid(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let range = if bytes.starts_with(ZIP_MAGIC) {
        let mut workbook = Xlsx::new(Cursor::new(bytes)).map_err(|err| ExtractError::Excel {
            reason: format!("failed to read xlsx workbook: {err}"),
        })?;
        first_sheet(&mut workbook)?
    } else if bytes.starts_with(OLE_MAGIC) {
        let mut workbook = Xls::new(Cursor::new(bytes)).map_err(|err| ExtractError::Excel {
            reason: format!("failed to read xls workbook: {err}"),
        })?;
        first_sheet(&mut workbook)?
    } else {
        return Err(ExtractError::Excel {
            reason: "not an Excel workbook".into(),
        });
    };

    let grid: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| row.iter().map(Cell::from_data).collect())
        .collect();
    info!(rows = grid.len(), cols = range.width(), "sheet read");
    Ok(grid)
}

/// Where the fields live once a header row is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub description: usize,
    pub quantity: usize,
    pub code: Option<usize>,
    pub pack: Option<usize>,
    pub box_pack: Option<usize>,
}

fn contains_any(label: &str, keys: &[&str]) -> bool {
    keys.iter().any(|k| label.contains(k))
}

/// `SAP Code`, `Mat No`; not `Material Description` or `Product Name`.
fn is_code_label(label: &str) -> bool {
    contains_any(label, CODE_COLUMN_KEYS) && !label.contains("DESC") && !label.contains("NAME")
}

impl ColumnMap {
    /// Map uppercased header labels to columns. `None` unless both a
    /// description and an order-quantity column exist.
    pub fn from_labels(labels: &[String]) -> Option<Self> {
        let desc_cols: Vec<usize> = (0..labels.len())
            .filter(|&i| contains_any(&labels[i], DESCRIPTION_HEADER_KEYS))
            .collect();
        let description = desc_cols
            .iter()
            .copied()
            .find(|&i| !is_code_label(&labels[i]))
            .or_else(|| desc_cols.first().copied())?;

        // Keys in priority order, so a `Qty` column beats an `Order No` one.
        let quantity = QUANTITY_HEADER_KEYS.iter().find_map(|key| {
            (0..labels.len()).find(|&i| {
                let l = &labels[i];
                i != description
                    && l.contains(key)
                    && !contains_any(l, FREE_COLUMN_KEYS)
                    && !l.contains("PACK")
                    && !l.contains("BOX")
            })
        })?;

        let find = |pred: &dyn Fn(&str) -> bool| {
            (0..labels.len()).find(|&i| i != description && i != quantity && pred(&labels[i]))
        };

        Some(Self {
            description,
            quantity,
            code: find(&is_code_label),
            pack: find(&|l: &str| l.contains("PACK") && !l.contains("BOX")),
            box_pack: find(&|l: &str| l.contains("BOX")),
        })
    }
}

/// First row within the scan window that reads as a column header.
pub fn find_header(grid: &[Vec<Cell>], policy: &Policy) -> Option<(usize, ColumnMap)> {
    grid.iter()
        .take(policy.limits.header_scan_rows)
        .enumerate()
        .find_map(|(i, row)| {
            let labels: Vec<String> = row.iter().map(|c| c.text().to_uppercase()).collect();
            if labels.iter().any(|l| policy.looks_like_data(l)) {
                return None;
            }
            ColumnMap::from_labels(&labels).map(|map| (i, map))
        })
}

fn mapped_records(
    grid: &[Vec<Cell>],
    header_row: usize,
    map: &ColumnMap,
    policy: &Policy,
) -> Vec<CandidateRecord> {
    let mut state = ParseState::inside();
    let mut records = Vec::new();

    for (i, row) in grid.iter().enumerate().skip(header_row + 1) {
        let filled = row.iter().filter(|c| !c.is_empty()).count();
        if filled == 0 {
            continue;
        }
        let text = row_text(row);

        if filled == 1 {
            if let Some(division) = policy.division_banner(&text) {
                debug!(row = i, division = %division, "division");
                state.current_division = division;
                continue;
            }
        }
        if policy.is_stop(&text) {
            debug!(row = i, text = %text, "table stop");
            break;
        }
        if policy.is_metadata(&text) || policy.is_noise(&text) {
            continue;
        }

        let description = cell_at(row, map.description).text();
        let qty = cell_at(row, map.quantity).whole_number();

        match qty {
            Some(qty) if !description.is_empty() => {
                let code = map
                    .code
                    .map(|c| cell_at(row, c).text().to_uppercase())
                    .filter(|c| !c.is_empty());
                let pack = map.pack.and_then(|c| cell_at(row, c).pack(policy.limits.max_pack));
                let stated_box = map.box_pack.and_then(|c| cell_at(row, c).whole_number());

                match build_candidate(code, &description, Some(qty), pack, stated_box, i, policy) {
                    Ok(mut record) => {
                        if let Some(pending) = state.pending_code.take() {
                            if record.internal_code.is_empty() {
                                record.internal_code = pending.code;
                            }
                        }
                        record.division = state.current_division.clone();
                        records.push(record);
                    }
                    Err(reason) => {
                        state.pending_code = None;
                        debug!(row = i, ?reason, "row rejected");
                    }
                }
            }
            // Mapped cells unusable: read the row as a line instead.
            _ => {
                let (next, class) = step(state, &RawLine::new(i, text), policy);
                state = next;
                if let LineClass::Data(record) = class {
                    records.push(record);
                }
            }
        }
    }
    records
}

/// Turn a sheet grid into candidate records.
pub fn grid_to_document(grid: &[Vec<Cell>], policy: &Policy) -> Result<ExtractedDocument> {
    let lines: Vec<RawLine> = grid
        .iter()
        .enumerate()
        .map(|(i, row)| RawLine::new(i, row_text(row)))
        .filter(|l| !l.text.is_empty())
        .collect();
    let customer_name = resolve_customer_name(&lines, policy);

    let records = match find_header(grid, policy) {
        Some((header_row, map)) => {
            info!(row = header_row, columns = ?map, "header found");
            mapped_records(grid, header_row, &map, policy)
        }
        None => {
            let scanned = grid.len().min(policy.limits.header_scan_rows);
            info!(scanned, "no header row, reading rows as lines");
            let until_stop: Vec<RawLine> = lines
                .iter()
                .take_while(|l| !policy.is_stop(&l.text))
                .cloned()
                .collect();
            let records = collect_records(&until_stop, ParseState::inside(), policy);
            if records.is_empty() {
                return Err(ExtractError::TableHeaderNotFound { scanned });
            }
            records
        }
    };

    info!(rows = records.len(), "sheet rows extracted");
    Ok(ExtractedDocument {
        customer_name,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorCode;
    use crate::heuristics::normalize::normalize;
    use crate::heuristics::{ResultMeta, WarningKind};

    fn t(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn n(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn e() -> Cell {
        Cell::Empty
    }

    fn order_sheet() -> Vec<Vec<Cell>> {
        vec![
            vec![t("ABC DISTRIBUTORS")],
            vec![e()],
            vec![
                t("Sr"),
                t("SAP Code"),
                t("Item Description"),
                t("Pack"),
                t("Order Qty"),
                t("Free Qty"),
                t("Box"),
            ],
            vec![n(1.0), n(30049079.0), t("MICR DIAPRIDE 1 MG TAB"), t("30'S"), n(120.0), n(10.0), n(3.0)],
            vec![n(2.0), e(), t("DOLO 650 TAB 15'S"), e(), n(0.0), e(), e()],
            vec![n(3.0), e(), t("PANTOCID 40 TAB"), n(15.0), n(45.0), e(), e()],
            vec![t("CARDIAC")],
            vec![n(4.0), e(), t("ECOSPRIN 75"), e(), n(28.0), n(2.0), e()],
            vec![t("Grand Total"), e(), e(), e(), n(193.0)],
            vec![n(5.0), e(), t("AFTER THE TOTAL"), e(), n(10.0)],
        ]
    }

    #[test]
    fn test_header_mapping() {
        let (row, map) = find_header(&order_sheet(), &Policy::default()).unwrap();
        assert_eq!(row, 2);
        assert_eq!(
            map,
            ColumnMap {
                description: 2,
                quantity: 4,
                code: Some(1),
                pack: Some(3),
                box_pack: Some(6),
            }
        );
    }

    #[test]
    fn test_code_column_not_taken_as_description() {
        let labels: Vec<String> = ["MATERIAL", "DESCRIPTION", "ORDER NO", "QTY"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let map = ColumnMap::from_labels(&labels).unwrap();
        assert_eq!((map.description, map.quantity, map.code), (1, 3, Some(0)));
    }

    #[test]
    fn test_row_with_values_is_not_a_header() {
        let grid = vec![vec![t("Item Description"), n(120.0)]];
        assert_eq!(find_header(&grid, &Policy::default()), None);
    }

    #[test]
    fn test_mapped_rows() {
        let doc = grid_to_document(&order_sheet(), &Policy::default()).unwrap();
        assert_eq!(doc.customer_name, "ABC DISTRIBUTORS");
        let names: Vec<&str> = doc.records.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(names, vec!["MICR DIAPRIDE 1 MG TAB", "PANTOCID 40 TAB", "ECOSPRIN 75"]);

        let micr = &doc.records[0];
        assert_eq!(micr.internal_code, "30049079");
        assert_eq!((micr.ordered_qty, micr.pack, micr.box_pack), (120, 30, Some(3)));
        assert!(!micr.pack_inferred);
        assert_eq!(doc.records[1].pack, 15);
        assert_eq!(doc.records[0].division, "");
        assert_eq!(doc.records[2].division, "CARDIAC");
    }

    #[test]
    fn test_zero_quantity_row_dropped_without_warning() {
        let doc = grid_to_document(&order_sheet(), &Policy::default()).unwrap();
        let result = normalize(ResultMeta::default(), doc.records);
        assert!(result.data_rows.iter().all(|r| r.order_qty > 0));
        assert!(
            result
                .warnings
                .iter()
                .all(|w| result.data_rows[w.row].item_description != "DOLO 650 TAB")
        );
        // Stated box count 3 for 120 / 30 is corrected to 4.
        assert_eq!(result.data_rows[0].box_pack, 4);
        assert_eq!(result.warnings[0].row, 0);
        assert_eq!(result.warnings[0].kind, WarningKind::BoxPackRecalculated);
    }

    #[test]
    fn test_empty_quantity_cell_falls_back_to_line() {
        let grid = vec![
            vec![t("Item"), t("Qty")],
            vec![t("PAN 40 TAB 10'S 20"), e()],
            vec![t("A12345")],
            vec![t("TELMA 40 TAB"), n(30.0)],
        ];
        let doc = grid_to_document(&grid, &Policy::default()).unwrap();
        assert_eq!(doc.records.len(), 2);
        assert_eq!(doc.records[0].description, "PAN 40 TAB");
        assert_eq!((doc.records[0].ordered_qty, doc.records[0].pack), (20, 10));
        assert_eq!(doc.records[1].internal_code, "A12345");
    }

    #[test]
    fn test_no_header_reads_rows_as_lines() {
        let grid = vec![
            vec![t("DOLO 650 TAB"), n(30.0)],
            vec![t("CALPOL 500 TAB 20")],
            vec![t("TOTAL"), n(50.0)],
            vec![t("ZINCOVIT TAB"), n(12.0)],
        ];
        let doc = grid_to_document(&grid, &Policy::default()).unwrap();
        let qtys: Vec<u32> = doc.records.iter().map(|r| r.ordered_qty).collect();
        assert_eq!(qtys, vec![30, 20]);
    }

    #[test]
    fn test_nothing_found_is_header_error() {
        let grid = vec![vec![t("hello")], vec![t("world")]];
        let err = grid_to_document(&grid, &Policy::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TableHeaderNotFound);
    }

    #[test]
    fn test_header_scan_window() {
        let mut grid: Vec<Vec<Cell>> = (0..5).map(|_| vec![t("filler")]).collect();
        grid.push(vec![t("Product"), t("Qty")]);
        grid.push(vec![t("DOLO 650 TAB"), n(30.0)]);

        let mut cfg = Config::default();
        cfg.limits.header_scan_rows = 3;
        assert_eq!(find_header(&grid, &Policy::from_config(&cfg)), None);
        assert_eq!(find_header(&grid, &Policy::default()).map(|(r, _)| r), Some(5));
    }

    #[test]
    fn test_cell_values() {
        assert_eq!(n(30049079.0).text(), "30049079");
        assert_eq!(n(98.5).text(), "98.5");
        assert_eq!(t("1,200").whole_number(), Some(1200));
        assert_eq!(n(2.5).whole_number(), None);
        assert_eq!(n(-3.0).whole_number(), None);
        assert_eq!(t("10 X 10'S").pack(1000), Some(10));
    }

    /// Minimal OOXML workbook with one sheet holding `grid`.
    fn xlsx_bytes(grid: &[Vec<Cell>]) -> Vec<u8> {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut rows = String::new();
        for (r, row) in grid.iter().enumerate() {
            rows.push_str(&format!("<row r=\"{}\">", r + 1));
            for (c, cell) in row.iter().enumerate() {
                let at = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                match cell {
                    Cell::Empty => {}
                    Cell::Number(v) => rows.push_str(&format!("<c r=\"{at}\"><v>{v}</v></c>")),
                    Cell::Text(s) => rows.push_str(&format!(
                        "<c r=\"{at}\" t=\"inlineStr\"><is><t>{s}</t></is></c>"
                    )),
                }
            }
            rows.push_str("</row>");
        }

        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
            ),
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="PO" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
            ),
            (
                "xl/worksheets/sheet1.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#
                ),
            ),
        ];

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_workbook_cells_read() {
        let grid = read_grid(&xlsx_bytes(&order_sheet())).unwrap();
        assert_eq!(grid[0][0], t("ABC DISTRIBUTORS"));
        assert_eq!(grid[2][2], t("Item Description"));
        assert_eq!(grid[3][1].text(), "30049079");
        assert_eq!(grid[3][4].whole_number(), Some(120));
        assert_eq!(grid[4][4].whole_number(), Some(0));
    }

    #[test]
    fn test_xlsx_order_end_to_end() {
        let result = crate::dispatch::extract_document(&xlsx_bytes(&order_sheet()), "PO.XLSX");
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.meta.source_format, Some(SourceFormat::Spreadsheet));
        assert_eq!(result.meta.customer_name, "ABC DISTRIBUTORS");

        let rows: Vec<(&str, u32, u32, u32)> = result
            .data_rows
            .iter()
            .map(|r| (r.item_description.as_str(), r.order_qty, r.pack, r.box_pack))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("MICR DIAPRIDE 1 MG TAB", 120, 30, 4),
                ("PANTOCID 40 TAB", 45, 15, 3),
                ("ECOSPRIN 75", 28, 0, 0),
            ]
        );
        assert_eq!(result.data_rows[0].code, "30049079");
        assert_eq!(result.data_rows[2].division, "CARDIAC");
        // The zero-quantity DOLO row leaves neither a row nor a warning.
        assert!(result.data_rows.iter().all(|r| r.item_description != "DOLO 650 TAB"));
        assert!(result.warnings.iter().all(|w| w.row < result.data_rows.len()));
    }

    #[test]
    fn test_unreadable_workbooks() {
        for bytes in [&b"just some text"[..], &b"PK\x03\x04 not a zip"[..], &[0xD0, 0xCF, 0x11, 0xE0, 0, 0][..]] {
            let err = read_grid(bytes).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ExcelExtractionFailed);
        }
    }
}
