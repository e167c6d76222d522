// src/convert.rs
//
// Post-edit conversion: rows coming back from a reviewer are re-checked with
// the same pack and box rules used during extraction.

use crate::heuristics::normalize::{pack_inferred_warning, settle_box_pack};
use crate::heuristics::pack::infer_pack;
use crate::heuristics::rules::{Policy, collapse_whitespace, meaningful_chars};
use crate::heuristics::{Column, OrderLineRecord, RowWarning, UNKNOWN_CUSTOMER};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A row excluded from the converted output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub field: Column,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutcome {
    pub rows: Vec<OrderLineRecord>,
    pub warnings: Vec<RowWarning>,
    pub errors: Vec<RowError>,
}

fn hard_gate(row: usize, record: &OrderLineRecord, policy: &Policy) -> Option<RowError> {
    if meaningful_chars(&record.item_description) < 3 {
        return Some(RowError {
            row,
            field: Column::ItemDescription,
            message: "item description is missing".into(),
        });
    }
    if !policy.is_valid_qty(record.order_qty) {
        return Some(RowError {
            row,
            field: Column::OrderQty,
            message: format!(
                "order quantity {} outside 1..={}",
                record.order_qty, policy.limits.max_order_qty
            ),
        });
    }
    None
}

/// Re-validate edited rows. Rows failing the hard gate are dropped with an
/// error; everything else is corrected in place with a warning.
///
/// Row indices in warnings and errors refer to the input positions.
pub fn revalidate(rows: Vec<OrderLineRecord>, policy: &Policy) -> ConversionOutcome {
    let mut outcome = ConversionOutcome::default();
    let total = rows.len();

    for (row, mut record) in rows.into_iter().enumerate() {
        record.item_description = collapse_whitespace(&record.item_description);
        if let Some(error) = hard_gate(row, &record, policy) {
            debug!(row, message = %error.message, "row excluded");
            outcome.errors.push(error);
            continue;
        }

        if record.customer_name.trim().is_empty() {
            record.customer_name = UNKNOWN_CUSTOMER.to_string();
        }

        if !policy.is_valid_pack(record.pack) {
            record.pack = 0;
        }
        if record.pack == 0 {
            if let Some(pack) = infer_pack(&record.item_description, policy.limits.max_pack) {
                record.pack = pack;
                outcome.warnings.push(pack_inferred_warning(row, pack));
            }
        }

        let (box_pack, warning) =
            settle_box_pack(row, record.order_qty, record.pack, Some(record.box_pack));
        record.box_pack = box_pack;
        outcome.warnings.extend(warning);
        outcome.rows.push(record);
    }

    info!(
        input = total,
        kept = outcome.rows.len(),
        excluded = outcome.errors.len(),
        warnings = outcome.warnings.len(),
        "revalidated rows"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::WarningKind;

    fn row(desc: &str, qty: u32, pack: u32, box_pack: u32) -> OrderLineRecord {
        OrderLineRecord {
            customer_name: "APOLLO MEDICALS".into(),
            item_description: desc.into(),
            order_qty: qty,
            pack,
            box_pack,
            ..Default::default()
        }
    }

    #[test]
    fn test_hard_gate_excludes_rows() {
        let outcome = revalidate(
            vec![row("", 10, 0, 0), row("DOLO 650", 0, 0, 0), row("DOLO 650", 20_000, 0, 0)],
            &Policy::default(),
        );
        assert!(outcome.rows.is_empty());
        let fields: Vec<(usize, Column)> = outcome.errors.iter().map(|e| (e.row, e.field)).collect();
        assert_eq!(
            fields,
            vec![
                (0, Column::ItemDescription),
                (1, Column::OrderQty),
                (2, Column::OrderQty)
            ]
        );
    }

    #[test]
    fn test_edited_quantity_recomputes_box_pack() {
        // The user raised the quantity from 120 to 150 and left the box at 4.
        let outcome = revalidate(vec![row("MICR DIAPRIDE 1 MG TAB", 150, 30, 4)], &Policy::default());
        assert_eq!(outcome.rows[0].box_pack, 5);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::BoxPackRecalculated);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_missing_pack_inferred_from_description() {
        let outcome = revalidate(vec![row("AZITHRAL 500 (3'S)", 30, 0, 0)], &Policy::default());
        let r = &outcome.rows[0];
        assert_eq!((r.pack, r.box_pack), (3, 10));
        let kinds: Vec<WarningKind> = outcome.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![WarningKind::PackInferred, WarningKind::BoxPackRecalculated]
        );
    }

    #[test]
    fn test_assigned_pack_not_reinferred() {
        // The cleaned description alone would read 125 from the strength.
        let input = vec![row("AMOXYCLAV 500/125", 50, 10, 5)];
        let outcome = revalidate(input.clone(), &Policy::default());
        assert_eq!(outcome.rows, input);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_clean_rows_pass_untouched() {
        let input = vec![row("DOLO 650 TAB", 30, 15, 2), row("ZINCOVIT", 12, 0, 0)];
        let outcome = revalidate(input.clone(), &Policy::default());
        assert_eq!(outcome.rows, input);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_idempotent() {
        let first = revalidate(vec![row("PAN 40 15 TABLETS", 45, 0, 9)], &Policy::default());
        let second = revalidate(first.rows.clone(), &Policy::default());
        assert_eq!(first.rows, second.rows);
        assert!(second.warnings.is_empty());
    }

    #[test]
    fn test_blank_customer_defaulted() {
        let mut r = row("DOLO 650 TAB", 30, 15, 2);
        r.customer_name = "  ".into();
        let outcome = revalidate(vec![r], &Policy::default());
        assert_eq!(outcome.rows[0].customer_name, UNKNOWN_CUSTOMER);
    }
}
