// src/heuristics/normalize.rs

use super::pack::{BoxPackCheck, reconcile_box_pack};
use super::{
    CandidateRecord, Column, Confidence, ExtractionResult, FieldMetadata, OrderLineRecord,
    ResultMeta, RowWarning, UNKNOWN_CUSTOMER, WarningKind, fixed_headers,
};
use crate::error::ErrorCode;
use tracing::info;

pub(crate) fn pack_inferred_warning(row: usize, pack: u32) -> RowWarning {
    RowWarning {
        row,
        field: Column::Pack,
        kind: WarningKind::PackInferred,
        message: format!("pack {pack} inferred from the item description"),
    }
}

/// Settle the box count for one row, with a warning when it had to change.
pub(crate) fn settle_box_pack(
    row: usize,
    ordered_qty: u32,
    pack: u32,
    recorded: Option<u32>,
) -> (u32, Option<RowWarning>) {
    match reconcile_box_pack(ordered_qty, pack, recorded) {
        BoxPackCheck::Unchanged(v) => (v, None),
        BoxPackCheck::Corrected { from, to } => {
            let message = match from {
                Some(from) => format!("box pack recalculated from {from} to {to}"),
                None => format!("box pack computed as {to}"),
            };
            let warning = RowWarning {
                row,
                field: Column::BoxPack,
                kind: WarningKind::BoxPackRecalculated,
                message,
            };
            (to, Some(warning))
        }
    }
}

/// One column hint per output column, sampled from the first row.
pub fn field_manifest(first: &OrderLineRecord) -> Vec<FieldMetadata> {
    Column::ALL
        .iter()
        .map(|&column| FieldMetadata {
            field: column,
            label: column.label().to_string(),
            sample: first.value(column),
            confidence: if column.is_mandatory() {
                Confidence::High
            } else {
                Confidence::Medium
            },
        })
        .collect()
}

/// Map candidates onto the fixed eight-column record.
pub fn normalize(mut meta: ResultMeta, candidates: Vec<CandidateRecord>) -> ExtractionResult {
    if meta.customer_name.is_empty() {
        meta.customer_name = UNKNOWN_CUSTOMER.to_string();
    }
    if candidates.is_empty() {
        return ExtractionResult::failed(meta, ErrorCode::NoDataRows);
    }

    let mut warnings = Vec::new();
    let data_rows: Vec<OrderLineRecord> = candidates
        .into_iter()
        .enumerate()
        .map(|(row, c)| {
            if c.pack_inferred {
                warnings.push(pack_inferred_warning(row, c.pack));
            }
            let (box_pack, warning) = settle_box_pack(row, c.ordered_qty, c.pack, c.box_pack);
            warnings.extend(warning);
            OrderLineRecord {
                code: c.internal_code,
                customer_name: meta.customer_name.clone(),
                external_ref: String::new(),
                item_description: c.description,
                order_qty: c.ordered_qty,
                box_pack,
                pack: c.pack,
                division: c.division,
            }
        })
        .collect();

    let extracted_fields = data_rows.first().map(field_manifest).unwrap_or_default();
    info!(
        customer = %meta.customer_name,
        rows = data_rows.len(),
        warnings = warnings.len(),
        "normalized"
    );

    ExtractionResult {
        meta,
        headers: fixed_headers(),
        data_rows,
        extracted_fields,
        warnings,
        error: None,
    }
}
