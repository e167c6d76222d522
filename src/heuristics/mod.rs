// src/heuristics/mod.rs

pub mod classify;
pub mod customer;
pub mod normalize;
pub mod pack;
pub mod rules;
pub mod tokens;

use crate::dispatch::SourceFormat;
use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_CUSTOMER: &str = "UNKNOWN CUSTOMER";

/// One logical line of a document with its position in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub index: usize,
    pub text: String,
}

impl RawLine {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Number each string in reading order.
pub fn number_lines<I, S>(lines: I) -> Vec<RawLine>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    lines
        .into_iter()
        .enumerate()
        .map(|(i, s)| RawLine::new(i, s))
        .collect()
}

/// A provisionally extracted order line, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateRecord {
    pub internal_code: String,
    pub description: String,
    pub ordered_qty: u32,
    /// 0 when unknown.
    pub pack: u32,
    /// Box count as stated by the source, if it stated one.
    pub box_pack: Option<u32>,
    pub pack_inferred: bool,
    pub division: String,
    pub line: usize,
}

/// The eight fixed output columns, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Column {
    Code,
    CustomerName,
    ExternalRef,
    ItemDescription,
    OrderQty,
    BoxPack,
    Pack,
    Division,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Code,
        Column::CustomerName,
        Column::ExternalRef,
        Column::ItemDescription,
        Column::OrderQty,
        Column::BoxPack,
        Column::Pack,
        Column::Division,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Column::Code => "Code",
            Column::CustomerName => "Customer Name",
            Column::ExternalRef => "External Ref",
            Column::ItemDescription => "Item Description",
            Column::OrderQty => "Order Qty",
            Column::BoxPack => "Box Pack",
            Column::Pack => "Pack",
            Column::Division => "Division",
        }
    }

    /// Columns every surviving row is guaranteed to fill.
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            Column::CustomerName | Column::ItemDescription | Column::OrderQty
        )
    }
}

pub fn fixed_headers() -> Vec<String> {
    Column::ALL.iter().map(|c| c.label().to_string()).collect()
}

/// A normalized order line. Field order matches `Column::ALL`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderLineRecord {
    pub code: String,
    pub customer_name: String,
    pub external_ref: String,
    pub item_description: String,
    pub order_qty: u32,
    pub box_pack: u32,
    pub pack: u32,
    pub division: String,
}

impl OrderLineRecord {
    pub fn value(&self, column: Column) -> String {
        match column {
            Column::Code => self.code.clone(),
            Column::CustomerName => self.customer_name.clone(),
            Column::ExternalRef => self.external_ref.clone(),
            Column::ItemDescription => self.item_description.clone(),
            Column::OrderQty => self.order_qty.to_string(),
            Column::BoxPack => self.box_pack.to_string(),
            Column::Pack => self.pack.to_string(),
            Column::Division => self.division.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// Presentation hint for one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub field: Column,
    pub label: String,
    pub sample: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    PackInferred,
    BoxPackRecalculated,
}

/// An auto-correction applied to one row. Never excludes the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowWarning {
    pub row: usize,
    pub field: Column,
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_format: Option<SourceFormat>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_name: String,
}

/// Everything the engine hands back for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub meta: ResultMeta,
    pub headers: Vec<String>,
    pub data_rows: Vec<OrderLineRecord>,
    pub extracted_fields: Vec<FieldMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RowWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

impl ExtractionResult {
    /// A result with no rows carrying `code`.
    pub fn failed(mut meta: ResultMeta, code: ErrorCode) -> Self {
        if meta.customer_name.is_empty() {
            meta.customer_name = UNKNOWN_CUSTOMER.to_string();
        }
        Self {
            meta,
            headers: fixed_headers(),
            data_rows: Vec::new(),
            extracted_fields: Vec::new(),
            warnings: Vec::new(),
            error: Some(code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
