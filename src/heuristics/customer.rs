// src/heuristics/customer.rs

use super::rules::{Policy, collapse_whitespace, compile, meaningful_chars};
use super::{RawLine, UNKNOWN_CUSTOMER};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// `Supplier: X`, `Bill To - X`, `Party Name: X`.
static LABELED: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(?:SUPPLIER|BUYER|BILL\s*TO|SHIP\s*TO|CUSTOMER|PARTY|PURCHASER|FROM)\s*(?:NAME)?\s*[:\-]\s*(.*)$",
    )
});

/// `M/S. X`, `M/s : X`.
static MESSRS: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bM\s*/\s*S\b\.?\s*[:\-]?\s*(.*)$"));

static DATE: Lazy<Regex> =
    Lazy::new(|| compile(r"\b\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}\b|\b\d{4}-\d{2}-\d{2}\b"));

/// Everything from the first metadata label onwards.
static TRAILING_METADATA: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)[\s,;|]*\b(?:GSTIN|GST|PAN|PH|PHONE|MOB|MOBILE|TEL|DL|D\.L|DRUG\s*LIC|E-?MAIL|DATE|DATED|ORDER|PO\s*NO|P\.O)\b.*$",
    )
});

/// Strip dates and trailing metadata, uppercase. `None` when nothing usable is left.
pub fn clean_customer_name(raw: &str) -> Option<String> {
    let text = DATE.replace_all(raw, " ");
    let text = TRAILING_METADATA.replace(&text, "");
    let text = collapse_whitespace(&text.to_uppercase());
    let text = text.trim_matches(|c: char| !c.is_alphanumeric() && c != ')' && c != '.');
    (meaningful_chars(text) >= 3 && text.chars().any(char::is_alphabetic)).then(|| text.to_string())
}

fn is_all_caps(text: &str) -> bool {
    text.chars().any(|c| c.is_alphabetic()) && !text.chars().any(|c| c.is_lowercase())
}

/// Resolve the ordering party's name from the top of the document.
///
/// An explicit label wins over an all-caps trading name found anywhere in the
/// scanned window.
pub fn resolve_customer_name(lines: &[RawLine], policy: &Policy) -> String {
    let window = &lines[..lines.len().min(policy.limits.customer_scan_lines)];
    let mut entity: Option<String> = None;
    let mut label_pending = false;

    for line in window {
        let text = line.text.trim();
        if text.is_empty() || policy.is_metadata(text) {
            continue;
        }

        if label_pending {
            label_pending = false;
            if let Some(name) = clean_customer_name(text) {
                debug!(line = line.index, name = %name, "customer from label continuation");
                return name;
            }
        }

        if let Some(cap) = LABELED.captures(text).or_else(|| MESSRS.captures(text)) {
            let value = cap.get(1).map_or("", |m| m.as_str());
            match clean_customer_name(value) {
                Some(name) => {
                    debug!(line = line.index, name = %name, "customer from label");
                    return name;
                }
                None => {
                    label_pending = true;
                    continue;
                }
            }
        }

        if entity.is_none() && is_all_caps(text) {
            if let Some(name) = clean_customer_name(text) {
                if policy.ends_with_entity_suffix(&name) {
                    entity = Some(name);
                }
            }
        }
    }

    entity.unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::heuristics::number_lines;

    fn resolve(lines: &[&str]) -> String {
        resolve_customer_name(&number_lines(lines.iter().copied()), &Policy::default())
    }

    #[test]
    fn test_explicit_labels() {
        assert_eq!(
            resolve(&["PURCHASE ORDER", "Supplier: Shree Ganesh Medical Agencies"]),
            "SHREE GANESH MEDICAL AGENCIES"
        );
        assert_eq!(
            resolve(&["M/S. Raj Pharma Distributors, GSTIN 27AAACR1234F1Z5"]),
            "RAJ PHARMA DISTRIBUTORS"
        );
        assert_eq!(
            resolve(&["Bill To: ABC Enterprises Date: 12/03/2025"]),
            "ABC ENTERPRISES"
        );
    }

    #[test]
    fn test_label_value_on_next_line() {
        assert_eq!(
            resolve(&["Customer Name:", "New Life Chemists", "Order No 12"]),
            "NEW LIFE CHEMISTS"
        );
    }

    #[test]
    fn test_label_beats_earlier_entity_phrase() {
        assert_eq!(
            resolve(&["SUN PHARMA LTD", "Party: Apollo Medicals"]),
            "APOLLO MEDICALS"
        );
    }

    #[test]
    fn test_all_caps_entity_phrase() {
        assert_eq!(
            resolve(&["PURCHASE ORDER", "SHREE SAI DISTRIBUTORS", "Item Qty"]),
            "SHREE SAI DISTRIBUTORS"
        );
        assert_eq!(resolve(&["Shree Sai Distributors"]), UNKNOWN_CUSTOMER);
    }

    #[test]
    fn test_metadata_lines_skipped() {
        assert_eq!(resolve(&["GSTIN: 27AAACR1234F1Z5 PHARMA"]), UNKNOWN_CUSTOMER);
        assert_eq!(resolve(&["email: orders@xyzpharma.in"]), UNKNOWN_CUSTOMER);
    }

    #[test]
    fn test_scan_window() {
        let mut lines = vec!["filler line"; 40];
        lines.push("Supplier: Late Traders");
        assert_eq!(resolve(&lines), UNKNOWN_CUSTOMER);

        let mut cfg = Config::default();
        cfg.limits.customer_scan_lines = 60;
        let policy = Policy::from_config(&cfg);
        assert_eq!(
            resolve_customer_name(&number_lines(lines.iter().copied()), &policy),
            "LATE TRADERS"
        );
    }

    #[test]
    fn test_cleaning() {
        assert_eq!(
            clean_customer_name("Metro Medicos Ph: 98200 12345").as_deref(),
            Some("METRO MEDICOS")
        );
        assert_eq!(clean_customer_name("12/03/2025"), None);
        assert_eq!(clean_customer_name(" - "), None);
    }
}
