// src/heuristics/rules.rs
//
// Every word list and pattern the classifier, field extractor and pack
// inference consult lives here as data. Deployment additions come in through
// `Config::policy` and are merged by `Policy::from_config`.

use crate::config::{Config, Limits};
use once_cell::sync::Lazy;
use regex::Regex;

// ---------------------------------------------------------------------------
// Word tables
// ---------------------------------------------------------------------------

/// Numeric tokens that look like codes but are really strengths.
pub const DOSAGE_VALUES: &[u32] = &[5, 10, 20, 25, 50, 100, 250, 500, 650, 1000];

pub const YEAR_MIN: u32 = 2000;
pub const YEAR_MAX: u32 = 2100;

pub const CITIES: &[&str] = &[
    "MUMBAI",
    "NAVI MUMBAI",
    "THANE",
    "PUNE",
    "NAGPUR",
    "NASHIK",
    "AURANGABAD",
    "DELHI",
    "NEW DELHI",
    "NOIDA",
    "GURGAON",
    "GURUGRAM",
    "GHAZIABAD",
    "FARIDABAD",
    "KOLKATA",
    "HOWRAH",
    "CHENNAI",
    "BANGALORE",
    "BENGALURU",
    "HYDERABAD",
    "SECUNDERABAD",
    "AHMEDABAD",
    "SURAT",
    "VADODARA",
    "RAJKOT",
    "JAIPUR",
    "LUCKNOW",
    "KANPUR",
    "AGRA",
    "VARANASI",
    "PATNA",
    "RANCHI",
    "BHOPAL",
    "INDORE",
    "RAIPUR",
    "BHUBANESWAR",
    "GUWAHATI",
    "CHANDIGARH",
    "LUDHIANA",
    "AMRITSAR",
    "DEHRADUN",
    "KOCHI",
    "COCHIN",
    "TRIVANDRUM",
    "COIMBATORE",
    "MADURAI",
    "MYSORE",
    "MANGALORE",
    "VIJAYAWADA",
    "VISAKHAPATNAM",
    "GOA",
];

pub const ENTITY_SUFFIXES: &[&str] = &[
    "ENTERPRISE",
    "ENTERPRISES",
    "DISTRIBUTOR",
    "DISTRIBUTORS",
    "AGENCY",
    "AGENCIES",
    "PHARMA",
    "PHARMACY",
    "PHARMACEUTICAL",
    "PHARMACEUTICALS",
    "MEDICAL",
    "MEDICALS",
    "MEDICOS",
    "CHEMIST",
    "CHEMISTS",
    "DRUG HOUSE",
    "TRADERS",
    "TRADING",
    "SURGICALS",
    "HEALTHCARE",
    "STORES",
    "LTD",
    "LIMITED",
    "LLP",
    "CORPORATION",
];

/// Descriptions carrying any of these are summary or tax rows.
pub const BANNED_KEYWORDS: &[&str] = &[
    "TOTAL",
    "SUBTOTAL",
    "GST",
    "GSTIN",
    "CGST",
    "SGST",
    "IGST",
    "CESS",
    "TAX",
    "TAXABLE",
    "DISCOUNT",
    "ROUND OFF",
    "ROUNDOFF",
    "FREIGHT",
    "INVOICE",
    "BALANCE",
    "NET PAYABLE",
    "AMOUNT",
];

/// Keywords that mark a line as belonging to a table summary.
pub const SUMMARY_KEYWORDS: &[&str] = &["TOTAL", "ORDER", "INVOICE", "SUMMARY", "QUOTATION"];

/// Words that appear alone in all caps but never name a division.
pub const NON_DIVISION_WORDS: &[&str] = &[
    "SIR", "MADAM", "DEAR", "KINDLY", "PLEASE", "THANKS", "REGARDS", "TO", "FROM", "DATE", "SR",
    "NO", "SNO", "MRP", "PTR", "PTS", "RATE", "UNIT", "PACK", "SCHEME", "FREE", "BATCH", "EXPIRY",
    "EXP", "HSN", "VALUE", "NAME", "CODE", "REMARKS", "NOTE", "URGENT",
];

/// Substrings marking a description-like column or header label.
pub const DESCRIPTION_HEADER_KEYS: &[&str] =
    &["ITEM", "PRODUCT", "DESC", "PARTICULAR", "MATERIAL"];

/// Substrings marking a quantity-like column or header label.
pub const QUANTITY_HEADER_KEYS: &[&str] = &["QTY", "QUANTITY", "ORDER"];

/// Quantity columns carrying any of these hold bonus stock, not the order.
pub const FREE_COLUMN_KEYS: &[&str] = &["FREE", "SCH", "BONUS"];

pub const CODE_COLUMN_KEYS: &[&str] = &["SAP", "CODE", "MAT"];

/// Tokens qualifying the number next to them as free/bonus stock.
pub const FREE_QUALIFIERS: &[&str] = &["FREE", "BONUS", "SCH", "SCHEME", "F", "FR"];

// ---------------------------------------------------------------------------
// Line rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRule {
    /// Tax IDs, licences, phone, email, address labels.
    Metadata,
    /// Totals and footers closing the item table.
    Stop,
    /// Remarks, notes, cancellations, sign-offs.
    Noise,
}

const LINE_RULE_TABLE: &[(LineRule, &str)] = &[
    (
        LineRule::Metadata,
        r"(?i)^\s*(?:GSTIN|GST\s*(?:NO|IN|NUMBER)|D\.?\s*L\.?\s*NO|DRUG\s*LIC\w*|LIC(?:EN[CS]E)?\s*NO|PAN\s*(?:NO)?\.?\s*[:\-]|FSSAI|PH(?:ONE)?\s*(?:NO)?\.?\s*[:\-]|MOB(?:ILE)?\s*(?:NO)?\.?\s*[:\-]|TEL\w*\s*[:\-]|FAX\s*[:\-]|E-?MAIL|ADDRESS|ADDR\s*[:\-]|CONTACT\s*(?:NO|PERSON)?\.?\s*[:\-])",
    ),
    (LineRule::Metadata, r"(?i)[\w.+\-]+@[\w\-]+\.[\w.]+"),
    (LineRule::Stop, r"(?i)\b(?:GRAND|NET|GROSS|SUB)\s*-?\s*TOTAL\b"),
    (LineRule::Stop, r"(?i)^\s*TOTAL\b"),
    (LineRule::Stop, r"(?i)\bDESPATCH\b|\bDISPATCH\s+(?:THROUGH|DETAILS)\b"),
    (LineRule::Stop, r"(?i)\bAUTHORI[SZ]ED\s+SIGNATORY\b"),
    (LineRule::Stop, r"(?i)\bTERMS\s*(?:AND|&)\s*CONDITIONS\b"),
    (LineRule::Stop, r"(?i)^\s*PAGE\s*(?:NO\.?)?\s*:?\s*\d+(?:\s*(?:OF|/)\s*\d+)?\s*$"),
    (LineRule::Stop, r"(?i)\bPOWERED\s+BY\b"),
    (LineRule::Stop, r"(?i)\bE\s*\.?\s*&\s*\.?\s*O\s*\.?\s*E\b"),
    (LineRule::Stop, r"(?i)\bAMOUNT\s+IN\s+WORDS\b"),
    (LineRule::Noise, r"(?i)\bREMARKS?\b"),
    (LineRule::Noise, r"(?i)^\s*NOTE\b|\bNOTES?\s*:"),
    (LineRule::Noise, r"(?i)\bCANCEL(?:LED|LATION)?\b"),
    (LineRule::Noise, r"(?i)\bSIGNATURE\b|\bSIGNATORY\b"),
    (LineRule::Noise, r"(?i)\b(?:PREPARED|CHECKED|APPROVED)\s+BY\b"),
];

static LINE_RULES: Lazy<Vec<(LineRule, Regex)>> = Lazy::new(|| compile_table(LINE_RULE_TABLE));

// ---------------------------------------------------------------------------
// Token shapes
// ---------------------------------------------------------------------------

static NUMERIC_CODE: Lazy<Regex> = Lazy::new(|| compile(r"^\d{4,8}$"));
static PREFIXED_CODE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Z]{4,6}\d{4}$"));
static LETTER_CODE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Z]\d{4,6}$"));
static PRICE_TOKEN: Lazy<Regex> = Lazy::new(|| compile(r"^[₹$]?\d[\d,]*\.\d{2,}$"));

static LABELED_DIVISION: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^\s*(?:DIVISION|DIVN|DIV|COMPANY|BRANCH)\s*(?:NAME)?\s*[:\-]\s*(.+?)\s*$")
});
static SHORT_DIVISION: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Z]{2,6}\d{0,2}$"));
static CAPS_PHRASE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Z][A-Z &.,'()/\-]*[A-Z.)]$"));

// ---------------------------------------------------------------------------
// Description cleaning and pack patterns
// ---------------------------------------------------------------------------

/// Bare pack-count suffix such as `10'S`, `30 S`, `15S`.
const PACK_SUFFIX: &str = r#"\b(\d+)\s*['’`"]?\s*S\b"#;

/// Applied in order to an uppercased description span.
const CLEANING_TABLE: &[(&str, &str)] = &[
    ("brackets", r"\([^)]*\)|\[[^\]]*\]|\{[^}]*\}"),
    ("free", r"\+\s*\d+\s*(?:FREE|BONUS|F)?\b"),
    ("multiplier", r"\*\s*\d+"),
    ("pack_suffix", PACK_SUFFIX),
    ("unit_count", r"\b\d+\s*(?:TABLETS?|TABS|CAPSULES?|CAPS)\b"),
    ("packaging", r"\b(?:STRIPS?|BOX(?:ES)?|NOS|PCS|PKT|PACKET)\b"),
];

static CLEANING_RULES: Lazy<Vec<(&'static str, Regex)>> =
    Lazy::new(|| compile_table(CLEANING_TABLE));

/// Pack-size patterns in priority order. Group 1 holds the pack value.
const PACK_TABLE: &[(&str, &str)] = &[
    ("paren_s", r#"\(\s*(\d+)\s*['’`"]?\s*S\s*\)"#),
    ("bare_s", PACK_SUFFIX),
    ("tablets", r"\b(\d+)\s*(?:TABLETS?|TABS)\b"),
    ("capsules", r"\b(\d+)\s*(?:CAPSULES?|CAPS)\b"),
    // The denominator must not run on into a decimal: `40/12.5` is a strength.
    ("fraction", r"\b\d+\s*/\s*(\d+)(?:[^\d.]|\.\D|\.$|$)"),
    ("ml", r"\b(\d+)\s*ML\b"),
    ("gm", r"\b(\d+)\s*GMS?\b"),
];

pub static PACK_PATTERNS: Lazy<Vec<(&'static str, Regex)>> =
    Lazy::new(|| compile_table(PACK_TABLE));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| compile(r"\s+"));

// Every pattern above is a literal checked by the tests below.
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid rule pattern {pattern:?}: {e}"))
}

fn compile_table<K: Copy>(table: &[(K, &str)]) -> Vec<(K, Regex)> {
    table.iter().map(|(k, p)| (*k, compile(p))).collect()
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Uppercase alphanumeric words, used for whole-word keyword matching.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<String> = phrase.split_whitespace().map(str::to_uppercase).collect();
    !needle.is_empty() && words.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Token shaped like an internal catalog code (SAP-style).
pub fn is_code_token(token: &str) -> bool {
    let token = token.to_uppercase();
    if NUMERIC_CODE.is_match(&token) {
        return match token.parse::<u32>() {
            Ok(n) => !DOSAGE_VALUES.contains(&n) && !(YEAR_MIN..=YEAR_MAX).contains(&n),
            Err(_) => false,
        };
    }
    PREFIXED_CODE.is_match(&token) || LETTER_CODE.is_match(&token)
}

pub fn is_numeric_code_token(token: &str) -> bool {
    NUMERIC_CODE.is_match(token) && is_code_token(token)
}

pub fn is_price_token(token: &str) -> bool {
    PRICE_TOKEN.is_match(token)
}

pub fn is_free_qualifier(token: &str) -> bool {
    let upper = token.to_uppercase();
    let trimmed = upper.trim_matches(|c: char| !c.is_alphanumeric());
    FREE_QUALIFIERS.contains(&trimmed)
}

/// `+10FREE`, `+10`, `10FREE`, `FREE`.
pub fn is_free_annotation(token: &str) -> bool {
    if token.starts_with('+') {
        return true;
    }
    let upper = token.to_uppercase();
    let letters = upper.trim_start_matches(|c: char| c.is_ascii_digit());
    letters != upper && (letters == "FREE" || letters == "F" || letters == "BONUS")
}

/// Strip annotations, pack suffixes and packaging words; uppercase.
pub fn clean_description(raw: &str) -> String {
    let mut text = raw.to_uppercase();
    for (_, re) in CLEANING_RULES.iter() {
        text = re.replace_all(&text, " ").into_owned();
    }
    collapse_whitespace(&text)
        .trim_matches(|c: char| c == '-' || c == ',' || c == '/' || c == ':' || c == '.' || c.is_whitespace())
        .to_string()
}

pub fn meaningful_chars(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphanumeric()).count()
}

pub fn has_header_keywords(text: &str) -> bool {
    let upper = text.to_uppercase();
    DESCRIPTION_HEADER_KEYS.iter().any(|k| upper.contains(k))
        && QUANTITY_HEADER_KEYS.iter().any(|k| upper.contains(k))
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Compiled view of the rule tables plus deployment bounds.
#[derive(Debug, Clone)]
pub struct Policy {
    pub limits: Limits,
    cities: Vec<String>,
    entity_suffixes: Vec<String>,
    banned_keywords: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Policy {
    pub fn from_config(cfg: &Config) -> Self {
        fn merge(base: &[&str], extra: &[String]) -> Vec<String> {
            base.iter()
                .map(|s| s.to_string())
                .chain(extra.iter().map(|s| collapse_whitespace(&s.to_uppercase())))
                .filter(|s| !s.is_empty())
                .collect()
        }

        Self {
            limits: cfg.limits.clone(),
            cities: merge(CITIES, &cfg.policy.extra_cities),
            entity_suffixes: merge(ENTITY_SUFFIXES, &cfg.policy.extra_entity_suffixes),
            banned_keywords: merge(BANNED_KEYWORDS, &cfg.policy.extra_banned_keywords),
        }
    }

    pub fn line_rule(&self, text: &str) -> Option<LineRule> {
        LINE_RULES
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(rule, _)| *rule)
    }

    pub fn is_metadata(&self, text: &str) -> bool {
        self.matches_rule(LineRule::Metadata, text)
    }

    pub fn is_stop(&self, text: &str) -> bool {
        self.matches_rule(LineRule::Stop, text)
    }

    pub fn is_noise(&self, text: &str) -> bool {
        self.matches_rule(LineRule::Noise, text)
    }

    fn matches_rule(&self, rule: LineRule, text: &str) -> bool {
        LINE_RULES
            .iter()
            .any(|(r, re)| *r == rule && re.is_match(text))
    }

    pub fn is_city(&self, text: &str) -> bool {
        let norm = words(text).join(" ");
        self.cities.iter().any(|c| *c == norm)
    }

    pub fn has_entity_suffix(&self, text: &str) -> bool {
        let w = words(text);
        self.entity_suffixes.iter().any(|s| contains_phrase(&w, s))
    }

    /// The phrase ends in a business-entity suffix (`... PHARMA`, `... PVT LTD`).
    pub fn ends_with_entity_suffix(&self, text: &str) -> bool {
        let w = words(text);
        self.entity_suffixes.iter().any(|s| {
            let needle: Vec<String> = s.split_whitespace().map(str::to_string).collect();
            !needle.is_empty() && w.ends_with(&needle)
        })
    }

    pub fn has_banned_keyword(&self, text: &str) -> bool {
        let w = words(text);
        self.banned_keywords.iter().any(|k| contains_phrase(&w, k))
    }

    pub fn is_valid_qty(&self, qty: u32) -> bool {
        (1..=self.limits.max_order_qty).contains(&qty)
    }

    pub fn is_valid_pack(&self, pack: u32) -> bool {
        (1..=self.limits.max_pack).contains(&pack)
    }

    /// Integer token inside the business-valid quantity range.
    pub fn qty_token(&self, token: &str) -> Option<u32> {
        if !token.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        token.parse::<u32>().ok().filter(|q| self.is_valid_qty(*q))
    }

    /// Carries a code token or a plausible quantity token.
    pub fn looks_like_data(&self, text: &str) -> bool {
        text.split_whitespace()
            .any(|t| is_code_token(t) || self.qty_token(t).is_some())
    }

    /// Returns the cleaned division name when `text` is a division banner.
    pub fn division_banner(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if let Some(cap) = LABELED_DIVISION.captures(text) {
            let name = collapse_whitespace(&cap[1].to_uppercase());
            let name = name.trim_matches(|c: char| !c.is_alphanumeric() && c != ')');
            return (meaningful_chars(name) >= 2).then(|| name.to_string());
        }

        let compact = collapse_whitespace(text);
        let short = SHORT_DIVISION.is_match(&compact) && (3..=8).contains(&compact.len());
        let phrase = CAPS_PHRASE.is_match(&compact)
            && compact.len() <= 40
            && compact.split_whitespace().count() <= 5;
        if !short && !phrase {
            return None;
        }

        let w = words(&compact);
        if w.iter().any(|x| NON_DIVISION_WORDS.contains(&x.as_str()))
            || SUMMARY_KEYWORDS.iter().any(|k| w.iter().any(|x| x == k))
            || has_header_keywords(&compact)
            || self.has_entity_suffix(&compact)
            || self.is_city(&compact)
            || self.line_rule(&compact).is_some()
        {
            return None;
        }

        Some(compact.trim_end_matches(['.', ',', '-']).to_string())
    }
}
