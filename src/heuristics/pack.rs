// src/heuristics/pack.rs

use super::rules::PACK_PATTERNS;

/// A single pack-size hit inside a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PackHit {
    value: u32,
    priority: usize,
    offset: usize,
}

fn pack_hits(text: &str) -> Vec<PackHit> {
    let upper = text.to_uppercase();
    let mut hits = Vec::new();
    for (priority, (_, re)) in PACK_PATTERNS.iter().enumerate() {
        for cap in re.captures_iter(&upper) {
            let Some(m) = cap.get(1) else {
                continue;
            };
            if let Ok(value) = m.as_str().parse::<u32>() {
                hits.push(PackHit {
                    value,
                    priority,
                    offset: m.start(),
                });
            }
        }
    }
    hits
}

/// The pack value the description states most often, within `(0, max_pack]`.
///
/// Ties go to the value whose best hit comes from the higher-priority
/// pattern, then to the one seen first.
pub fn dominant_pack(text: &str, max_pack: u32) -> Option<u32> {
    // value -> (count, best priority, first offset)
    let mut tally: Vec<(u32, usize, usize, usize)> = Vec::new();
    for hit in pack_hits(text) {
        if hit.value == 0 || hit.value > max_pack {
            continue;
        }
        match tally.iter_mut().find(|(v, ..)| *v == hit.value) {
            Some((_, count, priority, offset)) => {
                *count += 1;
                *priority = (*priority).min(hit.priority);
                *offset = (*offset).min(hit.offset);
            }
            None => tally.push((hit.value, 1, hit.priority, hit.offset)),
        }
    }

    tally
        .into_iter()
        .min_by(|a, b| {
            b.1.cmp(&a.1)
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        })
        .map(|(value, ..)| value)
}

/// Infer the pack size for a raw description span.
///
/// Every pattern hit in the span is tallied, including the count suffixes
/// that description cleaning later strips, so `500/125 10'S` packs 10.
pub fn infer_pack(raw_description: &str, max_pack: u32) -> Option<u32> {
    dominant_pack(raw_description, max_pack)
}

/// `floor(qty / pack)`, or 0 when the pack is unknown.
pub fn box_pack_for(ordered_qty: u32, pack: u32) -> u32 {
    if pack == 0 { 0 } else { ordered_qty / pack }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxPackCheck {
    Unchanged(u32),
    Corrected { from: Option<u32>, to: u32 },
}

impl BoxPackCheck {
    pub fn value(&self) -> u32 {
        match self {
            BoxPackCheck::Unchanged(v) => *v,
            BoxPackCheck::Corrected { to, .. } => *to,
        }
    }
}

/// Recompute the box count and compare it with what the row recorded.
///
/// A recorded value of 0 with no known pack is consistent and stays as is.
pub fn reconcile_box_pack(ordered_qty: u32, pack: u32, recorded: Option<u32>) -> BoxPackCheck {
    let expected = box_pack_for(ordered_qty, pack);
    match recorded {
        Some(v) if v == expected => BoxPackCheck::Unchanged(v),
        None if pack == 0 => BoxPackCheck::Unchanged(0),
        _ => BoxPackCheck::Corrected {
            from: recorded,
            to: expected,
        },
    }
}
