//! Schema normalisation: raw model JSON → [`ExtractionResult`].
//!
//! The model is asked for positional items (`[name, amount, rate, quantity]`)
//! but sometimes answers with named-field objects instead; both are accepted.
//! Item entries of any other shape are dropped, logged at `warn`, and counted
//! in [`Normalized::dropped_items`] so the caller can report them.
//!
//! Page-level gaps are filled rather than rejected: a missing `page_no` is
//! inferred from position, an unknown `page_type` becomes
//! [`PageType::BillDetail`], and a missing `bill_items` list means no items.
//! Only a payload without a `pagewise_line_items` array is a schema error.

use crate::output::{BillItem, ExtractionResult, PageResult, PageType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// The response parsed as JSON but does not have the expected top-level shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("model response is not a JSON object")]
    NotAnObject,
    #[error("model response has no 'pagewise_line_items' array")]
    MissingPages,
}

/// Result of normalising one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// `total_item_count` is the model's own figure when it gave one.
    pub result: ExtractionResult,
    /// Item count as reported by the model, if any.
    pub reported_total: Option<usize>,
    pub dropped_items: usize,
}

/// Normalise a parsed response.
///
/// `first_page_no` seeds page-number inference: page `i` (0-based) of the
/// response without its own `page_no` becomes `first_page_no + i`.
pub fn normalize_extraction(value: &Value, first_page_no: usize) -> Result<Normalized, SchemaError> {
    let obj = value.as_object().ok_or(SchemaError::NotAnObject)?;
    let pages = obj
        .get("pagewise_line_items")
        .and_then(Value::as_array)
        .ok_or(SchemaError::MissingPages)?;

    let mut dropped_items = 0usize;
    let mut pagewise_line_items = Vec::with_capacity(pages.len());

    for (idx, page) in pages.iter().enumerate() {
        let Some(page) = page.as_object() else {
            warn!("Skipping non-object page entry at index {}", idx);
            continue;
        };
        let (page, dropped) = normalize_page(page, first_page_no + idx);
        dropped_items += dropped;
        pagewise_line_items.push(page);
    }

    let mut result = ExtractionResult {
        pagewise_line_items,
        total_item_count: 0,
    };
    let counted = result.counted_items();
    let reported_total = obj
        .get("total_item_count")
        .and_then(Value::as_u64)
        .map(|n| n as usize);

    if let Some(reported) = reported_total {
        if reported != counted {
            warn!(
                "Model reported total_item_count={} but {} items were extracted",
                reported, counted
            );
        }
    }
    result.total_item_count = reported_total.unwrap_or(counted);

    if dropped_items > 0 {
        warn!("Dropped {} malformed item entries", dropped_items);
    }

    Ok(Normalized {
        result,
        reported_total,
        dropped_items,
    })
}

fn normalize_page(page: &Map<String, Value>, inferred_page_no: usize) -> (PageResult, usize) {
    let page_no = match page.get("page_no") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        },
        _ => inferred_page_no.to_string(),
    };

    let page_type = match page.get("page_type").and_then(Value::as_str) {
        Some(label) => PageType::from_label(label).unwrap_or_else(|| {
            debug!("Unknown page_type '{}' on page {}, using Bill Detail", label, page_no);
            PageType::default()
        }),
        None => PageType::default(),
    };

    let mut dropped = 0usize;
    let bill_items = match page.get("bill_items").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(|raw| {
                let item = normalize_item(raw);
                if item.is_none() {
                    warn!("Dropping malformed item on page {}: {}", page_no, raw);
                    dropped += 1;
                }
                item
            })
            .collect(),
        None => Vec::new(),
    };

    (
        PageResult {
            page_no,
            page_type,
            bill_items,
        },
        dropped,
    )
}

/// Convert one raw item entry, or `None` if its shape is unusable.
pub fn normalize_item(raw: &Value) -> Option<BillItem> {
    let (name, amount, rate, quantity) = match raw {
        Value::Array(fields) if fields.len() >= 4 => {
            (&fields[0], &fields[1], &fields[2], &fields[3])
        }
        Value::Object(map) => (
            map.get("item_name").unwrap_or(&Value::Null),
            map.get("item_amount").unwrap_or(&Value::Null),
            map.get("item_rate").unwrap_or(&Value::Null),
            map.get("item_quantity").unwrap_or(&Value::Null),
        ),
        _ => return None,
    };

    let item_name = match name {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let item_amount = lenient_number(amount)?;
    let item_quantity = lenient_number(quantity)?.or(Some(1.0));
    let item_rate = lenient_number(rate)?.or_else(|| infer_rate(item_amount, item_quantity));

    Some(BillItem {
        item_name,
        item_amount,
        item_rate,
        item_quantity,
    })
}

/// Overwrite page numbers with the known position of the document in the
/// original file, `first_page_no` onwards.
///
/// A single-page chunk is page 1 from the model's point of view, so its own
/// `page_no` is not trusted.
pub fn pin_page_numbers(result: &mut ExtractionResult, first_page_no: usize) {
    for (idx, page) in result.pagewise_line_items.iter_mut().enumerate() {
        let page_no = (first_page_no + idx).to_string();
        if page.page_no != page_no {
            debug!("Renumbering page '{}' as {}", page.page_no, page_no);
            page.page_no = page_no;
        }
    }
}

// First number in the string; the dot of a prefix like `Rs.` is not part of it.
static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").unwrap());

/// `Some(None)` for null/absent, `Some(Some(x))` for a number, `None` for junk.
///
/// Numeric strings are accepted, ignoring currency prefixes, thousands
/// separators and surrounding text (`"Rs. 1,200.50"` → `1200.5`).
fn lenient_number(v: &Value) -> Option<Option<f64>> {
    match v {
        Value::Null => Some(None),
        Value::Number(n) => n.as_f64().map(Some),
        Value::String(s) if s.trim().is_empty() => Some(None),
        Value::String(s) => {
            let found = RE_NUMBER.find(s)?;
            found.as_str().replace(',', "").parse::<f64>().ok().map(Some)
        }
        _ => None,
    }
}

fn infer_rate(amount: Option<f64>, quantity: Option<f64>) -> Option<f64> {
    match (amount, quantity) {
        (Some(a), Some(q)) if q > 0.0 => Some((a / q * 100.0).round() / 100.0),
        _ => None,
    }
}
