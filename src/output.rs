//! Result types: line items, pages, documents and token accounting.
//!
//! These are the named-field shapes used everywhere inside the crate and on
//! the HTTP surface. The positional `[name, amount, rate, quantity]` wire
//! format the model is asked to emit never leaves
//! [`crate::pipeline::normalize`].

use crate::error::ChunkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// One purchased product, service or charge row on a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillItem {
    pub item_name: String,
    pub item_amount: Option<f64>,
    pub item_rate: Option<f64>,
    /// Defaults to 1 when the bill does not state a quantity.
    pub item_quantity: Option<f64>,
}

/// Category of a bill page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageType {
    #[default]
    #[serde(rename = "Bill Detail")]
    BillDetail,
    #[serde(rename = "Final Bill")]
    FinalBill,
    #[serde(rename = "Pharmacy")]
    Pharmacy,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::BillDetail => "Bill Detail",
            PageType::FinalBill => "Final Bill",
            PageType::Pharmacy => "Pharmacy",
        }
    }

    /// Lenient parse of a model-supplied label.
    ///
    /// Matching ignores case, whitespace, `_` and `-`, so `"final_bill"` and
    /// `"FinalBill"` both map to [`PageType::FinalBill`].
    pub fn from_label(label: &str) -> Option<Self> {
        let key: String = label
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "billdetail" | "billdetails" => Some(PageType::BillDetail),
            "finalbill" => Some(PageType::FinalBill),
            "pharmacy" => Some(PageType::Pharmacy),
            _ => None,
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line items found on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number, as text.
    pub page_no: String,
    pub page_type: PageType,
    pub bill_items: Vec<BillItem>,
}

/// Document-level extraction result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub pagewise_line_items: Vec<PageResult>,
    pub total_item_count: usize,
}

impl ExtractionResult {
    /// Number of items actually present across all pages.
    pub fn counted_items(&self) -> usize {
        self.pagewise_line_items
            .iter()
            .map(|p| p.bill_items.len())
            .sum()
    }
}

/// Token counters reported by the model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            total_tokens: self.total_tokens + rhs.total_tokens,
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// Output of one Extraction Client run (one chunk or one whole document).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkExtraction {
    pub result: ExtractionResult,
    pub usage: TokenUsage,
    /// Item entries discarded by normalisation because of a bad shape.
    pub dropped_items: usize,
}

/// Final document-level output of [`crate::BillExtractor`].
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentExtraction {
    pub data: ExtractionResult,
    pub token_usage: TokenUsage,
    /// Number of chunks the document was split into (`1` when not split).
    pub chunks: usize,
    /// Chunks that failed; only non-empty under
    /// [`crate::config::ChunkFailurePolicy::PartialResults`].
    pub failed_pages: Vec<ChunkError>,
    pub dropped_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_type_serialises_with_spaces() {
        let json = serde_json::to_string(&PageType::FinalBill).unwrap();
        assert_eq!(json, "\"Final Bill\"");
        let back: PageType = serde_json::from_str("\"Bill Detail\"").unwrap();
        assert_eq!(back, PageType::BillDetail);
    }

    #[test]
    fn page_type_from_label_is_lenient() {
        assert_eq!(PageType::from_label("final_bill"), Some(PageType::FinalBill));
        assert_eq!(PageType::from_label(" PHARMACY "), Some(PageType::Pharmacy));
        assert_eq!(PageType::from_label("Bill-Details"), Some(PageType::BillDetail));
        assert_eq!(PageType::from_label("Receipt"), None);
    }

    #[test]
    fn token_usage_sums() {
        let mut total = TokenUsage::default();
        total += TokenUsage {
            total_tokens: 30,
            input_tokens: 20,
            output_tokens: 10,
        };
        total += TokenUsage {
            total_tokens: 7,
            input_tokens: 5,
            output_tokens: 2,
        };
        assert_eq!(
            total,
            TokenUsage {
                total_tokens: 37,
                input_tokens: 25,
                output_tokens: 12
            }
        );
    }

    #[test]
    fn counted_items_spans_pages() {
        let item = BillItem {
            item_name: "X".into(),
            item_amount: Some(1.0),
            item_rate: Some(1.0),
            item_quantity: Some(1.0),
        };
        let result = ExtractionResult {
            pagewise_line_items: vec![
                PageResult {
                    page_no: "1".into(),
                    page_type: PageType::BillDetail,
                    bill_items: vec![item.clone(), item.clone()],
                },
                PageResult {
                    page_no: "2".into(),
                    page_type: PageType::FinalBill,
                    bill_items: vec![item],
                },
            ],
            total_item_count: 0,
        };
        assert_eq!(result.counted_items(), 3);
    }
}
