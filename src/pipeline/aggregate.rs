//! Fan-in of per-chunk results.
//!
//! Chunk outcomes arrive in page order. [`merge_chunks`] concatenates their
//! pages, recomputes `total_item_count` from the merged pages (never summing
//! model-reported counts) and adds up token usage. [`resolve_chunks`] applies
//! the [`ChunkFailurePolicy`] when some chunks failed.

use crate::config::ChunkFailurePolicy;
use crate::error::ChunkError;
use crate::output::{ChunkExtraction, TokenUsage};
use tracing::warn;

/// Merge successful chunk extractions in the order given.
pub fn merge_chunks(chunks: Vec<ChunkExtraction>) -> ChunkExtraction {
    let mut merged = ChunkExtraction::default();
    for chunk in chunks {
        merged
            .result
            .pagewise_line_items
            .extend(chunk.result.pagewise_line_items);
        merged.usage += chunk.usage;
        merged.dropped_items += chunk.dropped_items;
    }
    merged.result.total_item_count = merged.result.counted_items();
    merged
}

/// What to do with a set of chunk outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResolution {
    /// Use the merged result. `failed` is non-empty only under
    /// [`ChunkFailurePolicy::PartialResults`].
    Merged {
        extraction: ChunkExtraction,
        failed: Vec<ChunkError>,
    },
    /// Discard the chunks and re-run extraction on the whole document.
    /// `spent` is the usage already consumed by the chunks that succeeded.
    FallbackToWhole {
        errors: Vec<ChunkError>,
        spent: TokenUsage,
    },
    /// Fail the request with the first chunk error.
    Fail(ChunkError),
    /// No chunk succeeded.
    AllFailed {
        total: usize,
        first_error: ChunkError,
    },
}

/// Apply `policy` to per-chunk outcomes (in page order).
pub fn resolve_chunks(
    outcomes: Vec<Result<ChunkExtraction, ChunkError>>,
    policy: ChunkFailurePolicy,
) -> ChunkResolution {
    let total = outcomes.len();
    let mut succeeded = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(chunk) => succeeded.push(chunk),
            Err(e) => failed.push(e),
        }
    }

    if failed.is_empty() {
        return ChunkResolution::Merged {
            extraction: merge_chunks(succeeded),
            failed,
        };
    }

    for e in &failed {
        warn!("{}", e);
    }

    match policy {
        ChunkFailurePolicy::WholeDocument => ChunkResolution::FallbackToWhole {
            spent: succeeded
                .iter()
                .fold(TokenUsage::default(), |acc, c| acc + c.usage),
            errors: failed,
        },
        ChunkFailurePolicy::FailRequest => ChunkResolution::Fail(failed.swap_remove(0)),
        ChunkFailurePolicy::PartialResults if succeeded.is_empty() => ChunkResolution::AllFailed {
            total,
            first_error: failed.swap_remove(0),
        },
        ChunkFailurePolicy::PartialResults => ChunkResolution::Merged {
            extraction: merge_chunks(succeeded),
            failed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{BillItem, ExtractionResult, PageResult, PageType};

    fn chunk(page: usize, items: usize) -> ChunkExtraction {
        ChunkExtraction {
            result: ExtractionResult {
                pagewise_line_items: vec![PageResult {
                    page_no: page.to_string(),
                    page_type: PageType::BillDetail,
                    bill_items: (0..items)
                        .map(|i| BillItem {
                            item_name: format!("item {i}"),
                            item_amount: Some(10.0),
                            item_rate: Some(10.0),
                            item_quantity: Some(1.0),
                        })
                        .collect(),
                }],
                // Deliberately wrong: merge must not trust per-chunk totals.
                total_item_count: 99,
            },
            usage: TokenUsage {
                total_tokens: 100,
                input_tokens: 80,
                output_tokens: 20,
            },
            dropped_items: 0,
        }
    }

    fn failure(page: usize) -> ChunkError {
        ChunkError {
            page,
            detail: "Extraction failed after 3 attempts: timeout".into(),
        }
    }

    fn five_pages_page3_fails() -> Vec<Result<ChunkExtraction, ChunkError>> {
        (1..=5)
            .map(|p| if p == 3 { Err(failure(3)) } else { Ok(chunk(p, p)) })
            .collect()
    }

    #[test]
    fn merge_preserves_order_and_recounts() {
        let merged = merge_chunks(vec![chunk(1, 2), chunk(2, 0), chunk(3, 5)]);
        let pages: Vec<_> = merged
            .result
            .pagewise_line_items
            .iter()
            .map(|p| p.page_no.as_str())
            .collect();
        assert_eq!(pages, ["1", "2", "3"]);
        assert_eq!(merged.result.total_item_count, 7);
        assert_eq!(
            merged.usage,
            TokenUsage {
                total_tokens: 300,
                input_tokens: 240,
                output_tokens: 60
            }
        );
    }

    #[test]
    fn all_succeeded_merges_regardless_of_policy() {
        let outcomes: Vec<_> = (1..=3).map(|p| Ok(chunk(p, 1))).collect();
        match resolve_chunks(outcomes, ChunkFailurePolicy::FailRequest) {
            ChunkResolution::Merged { extraction, failed } => {
                assert!(failed.is_empty());
                assert_eq!(extraction.result.total_item_count, 3);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn whole_document_policy_falls_back() {
        match resolve_chunks(five_pages_page3_fails(), ChunkFailurePolicy::WholeDocument) {
            ChunkResolution::FallbackToWhole { errors, spent } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].page, 3);
                assert_eq!(spent.total_tokens, 400);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn fail_request_policy_fails() {
        match resolve_chunks(five_pages_page3_fails(), ChunkFailurePolicy::FailRequest) {
            ChunkResolution::Fail(e) => assert_eq!(e.page, 3),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn partial_results_policy_keeps_survivors() {
        match resolve_chunks(five_pages_page3_fails(), ChunkFailurePolicy::PartialResults) {
            ChunkResolution::Merged { extraction, failed } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(extraction.result.pagewise_line_items.len(), 4);
                // 1 + 2 + 4 + 5
                assert_eq!(extraction.result.total_item_count, 12);
                assert_eq!(extraction.usage.total_tokens, 400);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn partial_results_with_no_survivors_is_all_failed() {
        let outcomes = vec![Err(failure(1)), Err(failure(2)), Err(failure(3))];
        match resolve_chunks(outcomes, ChunkFailurePolicy::PartialResults) {
            ChunkResolution::AllFailed { total, first_error } => {
                assert_eq!(total, 3);
                assert_eq!(first_error.page, 1);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }
}
