//! Instruction prompt for bill line-item extraction.
//!
//! The prompt pins down both the extraction rules and the exact JSON shape the
//! model must return. Line items travel as positional
//! `[item_name, item_amount, item_rate, item_quantity]` arrays to keep the
//! response short; [`crate::pipeline::normalize`] turns them back into named
//! fields.

/// Placeholder replaced with the OCR hint text.
pub const OCR_CONTEXT_SLOT: &str = "{ocr_context}";

/// Extraction prompt. Contains [`OCR_CONTEXT_SLOT`] exactly once.
pub const EXTRACTION_PROMPT: &str = r#"You are an expert data extraction assistant. Extract every individual line item from the attached bill or invoice.

GOAL
The sum of item_amount over all extracted items must equal the bill's final total.

OCR CONTEXT (machine-read hint, may be garbled; the attached document is authoritative)
{ocr_context}

RULES
1. LINE ITEMS
   - Extract individual products, medicines, services and charges.
   - EXCLUDE aggregate fields: Subtotal, Total, Net Total, Amount Due, Balance Due, Previous Balance.
   - INCLUDE taxes or discounts ONLY when listed as their own row with an amount that contributes to the final total.
2. PAGES
   - Group items by page. Give each page a page_no (string, starting at "1" if not printed) and a page_type.
   - page_type is one of: "Bill Detail", "Final Bill", "Pharmacy".
3. FIELDS
   - item_name: exactly as written on the bill.
   - item_amount: net amount for the row (rate x quantity, after any row discount). MUST be a currency value; never an invoice number, date (e.g. 20231012), phone number or ID.
   - item_rate: price per unit. If absent, use item_amount / item_quantity, or null.
   - item_quantity: if absent, use 1.
4. ACCURACY
   - Do not double count. Check that the amounts add up to the final total before answering.
   - Handwriting: use the OCR context to decipher unclear text but prefer what you see in the document; use rate x quantity = amount to resolve ambiguity.
5. OUTPUT
   - Return ONE minified JSON object and nothing else.
   - bill_items is a list of lists: [item_name, item_amount, item_rate, item_quantity]. Do NOT use objects for items.
   - Numbers must be valid JSON numbers (4 or 4.0, never 4.). No trailing commas. Close every bracket.

{"pagewise_line_items":[{"page_no":"1","page_type":"Bill Detail","bill_items":[["item_name",0.0,0.0,1]]}],"total_item_count":1}

total_item_count is the number of items you extracted across all pages. Use null or 0 for fields that do not apply."#;

/// Build the final prompt by folding OCR text into the context slot.
pub fn build_extraction_prompt(ocr_context: &str) -> String {
    EXTRACTION_PROMPT.replacen(OCR_CONTEXT_SLOT, ocr_context, 1)
}
