//! Extraction prompt and response schema.
//!
//! The schema is sent with every extraction call; the typed decoder in
//! [`crate::pipeline::extract`] mirrors it field for field. Callers can
//! override the prompt via [`crate::config::ScanConfig::system_prompt`] but
//! the schema is fixed.

use serde_json::{json, Value};

/// Default instructions for reading a brokerage statement image.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are reading a photographed or scanned brokerage / pension / bank portfolio statement.
Extract every holding shown in the image.

Rules:

1. ONE ENTRY PER HOLDING
   - Include stocks, bonds, mutual funds, ETFs, crypto, deposits and real estate
   - Skip totals, subtotals, cash-balance summaries and column headers

2. NUMBERS
   - Copy numbers exactly as printed; remove currency symbols and thousands separators only
   - Never round and never convert between units or currencies
   - If the quantity is not printed but the total value is, leave quantity empty and fill total_value

3. CURRENCY
   - A currency symbol printed next to a value is authoritative: $ = USD, ₪ = ILS, € = EUR, £ = GBP
   - If prices are quoted in agorot (Israeli minor unit), set currency to "ILA"
   - Otherwise use the statement's stated currency

4. CONFIDENCE
   - "high" when every field was clearly legible, "medium" when one field was inferred,
     "low" when the row was partly unreadable

5. OUTPUT
   - Reply with a single JSON object matching the schema below
   - Do NOT wrap in markdown fences and do NOT add commentary"#;

/// Asset classes the service may choose from.
pub const ASSET_TYPES: [&str; 7] = [
    "stocks",
    "bonds",
    "mutual_fund",
    "crypto",
    "real_estate",
    "deposit",
    "other",
];

/// Currency codes the service may choose from, including the agorot marker.
pub const CURRENCY_CODES: [&str; 5] = ["USD", "ILS", "ILA", "EUR", "GBP"];

/// JSON schema of the extraction reply.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "investments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "symbol": { "type": "string" },
                        "type": { "type": "string", "enum": ASSET_TYPES },
                        "quantity": { "type": "number" },
                        "purchase_price": { "type": "number" },
                        "current_price": { "type": "number" },
                        "total_value": { "type": "number" },
                        "purchase_date": { "type": "string" },
                        "currency": { "type": "string", "enum": CURRENCY_CODES },
                        "confidence": { "type": "string", "enum": ["high", "medium", "low"] }
                    }
                }
            },
            "detected_broker": { "type": "string" },
            "detected_currency": { "type": "string" }
        },
        "required": ["investments"]
    })
}

/// Full text sent to the model: instructions followed by the schema.
pub fn extraction_instructions(prompt: &str, schema: &Value) -> String {
    format!("{prompt}\n\nJSON schema:\n{schema}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_every_field() {
        let schema = response_schema();
        let item = &schema["properties"]["investments"]["items"]["properties"];
        for field in [
            "name",
            "symbol",
            "type",
            "quantity",
            "purchase_price",
            "current_price",
            "total_value",
            "purchase_date",
            "currency",
            "confidence",
        ] {
            assert!(item.get(field).is_some(), "missing {field}");
        }
        assert!(schema["properties"].get("detected_broker").is_some());
        assert!(schema["properties"].get("detected_currency").is_some());
    }

    #[test]
    fn instructions_embed_schema() {
        let text = extraction_instructions(DEFAULT_EXTRACTION_PROMPT, &response_schema());
        assert!(text.contains("\"investments\""));
        assert!(text.starts_with("You are reading"));
    }
}
