//! Record normalization: one raw extracted holding → one [`CandidateRecord`].
//!
//! Pure and deterministic: no I/O, no clock, no randomness, so normalizing
//! the same input twice always yields the same record. Missing or garbled
//! data degrades to defaults instead of failing.
//!
//! ## Rule Order
//!
//! 1. Prices fall back on each other, then to 0
//! 2. Quantity is recovered from `total_value / current_price` when absent
//! 3. Agorot correction: prices ÷ 100 when quoted in the Israeli minor unit,
//!    or when a Tel-Aviv broker shows a purchase price above 10 000
//! 4. Currency: record → symbol printed on the record → statement → default
//! 5. Asset type via a keyword table (English and Hebrew)
//! 6. Quantity 1 if still zero, confidence `medium`, selected
//!
//! Quantity recovery runs before the agorot correction on purpose: the total
//! and the price are in the same unit, so their ratio is unit-free.

use crate::model::{AssetType, CandidateRecord, Confidence, Currency};
use crate::pipeline::extract::{ExtractedStatement, LooseNumber, RawInvestment, StatementHints};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Purchase prices above this from a Tel-Aviv broker are assumed to be agorot.
const AGOROT_PRICE_THRESHOLD: f64 = 10_000.0;

static TASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\btase\b|tel[\s-]?aviv|בורסה|ת"א|תל[\s-]?אביב"#).unwrap()
});

/// Keyword table for rule 5, checked in order against the lower-cased type.
const TYPE_KEYWORDS: &[(&[&str], AssetType)] = &[
    (&["stock", "מני"], AssetType::Stocks),
    (&["bond", "אג"], AssetType::Bonds),
    (&["fund", "etf", "קרן"], AssetType::MutualFund),
    (&["crypto", "קריפטו", "ביטקוין"], AssetType::Crypto),
    (&["deposit", "פיקדון"], AssetType::Deposit),
    (&["real", "נדל"], AssetType::RealEstate),
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y", "%Y/%m/%d", "%d/%m/%y"];

/// Currency as declared on a record: a major unit or the agorot marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredCurrency {
    Major(Currency),
    /// Israeli minor unit (1/100 ILS).
    Agorot,
}

impl DeclaredCurrency {
    pub fn major(self) -> Currency {
        match self {
            DeclaredCurrency::Major(c) => c,
            DeclaredCurrency::Agorot => Currency::Ils,
        }
    }
}

/// Parse a free-form currency label: code, symbol, or word.
pub fn parse_currency(label: &str) -> Option<DeclaredCurrency> {
    let lower = label.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.contains("אגור") || matches!(lower.as_str(), "ila" | "ilx" | "agorot" | "agora" | "ag") {
        return Some(DeclaredCurrency::Agorot);
    }
    if let Some(c) = lower.chars().find_map(Currency::from_symbol) {
        return Some(DeclaredCurrency::Major(c));
    }
    let major = if lower.contains("usd") || lower.contains("dollar") || lower.contains("דולר") {
        Currency::Usd
    } else if lower.contains("ils")
        || lower.contains("nis")
        || lower.contains("shekel")
        || lower.contains("שקל")
        || lower.contains("ש\"ח")
        || lower.contains("ש״ח")
    {
        Currency::Ils
    } else if lower.contains("eur") || lower.contains("אירו") || lower.contains("יורו") {
        Currency::Eur
    } else if lower.contains("gbp") || lower.contains("pound") || lower.contains("sterling") || lower.contains("ליש") {
        Currency::Gbp
    } else {
        return None;
    };
    Some(DeclaredCurrency::Major(major))
}

/// First number in a free-form amount, with any sign or parentheses
/// attached directly to it.
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\()?\s*(-)?(\d[\d.,]*)(-)?\s*(\))?").unwrap()
});

/// Strip symbols and separators from an amount and parse it.
///
/// Handles `1,234.56`, `1.234,56`, `₪ 228.80`, `(12.5)` and trailing `-`.
/// Only the first number in the text is read, so labels such as
/// `228.80 (ILS)` or `12.5 - USD` do not change its sign or scale.
/// A lone comma before three digits is a thousands separator (`1,200`)
/// unless the integer part is `0` (`0,125`).
/// Returns `None` when no digit is present.
pub fn parse_amount(text: &str) -> Option<f64> {
    let caps = AMOUNT_RE.captures(text)?;
    let wrapped = caps.get(1).is_some() && caps.get(5).is_some();
    let negative = wrapped || caps.get(2).is_some() || caps.get(4).is_some();
    let token = caps.get(3)?.as_str().trim_end_matches(['.', ',']);

    let normalized = match (token.rfind('.'), token.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = token.len() - comma - 1;
            let lone = token.matches(',').count() == 1;
            if lone && (decimals != 3 || &token[..comma] == "0") {
                token.replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        _ => token.to_string(),
    };
    let normalized = if normalized.matches('.').count() > 1 {
        normalized.replace('.', "")
    } else {
        normalized
    };

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Map a free-form type label to an [`AssetType`].
pub fn map_asset_type(label: Option<&str>) -> AssetType {
    let Some(label) = label else {
        return AssetType::Other;
    };
    let lower = label.trim().to_lowercase();
    TYPE_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, t)| *t)
        .unwrap_or(AssetType::Other)
}

/// Whether the broker name points at the Tel-Aviv Stock Exchange.
pub fn is_tel_aviv_broker(broker: Option<&str>) -> bool {
    broker.map(|b| TASE_RE.is_match(b)).unwrap_or(false)
}

fn parse_date(text: Option<&str>) -> Option<NaiveDate> {
    let text = text?.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
}

fn num(n: &Option<LooseNumber>) -> Option<f64> {
    n.as_ref().and_then(LooseNumber::value)
}

/// Turns raw holdings into canonical candidate records.
#[derive(Debug, Clone, Copy)]
pub struct RecordNormalizer {
    /// Used when neither record nor statement names a currency.
    pub default_currency: Currency,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self {
            default_currency: Currency::Usd,
        }
    }
}

impl RecordNormalizer {
    pub fn new(default_currency: Currency) -> Self {
        Self { default_currency }
    }

    /// Normalize every holding of one image, preserving extraction order.
    pub fn normalize_all(&self, statement: &ExtractedStatement, source_image: usize) -> Vec<CandidateRecord> {
        statement
            .investments
            .iter()
            .map(|raw| self.normalize(raw, &statement.hints, source_image))
            .collect()
    }

    /// Normalize a single holding.
    pub fn normalize(
        &self,
        raw: &RawInvestment,
        hints: &StatementHints,
        source_image: usize,
    ) -> CandidateRecord {
        // Rule 1
        let mut purchase_price = num(&raw.purchase_price)
            .or_else(|| num(&raw.current_price))
            .unwrap_or(0.0);
        let mut current_price = num(&raw.current_price)
            .or_else(|| num(&raw.purchase_price))
            .unwrap_or(0.0);

        // Rule 2
        let mut quantity = num(&raw.quantity).unwrap_or(0.0);
        if quantity == 0.0 && current_price > 0.0 {
            if let Some(total) = num(&raw.total_value) {
                quantity = total / current_price;
            }
        }

        // Rule 3
        let declared = raw.currency.as_deref().and_then(parse_currency);
        let statement_currency = hints.detected_currency.as_deref().and_then(parse_currency);
        let quoted_in_agorot = declared.or(statement_currency) == Some(DeclaredCurrency::Agorot);
        let tase_outlier = is_tel_aviv_broker(hints.detected_broker.as_deref())
            && purchase_price > AGOROT_PRICE_THRESHOLD;
        if quoted_in_agorot || tase_outlier {
            purchase_price /= 100.0;
            current_price /= 100.0;
        }

        // Rule 4
        let printed_symbol = [&raw.current_price, &raw.purchase_price, &raw.total_value]
            .into_iter()
            .flatten()
            .find_map(LooseNumber::currency_symbol);
        let currency = declared
            .map(DeclaredCurrency::major)
            .or(printed_symbol)
            .or(statement_currency.map(DeclaredCurrency::major))
            .unwrap_or(self.default_currency);

        // Rule 5
        let asset_type = map_asset_type(raw.asset_type.as_deref());

        // Rule 6
        if quantity == 0.0 || !quantity.is_finite() {
            quantity = 1.0;
        }
        let confidence = raw
            .confidence
            .as_deref()
            .and_then(Confidence::parse)
            .unwrap_or_default();

        let symbol = raw.symbol.clone().unwrap_or_default();
        let name = raw
            .name
            .clone()
            .or_else(|| (!symbol.is_empty()).then(|| symbol.clone()))
            .unwrap_or_else(|| "Unknown holding".to_string());

        CandidateRecord {
            name,
            symbol,
            asset_type,
            quantity,
            purchase_price,
            current_price,
            currency,
            purchase_date: parse_date(raw.purchase_date.as_deref()),
            confidence,
            selected: true,
            source_image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Option<LooseNumber> {
        Some(LooseNumber::Text(s.to_string()))
    }

    fn number(n: f64) -> Option<LooseNumber> {
        Some(LooseNumber::Number(n))
    }

    fn hints(broker: Option<&str>, currency: Option<&str>) -> StatementHints {
        StatementHints {
            detected_broker: broker.map(str::to_string),
            detected_currency: currency.map(str::to_string),
        }
    }

    #[test]
    fn symbol_on_record_beats_statement_hint() {
        let n = RecordNormalizer::default();
        for (symbol, expected) in [
            ('$', Currency::Usd),
            ('₪', Currency::Ils),
            ('€', Currency::Eur),
            ('£', Currency::Gbp),
        ] {
            let as_field = RawInvestment {
                currency: Some(symbol.to_string()),
                current_price: number(10.0),
                ..Default::default()
            };
            let in_price = RawInvestment {
                current_price: text(&format!("{symbol}10.00")),
                ..Default::default()
            };
            let h = hints(None, Some("GBP"));
            assert_eq!(n.normalize(&as_field, &h, 0).currency, expected, "field {symbol}");
            let h = hints(None, Some(if expected == Currency::Usd { "EUR" } else { "USD" }));
            assert_eq!(n.normalize(&in_price, &h, 0).currency, expected, "price {symbol}");
        }
    }

    #[test]
    fn quantity_recovered_from_total_value() {
        let raw = RawInvestment {
            quantity: number(0.0),
            total_value: number(2583.56),
            current_price: number(228.80),
            ..Default::default()
        };
        let r = RecordNormalizer::default().normalize(&raw, &StatementHints::default(), 0);
        assert!((r.quantity - 2583.56 / 228.80).abs() < 1e-9);
        assert!((r.quantity - 11.29).abs() < 0.01);
        assert_eq!(r.purchase_price, 228.80);
    }

    #[test]
    fn agorot_prices_are_divided() {
        let raw = RawInvestment {
            currency: Some("אגורות".into()),
            purchase_price: number(22880.0),
            current_price: number(25000.0),
            ..Default::default()
        };
        let r = RecordNormalizer::default().normalize(&raw, &StatementHints::default(), 0);
        assert!((r.purchase_price - 228.80).abs() < 1e-9);
        assert!((r.current_price - 250.00).abs() < 1e-9);
        assert_eq!(r.currency, Currency::Ils);
    }

    #[test]
    fn tase_broker_outlier_is_divided() {
        let raw = RawInvestment {
            purchase_price: number(15_320.0),
            current_price: number(16_000.0),
            currency: Some("ILS".into()),
            ..Default::default()
        };
        let n = RecordNormalizer::default();
        let r = n.normalize(&raw, &hints(Some("Tel Aviv Stock Exchange"), None), 0);
        assert!((r.purchase_price - 153.20).abs() < 1e-9);
        assert!((r.current_price - 160.0).abs() < 1e-9);

        let r = n.normalize(&raw, &hints(Some("Interactive Brokers"), None), 0);
        assert_eq!(r.purchase_price, 15_320.0);
    }

    #[test]
    fn prices_fall_back_on_each_other() {
        let n = RecordNormalizer::default();
        let only_current = RawInvestment {
            current_price: number(12.5),
            ..Default::default()
        };
        let r = n.normalize(&only_current, &StatementHints::default(), 0);
        assert_eq!((r.purchase_price, r.current_price), (12.5, 12.5));

        let r = n.normalize(&RawInvestment::default(), &StatementHints::default(), 0);
        assert_eq!((r.purchase_price, r.current_price), (0.0, 0.0));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let r = RecordNormalizer::new(Currency::Eur).normalize(
            &RawInvestment::default(),
            &StatementHints::default(),
            3,
        );
        assert_eq!(r.quantity, 1.0);
        assert_eq!(r.confidence, Confidence::Medium);
        assert!(r.selected);
        assert_eq!(r.currency, Currency::Eur);
        assert_eq!(r.asset_type, AssetType::Other);
        assert_eq!(r.name, "Unknown holding");
        assert_eq!(r.source_image, 3);
    }

    #[test]
    fn statement_currency_used_when_record_silent() {
        let raw = RawInvestment {
            current_price: number(5.0),
            ..Default::default()
        };
        let r = RecordNormalizer::default().normalize(&raw, &hints(None, Some("EUR")), 0);
        assert_eq!(r.currency, Currency::Eur);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = RawInvestment {
            name: Some("Bank Leumi".into()),
            symbol: Some("LUMI".into()),
            asset_type: Some("מניות".into()),
            quantity: text("1,500"),
            purchase_price: text("2,350"),
            current_price: text("₪2,710.5"),
            purchase_date: Some("14/03/2021".into()),
            confidence: Some("HIGH".into()),
            ..Default::default()
        };
        let h = hints(Some("בורסה לניירות ערך"), Some("ILS"));
        let n = RecordNormalizer::default();
        let a = n.normalize(&raw, &h, 1);
        let b = n.normalize(&raw, &h, 1);
        assert_eq!(a, b);
        assert_eq!(a.asset_type, AssetType::Stocks);
        assert_eq!(a.quantity, 1500.0);
        assert_eq!(a.purchase_date, NaiveDate::from_ymd_opt(2021, 3, 14));
        assert_eq!(a.confidence, Confidence::High);
    }

    #[test]
    fn type_keywords() {
        let cases = [
            ("Stocks", AssetType::Stocks),
            ("מניה", AssetType::Stocks),
            ("Corporate Bond", AssetType::Bonds),
            ("אג\"ח", AssetType::Bonds),
            ("ETF", AssetType::MutualFund),
            ("mutual_fund", AssetType::MutualFund),
            ("קרן נאמנות", AssetType::MutualFund),
            ("Crypto", AssetType::Crypto),
            ("ביטקוין", AssetType::Crypto),
            ("Fixed deposit", AssetType::Deposit),
            ("פיקדון", AssetType::Deposit),
            ("real_estate", AssetType::RealEstate),
            ("נדל\"ן", AssetType::RealEstate),
            ("Options", AssetType::Other),
        ];
        for (label, expected) in cases {
            assert_eq!(map_asset_type(Some(label)), expected, "{label}");
        }
        assert_eq!(map_asset_type(None), AssetType::Other);
    }

    #[test]
    fn amounts_are_stripped_not_rounded() {
        assert_eq!(parse_amount("$1,234.5678"), Some(1234.5678));
        assert_eq!(parse_amount("1.234,56 €"), Some(1234.56));
        assert_eq!(parse_amount("12,5"), Some(12.5));
        assert_eq!(parse_amount("1,200"), Some(1200.0));
        assert_eq!(parse_amount("(42.10)"), Some(-42.10));
        assert_eq!(parse_amount("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_amount("N/A"), None);
    }

    #[test]
    fn surrounding_labels_do_not_change_the_amount() {
        assert_eq!(parse_amount("228.80 (ILS)"), Some(228.80));
        assert_eq!(parse_amount("$1,234.50 (est.)"), Some(1234.50));
        assert_eq!(parse_amount("12.5 - USD"), Some(12.5));
        assert_eq!(parse_amount("Price: 3.10 USD."), Some(3.10));
    }

    #[test]
    fn sign_comes_from_the_number_itself() {
        assert_eq!(parse_amount("(12.5)"), Some(-12.5));
        assert_eq!(parse_amount("( 12.5 )"), Some(-12.5));
        assert_eq!(parse_amount("-3.2"), Some(-3.2));
        assert_eq!(parse_amount("₪ -3.2"), Some(-3.2));
        assert_eq!(parse_amount("7.40-"), Some(-7.40));
        assert_eq!(parse_amount("- 4"), Some(4.0));
    }

    #[test]
    fn lone_comma_after_zero_is_decimal() {
        assert_eq!(parse_amount("0,125"), Some(0.125));
        assert_eq!(parse_amount("0,5"), Some(0.5));
        assert_eq!(parse_amount("5,125"), Some(5125.0));
    }

    #[test]
    fn currency_labels() {
        assert_eq!(parse_currency("ILA"), Some(DeclaredCurrency::Agorot));
        assert_eq!(parse_currency("ש\"ח"), Some(DeclaredCurrency::Major(Currency::Ils)));
        assert_eq!(parse_currency("NIS"), Some(DeclaredCurrency::Major(Currency::Ils)));
        assert_eq!(parse_currency("usd"), Some(DeclaredCurrency::Major(Currency::Usd)));
        assert_eq!(parse_currency("Euro"), Some(DeclaredCurrency::Major(Currency::Eur)));
        assert_eq!(parse_currency("£"), Some(DeclaredCurrency::Major(Currency::Gbp)));
        assert_eq!(parse_currency("JPY"), None);
        assert_eq!(parse_currency(""), None);
    }
}
