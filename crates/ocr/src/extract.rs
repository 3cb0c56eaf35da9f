use std::sync::OnceLock;

use regex::Regex;

use crate::types::{
    LineItem, ReceiptRecord, UNKNOWN_ADDRESS, UNKNOWN_DATE, UNKNOWN_PAYMENT_METHOD,
    UNKNOWN_PHONE, UNKNOWN_STORE, UNKNOWN_TIME, UNKNOWN_TOTAL, UNKNOWN_WEBSITE,
};

// ── Vocabularies ─────────────────────────────────────────────────────────────

pub const PAYMENT_METHODS: &[&str] = &[
    "Visa", "MasterCard", "Amex", "Discover", "Cash", "PayPal", "Debit", "Credit",
];

pub const STREET_SUFFIXES: &[&str] = &["Ave", "St", "Blvd", "Rd", "Dr", "Lane", "Way", "Court"];

pub const WEBSITE_TLDS: &[&str] = &["com", "net", "org", "edu", "gov"];

/// Substrings that mark a priced line as a summary row rather than a purchase.
pub const IGNORE_KEYWORDS: &[&str] = &[
    "Total", "You Saved", "Grand Total", "Order Total", "Payment", "Savings", "Change", "lb",
    "FOR",
];

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Anchored at the start of the text; the run stays on the first line.
re!(re_store, r"^[A-Z][A-Za-z& \t]+");
re!(re_phone, r"\(\d{3}\)\s*\d{3}[-.\s]\d{4}|\d{3}[-.\s]\d{3}[-.\s]\d{4}");
re!(re_address, &format!(r"\d+\s+[A-Za-z\s]+(?:{})", STREET_SUFFIXES.join("|")));
re!(re_website, &format!(r"https?://\S+|www\.\S+|\w+\.(?:{})", WEBSITE_TLDS.join("|")));
re!(re_date, r"\d{2}[/-]\d{2}[/-]\d{4}|\d{4}[/-]\d{2}[/-]\d{2}");
// Whitespace after the minutes is only taken together with a meridiem.
re!(re_time, r"(?i)\d{1,2}:\d{2}(?:\s?(?:AM|PM))?");
re!(re_total, r"(?i)Total\s?\$?(\d+\.\d{2})");
re!(re_payment, &format!("(?i){}", PAYMENT_METHODS.join("|")));

re!(re_item, r"([A-Za-z][A-Za-z\s&-]+?)\s+(\d+\.\d{2})");
re!(re_bulk_pricing, r"\d+\s*@\s*\d+\s*FOR");
re!(re_item_prefix, r"^\b[A-Z]{1,2}\b\s*");
re!(re_item_junk, r"[^A-Za-z\s&-]");

// ── Public extraction API ─────────────────────────────────────────────────────

/// Parse the OCR text of one receipt page. Never fails; see [`Extractor::extract`].
pub fn parse(ocr_text: &str) -> ReceiptRecord {
    Extractor::extract(ocr_text)
}

pub struct Extractor;

impl Extractor {
    /// Extract structured fields from raw OCR text.
    ///
    /// Each field is probed independently, so a field that fails to match
    /// falls back to its sentinel without affecting the others.
    pub fn extract(ocr_text: &str) -> ReceiptRecord {
        ReceiptRecord {
            store: Self::extract_store(ocr_text).unwrap_or_else(|| UNKNOWN_STORE.to_string()),
            phone: first_match(re_phone(), ocr_text).unwrap_or_else(|| UNKNOWN_PHONE.to_string()),
            address: first_match(re_address(), ocr_text)
                .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
            website: first_match(re_website(), ocr_text)
                .unwrap_or_else(|| UNKNOWN_WEBSITE.to_string()),
            date: first_match(re_date(), ocr_text).unwrap_or_else(|| UNKNOWN_DATE.to_string()),
            time: first_match(re_time(), ocr_text).unwrap_or_else(|| UNKNOWN_TIME.to_string()),
            total: Self::extract_total(ocr_text).unwrap_or_else(|| UNKNOWN_TOTAL.to_string()),
            payment_method: first_match(re_payment(), ocr_text)
                .unwrap_or_else(|| UNKNOWN_PAYMENT_METHOD.to_string()),
            items: Self::extract_items(ocr_text),
        }
    }

    // ── Store ─────────────────────────────────────────────────────────────────

    fn extract_store(text: &str) -> Option<String> {
        let m = re_store().find(text)?;
        Some(m.as_str().trim().to_string())
    }

    // ── Total ─────────────────────────────────────────────────────────────────

    /// Amount following the last "Total" label. Case-insensitive, so a
    /// trailing "Subtotal" also counts as a label.
    fn extract_total(text: &str) -> Option<String> {
        let c = re_total().captures_iter(text).last()?;
        Some(c.get(1)?.as_str().to_string())
    }

    // ── Line items ────────────────────────────────────────────────────────────

    fn extract_items(text: &str) -> Vec<LineItem> {
        re_item()
            .captures_iter(text)
            .filter_map(|c| {
                let raw = c.get(1)?.as_str();
                let price = c.get(2)?.as_str();
                if re_bulk_pricing().is_match(raw) {
                    return None;
                }
                let name = clean_item_name(raw);
                if IGNORE_KEYWORDS.iter().any(|k| name.contains(k)) {
                    return None;
                }
                Some(LineItem::new(name, price))
            })
            .collect()
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn first_match(re: &Regex, text: &str) -> Option<String> {
    re.find(text).map(|m| m.as_str().to_string())
}

/// Trim, drop a stray one- or two-letter uppercase prefix (OCR noise such as a
/// tax flag "F"), then keep only letters, whitespace, `&` and `-`.
fn clean_item_name(raw: &str) -> String {
    let name = raw.trim();
    let name = re_item_prefix().replace(name, "");
    re_item_junk().replace_all(&name, "").into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
