use serde::{Deserialize, Serialize};

pub const UNKNOWN_STORE: &str = "Unknown Store";
pub const UNKNOWN_PHONE: &str = "Unknown Phone";
pub const UNKNOWN_ADDRESS: &str = "Unknown Address";
pub const UNKNOWN_WEBSITE: &str = "Unknown Website";
pub const UNKNOWN_DATE: &str = "Unknown Date";
pub const UNKNOWN_TIME: &str = "Unknown Time";
pub const UNKNOWN_TOTAL: &str = "Unknown Total";
pub const UNKNOWN_PAYMENT_METHOD: &str = "Unknown Payment Method";

/// One purchased line: cleaned name and the two-decimal price as printed.
///
/// Serializes as a `[name, price]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct LineItem {
    pub name: String,
    pub price: String,
}

impl LineItem {
    pub fn new(name: impl Into<String>, price: impl Into<String>) -> Self {
        Self { name: name.into(), price: price.into() }
    }
}

impl From<(String, String)> for LineItem {
    fn from((name, price): (String, String)) -> Self {
        Self { name, price }
    }
}

impl From<LineItem> for (String, String) {
    fn from(item: LineItem) -> Self {
        (item.name, item.price)
    }
}

/// Structured fields pulled out of the OCR text of a single receipt page.
///
/// Every scalar field is always populated: a field that could not be matched
/// holds its `UNKNOWN_*` sentinel rather than being left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    #[serde(rename = "Store")]
    pub store: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Website")]
    pub website: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
    /// Amount after the last "Total" label, e.g. `"12.34"`.
    #[serde(rename = "Total")]
    pub total: String,
    #[serde(rename = "Payment Method")]
    pub payment_method: String,
    /// Line items in the order they appear on the receipt.
    #[serde(rename = "Items")]
    pub items: Vec<LineItem>,
}

impl Default for ReceiptRecord {
    fn default() -> Self {
        Self {
            store: UNKNOWN_STORE.to_string(),
            phone: UNKNOWN_PHONE.to_string(),
            address: UNKNOWN_ADDRESS.to_string(),
            website: UNKNOWN_WEBSITE.to_string(),
            date: UNKNOWN_DATE.to_string(),
            time: UNKNOWN_TIME.to_string(),
            total: UNKNOWN_TOTAL.to_string(),
            payment_method: UNKNOWN_PAYMENT_METHOD.to_string(),
            items: Vec::new(),
        }
    }
}

/// What kind of upload a byte buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    Pdf,
}

impl DocumentKind {
    /// Sniff the `%PDF-` header first, then fall back to the file extension.
    pub fn detect(data: &[u8], ext: &str) -> Self {
        if data.starts_with(b"%PDF-") || ext.eq_ignore_ascii_case("pdf") {
            DocumentKind::Pdf
        } else {
            DocumentKind::Image
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Image => write!(f, "image"),
            DocumentKind::Pdf => write!(f, "pdf"),
        }
    }
}
