//! Extracted transaction records and timestamps
use chrono::{DateTime, SubsecRound, TimeZone, Utc};

/// A single purchased line on a receipt. Amounts are in minor units.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, Eq, PartialEq)]
pub struct LineItem {
    #[n(0)]
    pub description: String,
    #[n(1)]
    pub quantity: u32,
    #[n(2)]
    pub amount: i64,
}

// Fields come back from extraction as loosely-typed text, the user edits them
// during review before anything reaches the transaction store.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, Eq, PartialEq)]
pub struct Transaction {
    #[n(0)]
    pub merchant: String,
    #[n(1)]
    pub date: Option<String>, // YYYY-MM-DD
    #[n(2)]
    pub time: Option<String>, // HH:MM
    #[n(3)]
    pub currency: Option<String>, // ISO 4217
    #[n(4)]
    pub total: i64, // minor units
    #[n(5)]
    pub line_items: Vec<LineItem>,
    #[n(6)]
    pub category: Option<String>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_merchant(mut self, merchant: &str) -> Self {
        self.merchant = merchant.to_string();
        self
    }
    pub fn set_date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }
    pub fn set_time(mut self, time: &str) -> Self {
        self.time = Some(time.to_string());
        self
    }
    pub fn set_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_uppercase());
        self
    }
    pub fn set_total(mut self, total: i64) -> Self {
        self.total = total;
        self
    }
    pub fn set_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
    pub fn add_line_item(mut self, description: &str, quantity: u32, amount: i64) -> Self {
        self.line_items.push(LineItem {
            description: description.to_string(),
            quantity,
            amount,
        });
        self
    }

    /// Sum of line item amounts, `None` when the receipt had no line items.
    pub fn line_item_total(&self) -> Option<i64> {
        if self.line_items.is_empty() {
            return None;
        }
        Some(self.line_items.iter().map(|item| item.amount).sum())
    }

    /// True when line items exist and do not add up to the printed total.
    pub fn has_total_mismatch(&self) -> bool {
        self.line_item_total()
            .map(|sum| sum != self.total)
            .unwrap_or(false)
    }
}

/// Wall-clock instant with millisecond precision, the resolution the
/// envelope stores.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now().trunc_subsecs(3))
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
            .unwrap_or_else(Self::new)
    }
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value.trunc_subsecs(3))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0.timestamp_millis())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let millis = d.i64()?;

        TimeStamp::from_millis(millis).ok_or(minicbor::decode::Error::message(
            "failed to convert epoch millis to utc",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn total_mismatch_needs_line_items() {
        let tx = Transaction::new().set_merchant("Acme").set_total(10);
        assert!(!tx.has_total_mismatch());

        let tx = tx.add_line_item("coffee", 1, 4).add_line_item("bagel", 1, 5);
        assert_eq!(tx.line_item_total(), Some(9));
        assert!(tx.has_total_mismatch());
    }
}
