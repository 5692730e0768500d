use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Number of decimal places carried by `price_amount_micros`.
const MICROS_SCALE: u32 = 6;

/// Product metadata as reported by the billing service.
///
/// Missing fields default to empty and missing micros to zero. Scalar values
/// of the wrong JSON type are read as their text, so only payloads that are
/// not JSON objects or lack a product id are rejected.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SkuDetailPayload {
    #[serde(rename = "type", deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(rename = "productId", deserialize_with = "lenient_optional_string")]
    pub product_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub price: String,
    #[serde(alias = "priceCurrencyCode", deserialize_with = "lenient_string")]
    pub price_currency_code: String,
    #[serde(alias = "priceAmountMicros", deserialize_with = "lenient_micros")]
    pub price_amount_micros: i64,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_optional_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

/// Integral micros, also accepted as a numeric string. Anything else reads as 0.
fn lenient_micros<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let micros = match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    Ok(micros.unwrap_or_default())
}

/// One catalog entry, keyed by `product_id`. Never mutated once cached.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct SkuDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub product_id: String,
    pub title: String,
    pub description: String,
    /// Display price, already formatted by the store.
    pub price: String,
    pub price_currency_code: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_amount: Decimal,
}

impl SkuDetail {
    /// Parses a single item payload as delivered by the billing service.
    pub fn from_payload(payload: &str) -> Result<Self> {
        let payload: SkuDetailPayload = serde_json::from_str(payload)
            .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;
        payload.try_into()
    }
}

impl TryFrom<SkuDetailPayload> for SkuDetail {
    type Error = BillingError;

    fn try_from(payload: SkuDetailPayload) -> Result<Self> {
        let product_id = payload
            .product_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BillingError::MalformedPayload("missing productId".to_string()))?;

        Ok(Self {
            kind: payload.kind,
            product_id,
            title: payload.title,
            description: payload.description,
            price: payload.price,
            price_currency_code: payload.price_currency_code,
            price_amount: Decimal::new(payload.price_amount_micros, MICROS_SCALE).normalize(),
        })
    }
}

/// Process-lifetime store of product metadata.
///
/// Entries are never invalidated or replaced: a product whose price changes
/// server-side keeps its first recorded detail until the process restarts.
#[derive(Debug, Default)]
pub struct SkuDetailCache {
    details: BTreeMap<String, SkuDetail>,
}

impl SkuDetailCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the requested ids that are not cached yet, deduplicated and in
    /// request order.
    pub fn missing<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        requested
            .iter()
            .map(AsRef::as_ref)
            .filter(|id| !self.details.contains_key(*id) && seen.insert(*id))
            .map(str::to_string)
            .collect()
    }

    /// Inserts a detail unless its product id is already cached.
    ///
    /// Returns `true` when the record was added.
    pub fn insert(&mut self, detail: SkuDetail) -> bool {
        if self.details.contains_key(&detail.product_id) {
            return false;
        }
        self.details.insert(detail.product_id.clone(), detail);
        true
    }

    pub fn insert_payload(&mut self, payload: &str) -> Result<bool> {
        Ok(self.insert(SkuDetail::from_payload(payload)?))
    }

    pub fn get(&self, product_id: &str) -> Option<&SkuDetail> {
        self.details.get(product_id)
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.details.contains_key(product_id)
    }

    pub fn len(&self) -> usize {
        self.details.len()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// The whole cache, as delivered to the host on query completion.
    pub fn snapshot(&self) -> BTreeMap<String, SkuDetail> {
        self.details.clone()
    }
}

#[derive(Debug)]
struct PendingQuery {
    skus: Vec<String>,
    followers: usize,
}

/// Detail queries sent to the billing service and not answered yet, oldest
/// first. The service answers queries in the order they were sent.
///
/// A host query whose ids are all cached or already being fetched follows the
/// newest batch instead of reaching the service again, and is answered when
/// that batch is.
#[derive(Debug, Default)]
pub struct PendingQueries {
    batches: VecDeque<PendingQuery>,
}

impl PendingQueries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.batches
            .iter()
            .any(|batch| batch.skus.iter().any(|sku| sku == product_id))
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Records a batch handed to the service.
    pub fn start(&mut self, skus: Vec<String>) {
        self.batches.push_back(PendingQuery { skus, followers: 0 });
    }

    /// Attaches a host query to the newest batch. Returns `false` when
    /// nothing is in flight.
    pub fn follow_latest(&mut self) -> bool {
        match self.batches.back_mut() {
            Some(batch) => {
                batch.followers += 1;
                true
            }
            None => false,
        }
    }

    /// Retires the oldest batch and returns how many host queries its answer
    /// settles. An answer nobody asked for still counts once.
    pub fn settle_oldest(&mut self) -> usize {
        self.batches
            .pop_front()
            .map_or(1, |batch| batch.followers + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payload(id: &str, micros: i64) -> String {
        serde_json::json!({
            "type": "inapp",
            "productId": id,
            "title": format!("{id} title"),
            "description": "A pile of gold",
            "price": "$2.99",
            "price_currency_code": "USD",
            "price_amount_micros": micros,
        })
        .to_string()
    }

    #[test]
    fn test_price_amount_from_micros() {
        let detail = SkuDetail::from_payload(&payload("gold", 2_990_000)).unwrap();
        assert_eq!(detail.price_amount, dec!(2.99));
        assert_eq!(detail.product_id, "gold");
        assert_eq!(detail.kind, "inapp");
        assert_eq!(detail.price_currency_code, "USD");
    }

    #[test]
    fn test_camel_case_aliases() {
        let raw = r#"{"productId":"gems","priceCurrencyCode":"EUR","priceAmountMicros":990000}"#;
        let detail = SkuDetail::from_payload(raw).unwrap();
        assert_eq!(detail.price_currency_code, "EUR");
        assert_eq!(detail.price_amount, dec!(0.99));
        assert_eq!(detail.title, "");
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        assert!(matches!(
            SkuDetail::from_payload("not json"),
            Err(BillingError::MalformedPayload(_))
        ));
        assert!(matches!(
            SkuDetail::from_payload(r#"{"title":"orphan"}"#),
            Err(BillingError::MalformedPayload(_))
        ));
        assert!(matches!(
            SkuDetail::from_payload(r#"["gold"]"#),
            Err(BillingError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_serialized_record_keys() {
        let detail = SkuDetail::from_payload(&payload("gold", 2_990_000)).unwrap();
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["product_id"], "gold");
        assert_eq!(value["type"], "inapp");
        let amount = value["price_amount"].as_f64().unwrap();
        assert!((amount - 2.99).abs() < 1e-9);
    }

    #[test]
    fn test_missing_deduplicates_and_skips_cached() {
        let mut cache = SkuDetailCache::new();
        cache.insert_payload(&payload("gold", 1)).unwrap();

        let missing = cache.missing(&["gems", "gold", "gems", "coins"]);
        assert_eq!(missing, vec!["gems".to_string(), "coins".to_string()]);
        assert!(cache.missing(&["gold"]).is_empty());
    }

    #[test]
    fn test_cached_record_is_never_replaced() {
        let mut cache = SkuDetailCache::new();
        assert!(cache.insert_payload(&payload("gold", 2_990_000)).unwrap());
        assert!(!cache.insert_payload(&payload("gold", 5_000_000)).unwrap());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("gold").unwrap().price_amount, dec!(2.99));
    }

    #[test]
    fn test_failed_insert_leaves_cache_untouched() {
        let mut cache = SkuDetailCache::new();
        cache.insert_payload(&payload("gold", 1)).unwrap();
        assert!(cache.insert_payload("{").is_err());
        assert_eq!(cache.snapshot().len(), 1);
    }

    #[test]
    fn test_scalar_fields_of_other_types_are_read_as_text() {
        let raw = r#"{"productId":42,"price":2.99,"title":true,"description":null,"price_amount_micros":"2990000"}"#;
        let detail = SkuDetail::from_payload(raw).unwrap();
        assert_eq!(detail.product_id, "42");
        assert_eq!(detail.price, "2.99");
        assert_eq!(detail.title, "true");
        assert_eq!(detail.description, "");
        assert_eq!(detail.price_amount, dec!(2.99));
    }

    #[test]
    fn test_pending_queries_settle_in_order() {
        let mut pending = PendingQueries::new();
        assert!(!pending.follow_latest());
        assert_eq!(pending.settle_oldest(), 1);

        pending.start(vec!["gold".to_string()]);
        pending.start(vec!["gems".to_string()]);
        assert!(pending.contains("gold"));
        assert!(pending.follow_latest());

        assert_eq!(pending.settle_oldest(), 1);
        assert!(!pending.contains("gold"));
        assert!(pending.contains("gems"));
        assert_eq!(pending.settle_oldest(), 2);
        assert!(pending.is_empty());
    }
}
