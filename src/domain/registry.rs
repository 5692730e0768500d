use super::transaction::{PurchaseOutcome, PurchaseRequest, PurchaseState, Transaction};

/// Host-visible purchase parameters plus the single in-flight transaction.
///
/// Values are last-write-wins. `transaction_id` is kept after the purchase it
/// belongs to finishes and is only replaced by the next purchase or an
/// explicit set.
#[derive(Debug, Default, Clone)]
pub struct TransactionRegistry {
    access_token: Option<String>,
    purchase_validation_url_prefix: Option<String>,
    transaction_id: Option<String>,
    signature: Option<String>,
    in_flight: Option<Transaction>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = Some(token.into());
    }

    pub fn purchase_validation_url_prefix(&self) -> Option<&str> {
        self.purchase_validation_url_prefix.as_deref()
    }

    pub fn set_purchase_validation_url_prefix(&mut self, url: impl Into<String>) {
        self.purchase_validation_url_prefix = Some(url.into());
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn set_transaction_id(&mut self, transaction_id: impl Into<String>) {
        self.transaction_id = Some(transaction_id.into());
    }

    /// Signature of the most recent signed result.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn record_signature(&mut self, signature: impl Into<String>) {
        self.signature = Some(signature.into());
    }

    pub fn in_flight(&self) -> Option<&Transaction> {
        self.in_flight.as_ref()
    }

    /// Builds the adapter request for `transaction`, which becomes the
    /// in-flight one. A transaction still pending is replaced.
    pub fn begin(&mut self, transaction: Transaction) -> PurchaseRequest {
        let request = PurchaseRequest {
            sku: transaction.sku.clone(),
            transaction_id: transaction.transaction_id.clone(),
            validation_url_prefix: self.purchase_validation_url_prefix.clone(),
            access_token: self.access_token.clone(),
        };
        self.in_flight = Some(transaction);
        request
    }

    /// Resolves the in-flight transaction for `sku` and hands it back once
    /// terminal. Results for any other SKU leave the in-flight one alone.
    pub fn finish(&mut self, sku: &str, outcome: &PurchaseOutcome) -> Option<Transaction> {
        if self.in_flight.as_ref().is_none_or(|tx| tx.sku != sku) {
            return None;
        }
        let mut transaction = self.in_flight.take()?;
        if let Err(e) = transaction.resolve(outcome) {
            tracing::warn!(error = %e, "ignoring purchase result");
        }
        Some(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_carries_validation_parameters() {
        let mut registry = TransactionRegistry::new();
        registry.set_purchase_validation_url_prefix("https://verify.example.com/");
        registry.set_access_token("token");

        let request = registry.begin(Transaction::new("gold", "tx1"));
        assert_eq!(request.sku, "gold");
        assert_eq!(request.transaction_id, "tx1");
        assert_eq!(
            request.validation_url_prefix.as_deref(),
            Some("https://verify.example.com/")
        );
        assert_eq!(request.access_token.as_deref(), Some("token"));
        assert_eq!(registry.in_flight().unwrap().state, PurchaseState::Requested);
    }

    #[test]
    fn test_finish_resolves_matching_sku_only() {
        let mut registry = TransactionRegistry::new();
        registry.begin(Transaction::new("gold", "tx1"));

        assert!(registry.finish("gems", &PurchaseOutcome::Cancelled).is_none());
        assert!(registry.in_flight().is_some());

        let done = registry.finish("gold", &PurchaseOutcome::Cancelled).unwrap();
        assert_eq!(done.state, PurchaseState::Cancelled);
        assert!(registry.in_flight().is_none());
    }

    #[test]
    fn test_transaction_id_survives_completion() {
        let mut registry = TransactionRegistry::new();
        registry.set_transaction_id("tx1");
        registry.begin(Transaction::new("gold", "tx1"));
        registry.finish("gold", &PurchaseOutcome::AlreadyOwned);

        assert_eq!(registry.transaction_id(), Some("tx1"));
    }
}
