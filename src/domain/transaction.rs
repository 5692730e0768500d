use crate::error::{BillingError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    #[default]
    Requested,
    Succeeded,
    Failed,
    Cancelled,
    AlreadyOwned,
}

impl PurchaseState {
    pub fn is_terminal(self) -> bool {
        self != PurchaseState::Requested
    }
}

/// Result of a purchase flow as reported by the billing service.
#[derive(Debug, PartialEq, Clone)]
pub enum PurchaseOutcome {
    Success { ticket: String, signature: String },
    Failed { message: String },
    Cancelled,
    AlreadyOwned,
}

impl PurchaseOutcome {
    pub fn state(&self) -> PurchaseState {
        match self {
            PurchaseOutcome::Success { .. } => PurchaseState::Succeeded,
            PurchaseOutcome::Failed { .. } => PurchaseState::Failed,
            PurchaseOutcome::Cancelled => PurchaseState::Cancelled,
            PurchaseOutcome::AlreadyOwned => PurchaseState::AlreadyOwned,
        }
    }
}

/// Result of consuming a single purchase.
#[derive(Debug, PartialEq, Clone)]
pub enum ConsumeOutcome {
    Success { ticket: String, signature: String },
    Failed { message: String },
}

/// Everything the billing service needs to start a purchase flow.
#[derive(Debug, PartialEq, Clone)]
pub struct PurchaseRequest {
    pub sku: String,
    /// Host-supplied correlation string, opaque to this crate.
    pub transaction_id: String,
    pub validation_url_prefix: Option<String>,
    pub access_token: Option<String>,
}

/// One purchase attempt. Moves from `Requested` to exactly one terminal state.
#[derive(Debug, PartialEq, Clone)]
pub struct Transaction {
    pub sku: String,
    pub transaction_id: String,
    pub state: PurchaseState,
}

impl Transaction {
    pub fn new(sku: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            transaction_id: transaction_id.into(),
            state: PurchaseState::Requested,
        }
    }

    pub fn resolve(&mut self, outcome: &PurchaseOutcome) -> Result<()> {
        if self.state.is_terminal() {
            return Err(BillingError::IllegalTransition(format!(
                "transaction {} for {} already {:?}",
                self.transaction_id, self.sku, self.state
            )));
        }
        self.state = outcome.state();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_is_requested() {
        let tx = Transaction::new("gold", "tx1");
        assert_eq!(tx.state, PurchaseState::Requested);
        assert!(!tx.state.is_terminal());
    }

    #[test]
    fn test_resolve_reaches_terminal_state() {
        let mut tx = Transaction::new("gold", "tx1");
        tx.resolve(&PurchaseOutcome::Cancelled).unwrap();
        assert_eq!(tx.state, PurchaseState::Cancelled);
        assert!(tx.state.is_terminal());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut tx = Transaction::new("gold", "tx1");
        tx.resolve(&PurchaseOutcome::Success {
            ticket: "t".to_string(),
            signature: "s".to_string(),
        })
        .unwrap();

        let second = tx.resolve(&PurchaseOutcome::Failed {
            message: "late".to_string(),
        });
        assert!(matches!(second, Err(BillingError::IllegalTransition(_))));
        assert_eq!(tx.state, PurchaseState::Succeeded);
    }

    #[test]
    fn test_outcome_state_mapping() {
        assert_eq!(PurchaseOutcome::AlreadyOwned.state(), PurchaseState::AlreadyOwned);
        assert_eq!(
            PurchaseOutcome::Failed {
                message: String::new()
            }
            .state(),
            PurchaseState::Failed
        );
    }
}
