use super::catalog::SkuDetail;
use super::transaction::{ConsumeOutcome, PurchaseOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque host-side routing target for every asynchronous result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub i64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named event delivered to the host. Names and argument order are the
/// contract hosts dispatch on.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    PurchaseSuccess {
        ticket: String,
        signature: String,
        sku: String,
    },
    PurchaseFail {
        message: String,
    },
    PurchaseCancel,
    PurchaseOwned {
        sku: String,
    },
    ConsumeSuccess {
        ticket: String,
        signature: String,
        sku: String,
    },
    ConsumeFail {
        message: String,
    },
    ConsumeNotRequired,
    HasPurchased {
        receipt: String,
        signature: String,
        sku: String,
    },
    SkuDetailsComplete {
        details: BTreeMap<String, SkuDetail>,
    },
    SkuDetailsError {
        message: String,
    },
    Connected,
    Disconnected,
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::PurchaseSuccess { .. } => "purchase_success",
            HostEvent::PurchaseFail { .. } => "purchase_fail",
            HostEvent::PurchaseCancel => "purchase_cancel",
            HostEvent::PurchaseOwned { .. } => "purchase_owned",
            HostEvent::ConsumeSuccess { .. } => "consume_success",
            HostEvent::ConsumeFail { .. } => "consume_fail",
            HostEvent::ConsumeNotRequired => "consume_not_required",
            HostEvent::HasPurchased { .. } => "has_purchased",
            HostEvent::SkuDetailsComplete { .. } => "sku_details_complete",
            HostEvent::SkuDetailsError { .. } => "sku_details_error",
            HostEvent::Connected => "iap_connected",
            HostEvent::Disconnected => "iap_disconnected",
        }
    }

    /// Positional arguments, in the order the host handler receives them.
    pub fn args(&self) -> serde_json::Result<Vec<Value>> {
        let args = match self {
            HostEvent::PurchaseSuccess {
                ticket,
                signature,
                sku,
            }
            | HostEvent::ConsumeSuccess {
                ticket,
                signature,
                sku,
            } => vec![json!(ticket), json!(signature), json!(sku)],
            HostEvent::HasPurchased {
                receipt,
                signature,
                sku,
            } => vec![json!(receipt), json!(signature), json!(sku)],
            HostEvent::PurchaseFail { message }
            | HostEvent::ConsumeFail { message }
            | HostEvent::SkuDetailsError { message } => vec![json!(message)],
            HostEvent::PurchaseOwned { sku } => vec![json!(sku)],
            HostEvent::SkuDetailsComplete { details } => vec![serde_json::to_value(details)?],
            HostEvent::PurchaseCancel
            | HostEvent::ConsumeNotRequired
            | HostEvent::Connected
            | HostEvent::Disconnected => Vec::new(),
        };
        Ok(args)
    }
}

/// An event together with the registration it was addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredEvent {
    pub target: CallbackId,
    pub event: HostEvent,
}

/// Notification from the billing service, handled on the coordinator worker.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    PurchaseResult {
        sku: String,
        outcome: PurchaseOutcome,
    },
    ConsumeResult {
        sku: String,
        outcome: ConsumeOutcome,
    },
    /// One item consumed while clearing outstanding purchases.
    UnconsumedPurchaseConsumed {
        ticket: String,
        signature: String,
        sku: String,
    },
    NoUnconsumedPurchases,
    /// One owned item found while enumerating previous purchases.
    Purchased {
        receipt: String,
        signature: String,
        sku: String,
    },
    /// Raw catalog payload for a single product.
    SkuDetail(String),
    SkuDetailsComplete,
    SkuDetailsFailed {
        message: String,
    },
    Connected,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        let names: Vec<&str> = [
            HostEvent::PurchaseCancel,
            HostEvent::ConsumeNotRequired,
            HostEvent::Connected,
            HostEvent::Disconnected,
            HostEvent::PurchaseOwned {
                sku: "gold".to_string(),
            },
        ]
        .iter()
        .map(HostEvent::name)
        .collect();

        assert_eq!(
            names,
            vec![
                "purchase_cancel",
                "consume_not_required",
                "iap_connected",
                "iap_disconnected",
                "purchase_owned"
            ]
        );
    }

    #[test]
    fn test_success_argument_order() {
        let event = HostEvent::PurchaseSuccess {
            ticket: "ticket".to_string(),
            signature: "sig".to_string(),
            sku: "gold".to_string(),
        };
        assert_eq!(
            event.args().unwrap(),
            vec![json!("ticket"), json!("sig"), json!("gold")]
        );
    }

    #[test]
    fn test_argumentless_events() {
        assert!(HostEvent::PurchaseCancel.args().unwrap().is_empty());
        assert!(HostEvent::ConsumeNotRequired.args().unwrap().is_empty());
    }

    #[test]
    fn test_sku_details_complete_is_single_mapping() {
        let detail = SkuDetail::from_payload(r#"{"productId":"gold","price":"$1"}"#).unwrap();
        let event = HostEvent::SkuDetailsComplete {
            details: BTreeMap::from([("gold".to_string(), detail)]),
        };

        let args = event.args().unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0]["gold"]["price"], "$1");
    }
}
