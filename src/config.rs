use crate::domain::event::CallbackId;
use std::env;

/// Startup settings for the purchase coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingConfig {
    /// Consume a purchase right after it succeeds.
    pub auto_consume: bool,
    pub purchase_validation_url_prefix: Option<String>,
    pub access_token: Option<String>,
    /// Registration in place before the host sets one.
    pub callback_id: Option<CallbackId>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            auto_consume: true,
            purchase_validation_url_prefix: None,
            access_token: None,
            callback_id: None,
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let auto_consume = match lookup("IAP_AUTO_CONSUME") {
            Some(value) => !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "false" | "0" | "no" | "off"
            ),
            None => true,
        };

        let callback_id = lookup("IAP_CALLBACK_ID").and_then(|raw| match raw.trim().parse() {
            Ok(id) => Some(CallbackId(id)),
            Err(_) => {
                tracing::warn!(value = %raw, "ignoring unparsable IAP_CALLBACK_ID");
                None
            }
        });

        Self {
            auto_consume,
            purchase_validation_url_prefix: lookup("IAP_VALIDATION_URL_PREFIX"),
            access_token: lookup("IAP_ACCESS_TOKEN"),
            callback_id,
        }
    }
}
