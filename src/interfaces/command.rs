use crate::domain::event::CallbackId;
use crate::error::{BillingError, Result};
use crate::infrastructure::in_memory::ScriptedOutcome;
use serde::Deserialize;

/// One host method call, named the way the host runtime names it.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Purchase { sku: String, transaction_id: String },
    Consume { sku: String },
    ConsumeUnconsumedPurchases,
    RequestPurchased,
    QuerySkuDetails { skus: Vec<String> },
    SetAutoConsume(bool),
    SetPurchaseCallbackId(CallbackId),
    GetPurchaseCallbackId,
    SetPurchaseValidationUrlPrefix(String),
    GetPurchaseValidationUrlPrefix,
    SetAccessToken(String),
    GetAccessToken,
    SetTransactionId(String),
    GetTransactionId,
    GetSignature,
    IsConnected,
    /// Forces the next purchase of `sku` to end with `outcome`.
    SimulateOutcome { sku: String, outcome: ScriptedOutcome },
    /// Records an unconsumed purchase made before the session started.
    SimulateGrant { sku: String },
    SimulateDisconnect,
    SimulateReconnect,
}

/// Raw script line: `command, arg, extra`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptRow {
    pub command: String,
    pub arg: Option<String>,
    pub extra: Option<String>,
}

fn required(value: Option<String>, command: &str, what: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BillingError::InvalidCommand(format!("{command} requires {what}")))
}

impl TryFrom<ScriptRow> for HostCommand {
    type Error = BillingError;

    fn try_from(row: ScriptRow) -> Result<Self> {
        let ScriptRow {
            command,
            arg,
            extra,
        } = row;

        let parsed = match command.as_str() {
            "purchase" => HostCommand::Purchase {
                sku: required(arg, &command, "a sku")?,
                transaction_id: required(extra, &command, "a transaction id")?,
            },
            "consume" => HostCommand::Consume {
                sku: required(arg, &command, "a sku")?,
            },
            "consumeUnconsumedPurchases" => HostCommand::ConsumeUnconsumedPurchases,
            "requestPurchased" => HostCommand::RequestPurchased,
            "querySkuDetails" => HostCommand::QuerySkuDetails {
                skus: required(arg, &command, "product ids")?
                    .split('|')
                    .map(str::trim)
                    .filter(|sku| !sku.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            "setAutoConsume" => {
                let raw = required(arg, &command, "true or false")?;
                let value = raw.parse().map_err(|_| {
                    BillingError::InvalidCommand(format!("{command}: '{raw}' is not a boolean"))
                })?;
                HostCommand::SetAutoConsume(value)
            }
            "setPurchaseCallbackId" => {
                let raw = required(arg, &command, "a callback id")?;
                let id = raw.parse().map_err(|_| {
                    BillingError::InvalidCommand(format!("{command}: '{raw}' is not an integer"))
                })?;
                HostCommand::SetPurchaseCallbackId(CallbackId(id))
            }
            "getPurchaseCallbackId" => HostCommand::GetPurchaseCallbackId,
            "setPurchaseValidationUrlPrefix" => {
                HostCommand::SetPurchaseValidationUrlPrefix(required(arg, &command, "a url")?)
            }
            "getPurchaseValidationUrlPrefix" => HostCommand::GetPurchaseValidationUrlPrefix,
            "setAccessToken" => HostCommand::SetAccessToken(required(arg, &command, "a token")?),
            "getAccessToken" => HostCommand::GetAccessToken,
            "setTransactionId" => {
                HostCommand::SetTransactionId(required(arg, &command, "a transaction id")?)
            }
            "getTransactionId" => HostCommand::GetTransactionId,
            "getSignature" => HostCommand::GetSignature,
            "isConnected" => HostCommand::IsConnected,
            "simulateOutcome" => HostCommand::SimulateOutcome {
                sku: required(arg, &command, "a sku")?,
                outcome: required(extra, &command, "an outcome")?.parse()?,
            },
            "simulateGrant" => HostCommand::SimulateGrant {
                sku: required(arg, &command, "a sku")?,
            },
            "simulateDisconnect" => HostCommand::SimulateDisconnect,
            "simulateReconnect" => HostCommand::SimulateReconnect,
            other => {
                return Err(BillingError::InvalidCommand(format!(
                    "unknown command '{other}'"
                )));
            }
        };
        Ok(parsed)
    }
}
