use super::command::HostCommand;
use super::json::event_writer::EventWriter;
use crate::application::coordinator::PurchaseCoordinator;
use crate::error::Result;
use crate::infrastructure::in_memory::InMemoryPlayStore;
use serde_json::json;
use std::io::Write;

/// Replays host commands against a coordinator backed by the in-memory store.
///
/// Each command is allowed to settle before the next one runs, so simulated
/// store changes apply between commands rather than racing them.
pub struct Session<'a, W: Write> {
    coordinator: &'a PurchaseCoordinator,
    store: &'a InMemoryPlayStore,
    writer: &'a mut EventWriter<W>,
}

impl<'a, W: Write> Session<'a, W> {
    /// Creates a new `Session`.
    ///
    /// # Arguments
    ///
    /// * `coordinator` - Receives the host method calls.
    /// * `store` - Target of the simulation commands.
    /// * `writer` - Where synchronous results are recorded.
    pub fn new(
        coordinator: &'a PurchaseCoordinator,
        store: &'a InMemoryPlayStore,
        writer: &'a mut EventWriter<W>,
    ) -> Self {
        Self {
            coordinator,
            store,
            writer,
        }
    }

    pub async fn execute(&mut self, command: HostCommand) -> Result<()> {
        tracing::debug!(?command, "executing host command");
        let coordinator = self.coordinator;

        match command {
            HostCommand::Purchase {
                sku,
                transaction_id,
            } => coordinator.purchase(sku, transaction_id)?,
            HostCommand::Consume { sku } => coordinator.consume(sku)?,
            HostCommand::ConsumeUnconsumedPurchases => coordinator.consume_unconsumed_purchases()?,
            HostCommand::RequestPurchased => coordinator.request_purchased()?,
            HostCommand::QuerySkuDetails { skus } => coordinator.query_sku_details(skus)?,
            HostCommand::SetAutoConsume(auto_consume) => coordinator.set_auto_consume(auto_consume)?,
            HostCommand::SetPurchaseCallbackId(id) => coordinator.set_purchase_callback_id(id),
            HostCommand::GetPurchaseCallbackId => self
                .writer
                .write_result("getPurchaseCallbackId", json!(coordinator.purchase_callback_id()))?,
            HostCommand::SetPurchaseValidationUrlPrefix(url) => {
                coordinator.set_purchase_validation_url_prefix(url)
            }
            HostCommand::GetPurchaseValidationUrlPrefix => self.writer.write_result(
                "getPurchaseValidationUrlPrefix",
                json!(coordinator.purchase_validation_url_prefix()),
            )?,
            HostCommand::SetAccessToken(token) => coordinator.set_access_token(token),
            HostCommand::GetAccessToken => self
                .writer
                .write_result("getAccessToken", json!(coordinator.access_token()))?,
            HostCommand::SetTransactionId(transaction_id) => {
                coordinator.set_transaction_id(transaction_id)
            }
            HostCommand::GetTransactionId => self
                .writer
                .write_result("getTransactionId", json!(coordinator.transaction_id()))?,
            HostCommand::GetSignature => self
                .writer
                .write_result("getSignature", json!(coordinator.signature()))?,
            HostCommand::IsConnected => self
                .writer
                .write_result("isConnected", json!(coordinator.is_connected()))?,
            HostCommand::SimulateOutcome { sku, outcome } => self.store.script_outcome(sku, outcome),
            HostCommand::SimulateGrant { sku } => self.store.grant(&sku),
            HostCommand::SimulateDisconnect => self.store.set_connected(false),
            HostCommand::SimulateReconnect => self.store.set_connected(true),
        }

        coordinator.wait_idle().await
    }
}
