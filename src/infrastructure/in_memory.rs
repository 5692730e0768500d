use crate::domain::catalog::SkuDetail;
use crate::domain::event::{AdapterEvent, CallbackId, DeliveredEvent, HostEvent};
use crate::domain::ports::{
    AdapterListener, BillingAdapter, BillingAdapterBox, BillingAdapterFactory, HostDispatcher,
};
use crate::domain::transaction::{ConsumeOutcome, PurchaseOutcome, PurchaseRequest};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Every call the billing adapter received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCall {
    RequestPurchase(PurchaseRequest),
    Consume(String),
    ConsumeUnconsumedPurchases,
    RequestPurchased,
    QuerySkuDetails(Vec<String>),
    EndConnection,
}

/// Forced result for the next purchase of a SKU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Cancel,
    Fail,
    Owned,
}

impl FromStr for ScriptedOutcome {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cancel" => Ok(Self::Cancel),
            "fail" => Ok(Self::Fail),
            "owned" => Ok(Self::Owned),
            other => Err(BillingError::InvalidCommand(format!(
                "unknown purchase outcome '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct PurchaseRecord {
    sku: String,
    ticket: String,
    signature: String,
    consumed: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    catalog: BTreeMap<String, String>,
    purchases: Vec<PurchaseRecord>,
    scripted: HashMap<String, ScriptedOutcome>,
    failing_queries: Option<String>,
    calls: Vec<AdapterCall>,
    connected: bool,
    /// Attached adapters, keyed by attachment number.
    listeners: Vec<(u64, AdapterListener)>,
    next_listener: u64,
    next_order: u64,
}

impl StoreState {
    fn record_purchase(&mut self, sku: &str) -> PurchaseRecord {
        self.next_order += 1;
        let record = PurchaseRecord {
            sku: sku.to_string(),
            ticket: format!("{sku}.token.{}", self.next_order),
            signature: format!("signature.{}", self.next_order),
            consumed: false,
        };
        self.purchases.push(record.clone());
        record
    }
}

/// A thread-safe simulated billing service.
///
/// Clones share the same catalog, purchase history and call log, so a test can
/// keep one clone while the adapter built from another drives the coordinator.
#[derive(Debug, Clone)]
pub struct InMemoryPlayStore {
    state: Arc<Mutex<StoreState>>,
}

impl Default for InMemoryPlayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlayStore {
    /// Creates an empty, connected store.
    pub fn new() -> Self {
        let state = StoreState {
            connected: true,
            ..StoreState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a catalog item, keyed by the payload's product id.
    pub fn add_product(&self, payload: impl Into<String>) -> Result<()> {
        let payload = payload.into();
        let detail = SkuDetail::from_payload(&payload)?;
        self.add_raw_product(detail.product_id, payload);
        Ok(())
    }

    /// Adds a payload as-is, even one the coordinator will fail to parse.
    pub fn add_raw_product(&self, product_id: impl Into<String>, payload: impl Into<String>) {
        self.state().catalog.insert(product_id.into(), payload.into());
    }

    /// Loads a JSON array of catalog items. Returns how many were added.
    pub fn load_catalog(&self, json: &str) -> Result<usize> {
        let items: Vec<serde_json::Value> = serde_json::from_str(json)?;
        for item in &items {
            self.add_product(item.to_string())?;
        }
        Ok(items.len())
    }

    /// Records an unconsumed purchase made outside this session.
    pub fn grant(&self, sku: &str) {
        self.state().record_purchase(sku);
    }

    pub fn script_outcome(&self, sku: impl Into<String>, outcome: ScriptedOutcome) {
        self.state().scripted.insert(sku.into(), outcome);
    }

    /// Makes every later detail query fail with `message`.
    pub fn fail_queries(&self, message: impl Into<String>) {
        self.state().failing_queries = Some(message.into());
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.state().calls.clone()
    }

    pub fn unconsumed(&self) -> Vec<String> {
        self.state()
            .purchases
            .iter()
            .filter(|p| !p.consumed)
            .map(|p| p.sku.clone())
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Number of adapters still attached.
    pub fn attached(&self) -> usize {
        self.state().listeners.len()
    }

    /// Simulates the service connection going up or down. Attached adapters
    /// report the change when it actually flips.
    pub fn set_connected(&self, connected: bool) {
        let listeners = {
            let mut state = self.state();
            if state.connected == connected {
                return;
            }
            state.connected = connected;
            state.listeners.clone()
        };

        let event = if connected {
            AdapterEvent::Connected
        } else {
            AdapterEvent::Disconnected
        };
        for (_, listener) in listeners {
            listener.notify(event.clone());
        }
    }

    pub fn adapter_factory(&self) -> BillingAdapterFactory {
        let store = self.clone();
        Box::new(move |listener| {
            Box::new(InMemoryBillingAdapter::new(store, listener)) as BillingAdapterBox
        })
    }
}

/// Billing adapter backed by an [`InMemoryPlayStore`].
///
/// Results are reported through the listener while the call is still running,
/// the same way a platform SDK posts them back to the main thread.
pub struct InMemoryBillingAdapter {
    store: InMemoryPlayStore,
    listener: AdapterListener,
    listener_id: u64,
}

impl InMemoryBillingAdapter {
    /// Attaches to `store` and reports the initial connection.
    pub fn new(store: InMemoryPlayStore, listener: AdapterListener) -> Self {
        let (listener_id, connected) = {
            let mut state = store.state();
            state.next_listener += 1;
            let id = state.next_listener;
            state.listeners.push((id, listener.clone()));
            (id, state.connected)
        };
        if connected {
            listener.notify(AdapterEvent::Connected);
        }
        Self {
            store,
            listener,
            listener_id,
        }
    }

    /// Logs the call and fails when the service is unreachable.
    fn begin(&self, call: AdapterCall) -> Result<MutexGuard<'_, StoreState>> {
        let mut state = self.store.state();
        state.calls.push(call);
        if !state.connected {
            return Err(BillingError::Disconnected);
        }
        Ok(state)
    }

    fn notify_all(&self, events: Vec<AdapterEvent>) {
        for event in events {
            self.listener.notify(event);
        }
    }
}

#[async_trait]
impl BillingAdapter for InMemoryBillingAdapter {
    async fn request_purchase(&mut self, request: &PurchaseRequest) -> Result<()> {
        let sku = request.sku.clone();
        let outcome = {
            let mut state = self.begin(AdapterCall::RequestPurchase(request.clone()))?;
            let owned = state.purchases.iter().any(|p| p.sku == sku && !p.consumed);

            match state.scripted.remove(&sku) {
                Some(ScriptedOutcome::Cancel) => PurchaseOutcome::Cancelled,
                Some(ScriptedOutcome::Fail) => PurchaseOutcome::Failed {
                    message: "payment declined".to_string(),
                },
                Some(ScriptedOutcome::Owned) => PurchaseOutcome::AlreadyOwned,
                None if owned => PurchaseOutcome::AlreadyOwned,
                None if !state.catalog.contains_key(&sku) => PurchaseOutcome::Failed {
                    message: format!("item unavailable: {sku}"),
                },
                None => {
                    let record = state.record_purchase(&sku);
                    PurchaseOutcome::Success {
                        ticket: record.ticket,
                        signature: record.signature,
                    }
                }
            }
        };

        self.listener.notify(AdapterEvent::PurchaseResult { sku, outcome });
        Ok(())
    }

    async fn consume(&mut self, sku: &str) -> Result<()> {
        let outcome = {
            let mut state = self.begin(AdapterCall::Consume(sku.to_string()))?;
            match state
                .purchases
                .iter_mut()
                .find(|p| p.sku == sku && !p.consumed)
            {
                Some(record) => {
                    record.consumed = true;
                    ConsumeOutcome::Success {
                        ticket: record.ticket.clone(),
                        signature: record.signature.clone(),
                    }
                }
                None => ConsumeOutcome::Failed {
                    message: format!("item not owned: {sku}"),
                },
            }
        };

        self.listener.notify(AdapterEvent::ConsumeResult {
            sku: sku.to_string(),
            outcome,
        });
        Ok(())
    }

    async fn consume_unconsumed_purchases(&mut self) -> Result<()> {
        let events = {
            let mut state = self.begin(AdapterCall::ConsumeUnconsumedPurchases)?;
            let consumed: Vec<AdapterEvent> = state
                .purchases
                .iter_mut()
                .filter(|p| !p.consumed)
                .map(|record| {
                    record.consumed = true;
                    AdapterEvent::UnconsumedPurchaseConsumed {
                        ticket: record.ticket.clone(),
                        signature: record.signature.clone(),
                        sku: record.sku.clone(),
                    }
                })
                .collect();

            if consumed.is_empty() {
                vec![AdapterEvent::NoUnconsumedPurchases]
            } else {
                consumed
            }
        };

        self.notify_all(events);
        Ok(())
    }

    async fn request_purchased(&mut self) -> Result<()> {
        let events = {
            let state = self.begin(AdapterCall::RequestPurchased)?;
            state
                .purchases
                .iter()
                .map(|record| AdapterEvent::Purchased {
                    receipt: record.ticket.clone(),
                    signature: record.signature.clone(),
                    sku: record.sku.clone(),
                })
                .collect()
        };

        self.notify_all(events);
        Ok(())
    }

    async fn query_sku_details(&mut self, skus: &[String]) -> Result<()> {
        let events = {
            let state = self.begin(AdapterCall::QuerySkuDetails(skus.to_vec()))?;
            match &state.failing_queries {
                Some(message) => vec![AdapterEvent::SkuDetailsFailed {
                    message: message.clone(),
                }],
                None => {
                    let mut events: Vec<AdapterEvent> = skus
                        .iter()
                        .filter_map(|sku| state.catalog.get(sku))
                        .map(|payload| AdapterEvent::SkuDetail(payload.clone()))
                        .collect();
                    events.push(AdapterEvent::SkuDetailsComplete);
                    events
                }
            }
        };

        self.notify_all(events);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    async fn end_connection(&mut self) -> Result<()> {
        let was_connected = {
            let mut state = self.store.state();
            state.calls.push(AdapterCall::EndConnection);
            state.listeners.retain(|(id, _)| *id != self.listener_id);
            std::mem::replace(&mut state.connected, false)
        };

        if was_connected {
            self.listener.notify(AdapterEvent::Disconnected);
        }
        Ok(())
    }
}

/// Host runtime stand-in: forwards every delivered event to a channel.
#[derive(Debug, Clone)]
pub struct ChannelHost {
    events: mpsc::UnboundedSender<DeliveredEvent>,
}

impl ChannelHost {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeliveredEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { events }, receiver)
    }
}

impl HostDispatcher for ChannelHost {
    fn dispatch(&self, target: CallbackId, event: HostEvent) {
        if self.events.send(DeliveredEvent { target, event }).is_err() {
            tracing::debug!("host receiver dropped, discarding event");
        }
    }
}
