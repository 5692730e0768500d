use super::callback::CallbackChannel;
use super::confinement::{MainContext, Message, Request};
use crate::config::BillingConfig;
use crate::domain::catalog::{PendingQueries, SkuDetailCache};
use crate::domain::connection::ConnectionState;
use crate::domain::event::{AdapterEvent, CallbackId, HostEvent};
use crate::domain::ports::{BillingAdapterBox, BillingAdapterFactory, HostDispatcherBox};
use crate::domain::registry::TransactionRegistry;
use crate::domain::transaction::{ConsumeOutcome, PurchaseOutcome, Transaction};
use crate::error::{BillingError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type SharedRegistry = Arc<Mutex<TransactionRegistry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, TransactionRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host-facing entry point for in-app purchases.
///
/// Every call that reaches the billing service is confined to a single worker
/// task and returns immediately; its outcome arrives later as a named
/// [`HostEvent`] on the registered callback. Plain getters and setters are
/// answered synchronously from any thread.
pub struct PurchaseCoordinator {
    context: MainContext,
    callbacks: CallbackChannel,
    registry: SharedRegistry,
    connection: ConnectionState,
    worker: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

impl PurchaseCoordinator {
    /// Builds the adapter and starts the worker and delivery tasks.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle without [`shutdown`](Self::shutdown) still lets both tasks
    /// finish the queued work and stop.
    ///
    /// # Arguments
    ///
    /// * `config` - Initial auto-consume flag, registry values and callback registration.
    /// * `adapter` - Builds the billing adapter around the listener its results go to.
    /// * `host` - Receives every delivered event.
    pub fn spawn(
        config: &BillingConfig,
        adapter: BillingAdapterFactory,
        host: HostDispatcherBox,
    ) -> Self {
        let (callbacks, delivery) = CallbackChannel::spawn(host, config.callback_id);
        let (context, mailbox) = MainContext::new();

        let mut registry = TransactionRegistry::new();
        if let Some(url) = &config.purchase_validation_url_prefix {
            registry.set_purchase_validation_url_prefix(url.clone());
        }
        if let Some(token) = &config.access_token {
            registry.set_access_token(token.clone());
        }
        let registry = Arc::new(Mutex::new(registry));

        let adapter = adapter(context.listener());
        let connection = ConnectionState::new();
        connection.set(adapter.is_connected());

        let worker = Worker {
            adapter,
            cache: SkuDetailCache::new(),
            pending_queries: PendingQueries::new(),
            auto_consume: config.auto_consume,
            registry: registry.clone(),
            connection: connection.clone(),
            callbacks: callbacks.clone(),
            idle_waiters: Vec::new(),
        };
        let worker = tokio::spawn(worker.run(mailbox));

        Self {
            context,
            callbacks,
            registry,
            connection,
            worker,
            delivery,
        }
    }

    /// Starts a purchase flow for `sku`. `transaction_id` is kept as the last
    /// transaction id whatever the outcome.
    pub fn purchase(&self, sku: impl Into<String>, transaction_id: impl Into<String>) -> Result<()> {
        let transaction_id = transaction_id.into();
        lock(&self.registry).set_transaction_id(transaction_id.clone());
        self.context.confine(Request::Purchase {
            sku: sku.into(),
            transaction_id,
        })
    }

    pub fn consume(&self, sku: impl Into<String>) -> Result<()> {
        self.context.confine(Request::Consume { sku: sku.into() })
    }

    pub fn consume_unconsumed_purchases(&self) -> Result<()> {
        self.context.confine(Request::ConsumeUnconsumedPurchases)
    }

    /// Reports every previously purchased item through `has_purchased`.
    pub fn request_purchased(&self) -> Result<()> {
        self.context.confine(Request::RequestPurchased)
    }

    pub fn query_sku_details<I, S>(&self, skus: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let skus = skus.into_iter().map(Into::into).collect();
        self.context.confine(Request::QuerySkuDetails { skus })
    }

    /// Applies to purchases whose result is handled after this call.
    pub fn set_auto_consume(&self, auto_consume: bool) -> Result<()> {
        self.context.confine(Request::SetAutoConsume(auto_consume))
    }

    pub fn set_purchase_callback_id(&self, id: CallbackId) {
        self.callbacks.set_registration(id);
    }

    pub fn purchase_callback_id(&self) -> Option<CallbackId> {
        self.callbacks.registration()
    }

    pub fn set_purchase_validation_url_prefix(&self, url: impl Into<String>) {
        lock(&self.registry).set_purchase_validation_url_prefix(url);
    }

    pub fn purchase_validation_url_prefix(&self) -> Option<String> {
        lock(&self.registry)
            .purchase_validation_url_prefix()
            .map(str::to_string)
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        lock(&self.registry).set_access_token(token);
    }

    pub fn access_token(&self) -> Option<String> {
        lock(&self.registry).access_token().map(str::to_string)
    }

    pub fn set_transaction_id(&self, transaction_id: impl Into<String>) {
        lock(&self.registry).set_transaction_id(transaction_id);
    }

    pub fn transaction_id(&self) -> Option<String> {
        lock(&self.registry).transaction_id().map(str::to_string)
    }

    pub fn signature(&self) -> Option<String> {
        lock(&self.registry).signature().map(str::to_string)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Resolves once every queued request and adapter notification, including
    /// those they trigger in turn, has been handled.
    pub async fn wait_idle(&self) -> Result<()> {
        let (reply, idle) = oneshot::channel();
        self.context.confine(Request::Idle(reply))?;
        idle.await.map_err(|_| BillingError::CoordinatorClosed)
    }

    /// Releases the billing connection, stops the worker and waits until every
    /// pending event has been handed to the host.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            context,
            callbacks,
            worker,
            delivery,
            ..
        } = self;

        let sent = context.confine(Request::Shutdown);
        drop(callbacks);
        worker.await?;
        delivery.await?;
        sent
    }
}

/// State owned by the main context. Only the worker task touches it.
struct Worker {
    adapter: BillingAdapterBox,
    cache: SkuDetailCache,
    pending_queries: PendingQueries,
    auto_consume: bool,
    registry: SharedRegistry,
    connection: ConnectionState,
    callbacks: CallbackChannel,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl Worker {
    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Message>) {
        tracing::info!("purchase coordinator started");

        while let Some(message) = mailbox.recv().await {
            match message {
                Message::Request(Request::Shutdown) => break,
                Message::Request(Request::Idle(reply)) => self.idle_waiters.push(reply),
                Message::Request(request) => self.handle_request(request).await,
                Message::Adapter(event) => self.handle_adapter_event(event).await,
            }

            if mailbox.is_empty() {
                for reply in self.idle_waiters.drain(..) {
                    let _ = reply.send(());
                }
            }
        }

        self.settle(&mut mailbox).await;
        if let Err(e) = self.adapter.end_connection().await {
            tracing::warn!(error = %e, "failed to end billing connection");
        }

        // No new adapter work once the connection is released.
        self.auto_consume = false;
        mailbox.close();
        self.settle(&mut mailbox).await;

        tracing::info!("purchase coordinator stopped");
    }

    /// Handles adapter results already queued, including those they trigger.
    async fn settle(&mut self, mailbox: &mut mpsc::UnboundedReceiver<Message>) {
        while let Ok(message) = mailbox.try_recv() {
            match message {
                Message::Adapter(event) => self.handle_adapter_event(event).await,
                Message::Request(request) => {
                    tracing::debug!(?request, "dropping request received after shutdown")
                }
            }
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Purchase {
                sku,
                transaction_id,
            } => self.purchase(sku, transaction_id).await,
            Request::Consume { sku } => self.consume(sku).await,
            Request::ConsumeUnconsumedPurchases => {
                if let Err(e) = self.adapter.consume_unconsumed_purchases().await {
                    self.callbacks.deliver(HostEvent::ConsumeFail {
                        message: e.to_string(),
                    });
                }
            }
            Request::RequestPurchased => {
                if let Err(e) = self.adapter.request_purchased().await {
                    tracing::warn!(error = %e, "failed to enumerate purchased items");
                }
            }
            Request::QuerySkuDetails { skus } => self.query_sku_details(skus).await,
            Request::SetAutoConsume(auto_consume) => {
                tracing::debug!(auto_consume, "auto consume updated");
                self.auto_consume = auto_consume;
            }
            Request::Idle(_) | Request::Shutdown => {}
        }
    }

    async fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::PurchaseResult { sku, outcome } => {
                self.on_purchase_result(sku, outcome).await
            }
            AdapterEvent::ConsumeResult { sku, outcome } => match outcome {
                ConsumeOutcome::Success { ticket, signature } => {
                    self.signed_event(HostEvent::ConsumeSuccess {
                        ticket,
                        signature,
                        sku,
                    })
                }
                ConsumeOutcome::Failed { message } => {
                    tracing::debug!(%sku, %message, "consume failed");
                    self.callbacks.deliver(HostEvent::ConsumeFail { message })
                }
            },
            AdapterEvent::UnconsumedPurchaseConsumed {
                ticket,
                signature,
                sku,
            } => self.signed_event(HostEvent::ConsumeSuccess {
                ticket,
                signature,
                sku,
            }),
            AdapterEvent::NoUnconsumedPurchases => {
                self.callbacks.deliver(HostEvent::ConsumeNotRequired)
            }
            AdapterEvent::Purchased {
                receipt,
                signature,
                sku,
            } => self.signed_event(HostEvent::HasPurchased {
                receipt,
                signature,
                sku,
            }),
            AdapterEvent::SkuDetail(payload) => match self.cache.insert_payload(&payload) {
                Ok(true) => {}
                Ok(false) => tracing::debug!("product already cached, keeping first detail"),
                Err(e) => tracing::warn!(error = %e, "skipping catalog item"),
            },
            AdapterEvent::SkuDetailsComplete => {
                for _ in 0..self.pending_queries.settle_oldest() {
                    self.complete_sku_details();
                }
            }
            AdapterEvent::SkuDetailsFailed { message } => {
                for _ in 0..self.pending_queries.settle_oldest() {
                    self.callbacks.deliver(HostEvent::SkuDetailsError {
                        message: message.clone(),
                    });
                }
            }
            AdapterEvent::Connected => {
                self.connection.set(true);
                tracing::info!("billing service connected");
                self.callbacks.deliver(HostEvent::Connected);
            }
            AdapterEvent::Disconnected => {
                self.connection.set(false);
                tracing::info!("billing service disconnected");
                self.callbacks.deliver(HostEvent::Disconnected);
            }
        }
    }

    async fn purchase(&mut self, sku: String, transaction_id: String) {
        let request = lock(&self.registry).begin(Transaction::new(sku.clone(), transaction_id));
        tracing::info!(%sku, transaction_id = %request.transaction_id, "requesting purchase");

        if let Err(e) = self.adapter.request_purchase(&request).await {
            let outcome = PurchaseOutcome::Failed {
                message: e.to_string(),
            };
            self.on_purchase_result(sku, outcome).await;
        }
    }

    async fn on_purchase_result(&mut self, sku: String, outcome: PurchaseOutcome) {
        let finished = lock(&self.registry).finish(&sku, &outcome);
        match finished {
            Some(transaction) => tracing::info!(
                %sku,
                transaction_id = %transaction.transaction_id,
                state = ?transaction.state,
                "purchase finished"
            ),
            None => tracing::debug!(%sku, "purchase result without a matching in-flight transaction"),
        }

        match outcome {
            PurchaseOutcome::Success { ticket, signature } => {
                self.signed_event(HostEvent::PurchaseSuccess {
                    ticket,
                    signature,
                    sku: sku.clone(),
                });
                if self.auto_consume {
                    self.consume(sku).await;
                }
            }
            PurchaseOutcome::Failed { message } => {
                self.callbacks.deliver(HostEvent::PurchaseFail { message })
            }
            PurchaseOutcome::Cancelled => self.callbacks.deliver(HostEvent::PurchaseCancel),
            PurchaseOutcome::AlreadyOwned => {
                self.callbacks.deliver(HostEvent::PurchaseOwned { sku })
            }
        }
    }

    async fn consume(&mut self, sku: String) {
        tracing::debug!(%sku, "consuming purchase");
        if let Err(e) = self.adapter.consume(&sku).await {
            self.callbacks.deliver(HostEvent::ConsumeFail {
                message: e.to_string(),
            });
        }
    }

    async fn query_sku_details(&mut self, skus: Vec<String>) {
        let missing: Vec<String> = self
            .cache
            .missing(&skus)
            .into_iter()
            .filter(|sku| !self.pending_queries.contains(sku))
            .collect();

        if missing.is_empty() {
            let awaiting = skus.iter().any(|sku| self.pending_queries.contains(sku));
            if awaiting && self.pending_queries.follow_latest() {
                tracing::debug!("products already being fetched, waiting for that answer");
            } else {
                self.complete_sku_details();
            }
            return;
        }

        tracing::debug!(count = missing.len(), "querying product details");
        match self.adapter.query_sku_details(&missing).await {
            Ok(()) => self.pending_queries.start(missing),
            Err(e) => self.callbacks.deliver(HostEvent::SkuDetailsError {
                message: e.to_string(),
            }),
        }
    }

    fn complete_sku_details(&self) {
        self.callbacks.deliver(HostEvent::SkuDetailsComplete {
            details: self.cache.snapshot(),
        });
    }

    /// Remembers the signature carried by `event`, then delivers it.
    fn signed_event(&self, event: HostEvent) {
        if let HostEvent::PurchaseSuccess { signature, .. }
        | HostEvent::ConsumeSuccess { signature, .. }
        | HostEvent::HasPurchased { signature, .. } = &event
        {
            lock(&self.registry).record_signature(signature.clone());
        }
        self.callbacks.deliver(event);
    }
}
