use super::event::{AdapterEvent, CallbackId, HostEvent};
use super::transaction::PurchaseRequest;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Platform billing service.
///
/// Every method only starts an operation; outcomes are reported later through
/// the [`AdapterListener`] the adapter was built with. An `Err` means the
/// operation could not be started at all. The adapter is owned by a single
/// worker and never called concurrently.
#[async_trait]
pub trait BillingAdapter: Send {
    async fn request_purchase(&mut self, request: &PurchaseRequest) -> Result<()>;
    async fn consume(&mut self, sku: &str) -> Result<()>;
    async fn consume_unconsumed_purchases(&mut self) -> Result<()>;
    async fn request_purchased(&mut self) -> Result<()>;
    async fn query_sku_details(&mut self, skus: &[String]) -> Result<()>;
    fn is_connected(&self) -> bool;
    /// Releases the service connection when the coordinator shuts down.
    async fn end_connection(&mut self) -> Result<()>;
}

pub type BillingAdapterBox = Box<dyn BillingAdapter>;

/// Builds the adapter once the coordinator knows where results must go.
pub type BillingAdapterFactory = Box<dyn FnOnce(AdapterListener) -> BillingAdapterBox + Send>;

/// Host runtime entry point: invoke the handler registered under `target`.
pub trait HostDispatcher: Send + Sync {
    fn dispatch(&self, target: CallbackId, event: HostEvent);
}

pub type HostDispatcherBox = Box<dyn HostDispatcher>;

/// Result channel handed to the billing adapter.
#[derive(Clone)]
pub struct AdapterListener {
    sink: Arc<dyn Fn(AdapterEvent) -> bool + Send + Sync>,
}

impl AdapterListener {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(AdapterEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Reports an event. Returns `false` once nobody is listening anymore.
    pub fn notify(&self, event: AdapterEvent) -> bool {
        (self.sink)(event)
    }
}

impl fmt::Debug for AdapterListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterListener").finish_non_exhaustive()
    }
}
