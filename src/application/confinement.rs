use crate::domain::event::AdapterEvent;
use crate::domain::ports::AdapterListener;
use crate::error::{BillingError, Result};
use tokio::sync::{mpsc, oneshot};

/// Host request, executed on the coordinator worker.
#[derive(Debug)]
pub enum Request {
    Purchase { sku: String, transaction_id: String },
    Consume { sku: String },
    ConsumeUnconsumedPurchases,
    RequestPurchased,
    QuerySkuDetails { skus: Vec<String> },
    SetAutoConsume(bool),
    /// Answered once the worker finds its mailbox empty.
    Idle(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Debug)]
pub(crate) enum Message {
    Request(Request),
    Adapter(AdapterEvent),
}

/// Handle to the single execution context that owns the billing adapter.
///
/// Host requests and adapter notifications share one FIFO mailbox, so the
/// worker sees them one at a time in arrival order, whatever thread sent them.
#[derive(Clone)]
pub struct MainContext {
    mailbox: mpsc::UnboundedSender<Message>,
}

impl MainContext {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (mailbox, receiver) = mpsc::unbounded_channel();
        (Self { mailbox }, receiver)
    }

    /// Schedules `request` onto the worker. Never blocks.
    pub fn confine(&self, request: Request) -> Result<()> {
        self.mailbox
            .send(Message::Request(request))
            .map_err(|_| BillingError::CoordinatorClosed)
    }

    /// Listener whose notifications are marshalled onto the worker.
    ///
    /// Holds the mailbox weakly: once every `MainContext` is gone the worker
    /// drains its queue and stops, even if the adapter outlives it.
    pub fn listener(&self) -> AdapterListener {
        let mailbox = self.mailbox.downgrade();
        AdapterListener::new(move |event| {
            mailbox
                .upgrade()
                .is_some_and(|mailbox| mailbox.send(Message::Adapter(event)).is_ok())
        })
    }
}
