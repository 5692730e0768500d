use crate::domain::event::{CallbackId, DeliveredEvent, HostEvent};
use crate::domain::ports::HostDispatcherBox;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Routes every asynchronous result to the host's registered callback.
///
/// Delivery is deferred: `deliver` only enqueues, and a dedicated task hands
/// events to the host in the order they were enqueued. Events raised while no
/// registration is set are dropped.
#[derive(Clone)]
pub struct CallbackChannel {
    registration: Arc<Mutex<Option<CallbackId>>>,
    outbox: mpsc::UnboundedSender<DeliveredEvent>,
}

impl CallbackChannel {
    /// Starts the delivery task. It ends once every clone of the channel is
    /// dropped and the queue is drained.
    pub fn spawn(host: HostDispatcherBox, registration: Option<CallbackId>) -> (Self, JoinHandle<()>) {
        let (outbox, mut queue) = mpsc::unbounded_channel::<DeliveredEvent>();
        let handle = tokio::spawn(async move {
            while let Some(delivered) = queue.recv().await {
                host.dispatch(delivered.target, delivered.event);
            }
        });

        let channel = Self {
            registration: Arc::new(Mutex::new(registration)),
            outbox,
        };
        (channel, handle)
    }

    /// Overwrites the routing target.
    pub fn set_registration(&self, id: CallbackId) {
        *self.registration.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    pub fn registration(&self) -> Option<CallbackId> {
        *self.registration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deliver(&self, event: HostEvent) {
        let Some(target) = self.registration() else {
            tracing::debug!(event = event.name(), "no callback registration, dropping event");
            return;
        };

        tracing::debug!(event = event.name(), %target, "delivering event");
        if self.outbox.send(DeliveredEvent { target, event }).is_err() {
            tracing::debug!("delivery task stopped, dropping event");
        }
    }
}
