#![allow(dead_code)]

use iap_bridge::application::coordinator::PurchaseCoordinator;
use iap_bridge::config::BillingConfig;
use iap_bridge::domain::event::{CallbackId, DeliveredEvent, HostEvent};
use iap_bridge::infrastructure::in_memory::{ChannelHost, InMemoryPlayStore};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub const CALLBACK: CallbackId = CallbackId(1);

pub struct Harness {
    pub store: InMemoryPlayStore,
    pub coordinator: PurchaseCoordinator,
    pub events: UnboundedReceiver<DeliveredEvent>,
}

/// Catalog payload in the shape the billing service reports it.
pub fn catalog_payload(sku: &str, micros: i64) -> String {
    serde_json::json!({
        "type": "inapp",
        "productId": sku,
        "title": format!("{sku} pack"),
        "description": format!("A pack of {sku}"),
        "price": format!("${}", micros as f64 / 1_000_000.0),
        "price_currency_code": "USD",
        "price_amount_micros": micros,
    })
    .to_string()
}

pub fn start(store: InMemoryPlayStore) -> Harness {
    start_with(
        store,
        BillingConfig {
            callback_id: Some(CALLBACK),
            ..BillingConfig::default()
        },
    )
}

pub fn start_with(store: InMemoryPlayStore, config: BillingConfig) -> Harness {
    let (host, events) = ChannelHost::new();
    let coordinator = PurchaseCoordinator::spawn(&config, store.adapter_factory(), Box::new(host));
    Harness {
        store,
        coordinator,
        events,
    }
}

/// Shuts the coordinator down and returns every event the host received.
pub async fn finish_all(harness: Harness) -> Vec<HostEvent> {
    let Harness {
        coordinator,
        mut events,
        ..
    } = harness;
    coordinator.shutdown().await.unwrap();

    let mut received = Vec::new();
    while let Some(delivered) = events.recv().await {
        assert_eq!(delivered.target, CALLBACK);
        received.push(delivered.event);
    }
    received
}

/// Same as [`finish_all`], minus the connection notices.
pub async fn finish(harness: Harness) -> Vec<HostEvent> {
    finish_all(harness)
        .await
        .into_iter()
        .filter(|event| !matches!(event, HostEvent::Connected | HostEvent::Disconnected))
        .collect()
}

/// Waits for the next event that matches `wanted`, skipping the others.
pub async fn next_matching<F>(events: &mut UnboundedReceiver<DeliveredEvent>, wanted: F) -> HostEvent
where
    F: Fn(&HostEvent) -> bool,
{
    loop {
        let delivered = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if wanted(&delivered.event) {
            return delivered.event;
        }
    }
}

pub fn names(events: &[HostEvent]) -> Vec<&'static str> {
    events.iter().map(HostEvent::name).collect()
}
