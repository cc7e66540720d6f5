//! Network transport metrics.

use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Gauge, Registry};

pub static P2P_MESSAGES_RECEIVED: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "kestrel_p2p_messages_received_total",
            "Inbound wire messages, by frame type"
        ),
        &["frame_type"],
    )
    .expect("metric can be created")
});

pub static P2P_MESSAGES_SENT: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "kestrel_p2p_messages_sent_total",
        "Outbound wire messages sent",
    )
    .expect("metric can be created")
});

pub static P2P_BYTES_RECEIVED: Lazy<Counter> = Lazy::new(|| {
    Counter::new("kestrel_p2p_bytes_received_total", "Inbound payload bytes")
        .expect("metric can be created")
});

pub static P2P_BYTES_SENT: Lazy<Counter> = Lazy::new(|| {
    Counter::new("kestrel_p2p_bytes_sent_total", "Outbound payload bytes")
        .expect("metric can be created")
});

pub static P2P_PEERS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("kestrel_p2p_peers_connected", "Currently connected peers")
        .expect("metric can be created")
});

pub static P2P_CONNECTION_ERRORS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "kestrel_p2p_connection_errors_total",
        "Accept/connect failures",
    )
    .expect("metric can be created")
});

/// Register all network metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(P2P_MESSAGES_RECEIVED.clone()))
        .ok();
    registry.register(Box::new(P2P_MESSAGES_SENT.clone())).ok();
    registry.register(Box::new(P2P_BYTES_RECEIVED.clone())).ok();
    registry.register(Box::new(P2P_BYTES_SENT.clone())).ok();
    registry
        .register(Box::new(P2P_PEERS_CONNECTED.clone()))
        .ok();
    registry
        .register(Box::new(P2P_CONNECTION_ERRORS.clone()))
        .ok();
}
