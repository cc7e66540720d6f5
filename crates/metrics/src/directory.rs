//! Directory-service metrics.

use once_cell::sync::Lazy;
use prometheus::{CounterVec, Gauge, GaugeVec, Registry};

pub static POW_SUBMISSIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "kestrel_ds_pow_submissions_total",
            "PoW submissions processed, by outcome"
        ),
        // "accepted", "late", "rejected"
        &["outcome"],
    )
    .expect("metric can be created")
});

pub static POW_REJECTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "kestrel_ds_pow_rejections_total",
            "PoW submissions rejected, by reason"
        ),
        &["reason"],
    )
    .expect("metric can be created")
});

pub static DS_STATE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "kestrel_ds_state",
        "Current DS state machine phase (enum ordinal)",
    )
    .expect("metric can be created")
});

pub static DS_EPOCH: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("kestrel_ds_epoch", "Current DS epoch").expect("metric can be created"));

pub static DS_DIFFICULTY: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        prometheus::opts!(
            "kestrel_ds_difficulty",
            "Current PoW difficulty, by tier"
        ),
        // "shard", "ds"
        &["tier"],
    )
    .expect("metric can be created")
});

pub static VIEW_CHANGES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "kestrel_ds_view_changes_total",
            "View changes entered, by outcome"
        ),
        // "committed", "failed"
        &["outcome"],
    )
    .expect("metric can be created")
});

pub static CONSENSUS_ROUNDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "kestrel_ds_consensus_rounds_total",
            "Consensus rounds run by the epoch driver, by phase and outcome"
        ),
        // phase: "ds_block", "final_block", "view_change"
        // outcome: "commit", "abort", "timeout"
        &["phase", "outcome"],
    )
    .expect("metric can be created")
});

/// Register all directory metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(POW_SUBMISSIONS_TOTAL.clone()))
        .ok();
    registry
        .register(Box::new(POW_REJECTIONS_TOTAL.clone()))
        .ok();
    registry.register(Box::new(DS_STATE.clone())).ok();
    registry.register(Box::new(DS_EPOCH.clone())).ok();
    registry.register(Box::new(DS_DIFFICULTY.clone())).ok();
    registry.register(Box::new(VIEW_CHANGES_TOTAL.clone())).ok();
    registry
        .register(Box::new(CONSENSUS_ROUNDS_TOTAL.clone()))
        .ok();
}
