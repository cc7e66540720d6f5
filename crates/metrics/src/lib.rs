//! Kestrel Prometheus metrics infrastructure.
//!
//! Centralized metric definitions, organized by subsystem. Components
//! update the static collectors directly; the node exposes the global
//! [`REGISTRY`] through its metrics endpoint.

pub mod directory;
pub mod network;

use once_cell::sync::Lazy;
use prometheus::Registry;

/// Global Prometheus registry for all Kestrel metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    directory::register_metrics(&registry);
    network::register_metrics(&registry);
    registry
});

/// Initialize all metrics. Call once at startup.
pub fn init() {
    Lazy::force(&REGISTRY);
    tracing::info!("Kestrel metrics initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_gathers_after_updates() {
        init();
        directory::POW_SUBMISSIONS_TOTAL
            .with_label_values(&["accepted"])
            .inc();
        directory::DS_EPOCH.set(3.0);

        let families = REGISTRY.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "kestrel_ds_pow_submissions_total"));
    }
}
