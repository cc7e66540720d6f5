//! Kestrel DS node runner.
//!
//! Ties the directory-service core to its runtime: configuration
//! loading, the TCP transport, and structured task supervision for the
//! epoch driver and the network listener.

pub mod config;
pub mod network;
pub mod supervisor;

pub use config::{BootstrapPeer, NodeConfig};
pub use network::DsNetwork;
pub use supervisor::NodeSupervisor;
