//! Built-in checks for server startup

pub mod cluster;
pub mod core_setup;
pub mod listener;
pub mod os;
pub mod seal;
pub mod service_discovery;
pub mod storage;

pub use cluster::{determine_redirect, find_cluster_addr};
pub use core_setup::diagnose_core;
pub use listener::diagnose_listeners;
pub use os::OperatingSystemCheck;
pub use seal::{SealFinalizer, diagnose_seal};
pub use service_discovery::diagnose_service_discovery;
pub use storage::{diagnose_ha_storage, diagnose_storage};
