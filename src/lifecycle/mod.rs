//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server stops accepting, maintenance exits
//!
//! Maintenance (maintenance.rs):
//!     interval tick → SecurityGate::run_maintenance
//! ```

pub mod maintenance;
pub mod shutdown;

pub use maintenance::MaintenanceTask;
pub use shutdown::Shutdown;
