//! Orchestrator for the analyzer's local services.
//!
//! Checks that Node.js and Python are installed, installs the application
//! server's npm dependencies and the Chroma pip packages, starts the Chroma
//! vector database followed by the application server, and keeps both alive
//! until the operator interrupts the run.

pub mod dependency;
pub mod lifecycle;

pub use lifecycle::{LifecycleController, LifecycleState, shutdown_signal};
