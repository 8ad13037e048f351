//! Batch scheduling and run orchestration for Saturator.
//!
//! This crate ties the proxy rotator, profile fetcher, and snapshot store
//! together into the enrichment run: a work queue drained in bounded
//! random batches with a per-account bounded retry policy.

pub mod ledger;
pub mod queue;
pub mod run;
pub mod scheduler;

pub use ledger::ErrorLedger;
pub use queue::WorkQueue;
pub use run::{RunReport, execute_run};
pub use scheduler::{ProfileSource, ProxyRotator, RunSummary, run_job};
