//! Import orchestration for attachport.
//!
//! [`Importer`] runs the per-unit pipeline (extract, check, fetch, register,
//! rewrite, persist). [`batch`] drives it over many units concurrently.

pub mod batch;
pub mod importer;

#[cfg(test)]
mod testing;

pub use batch::{BatchProgress, BatchSummary, SilentProgress, UnitFailure, pending_units, run_batch};
pub use importer::Importer;
