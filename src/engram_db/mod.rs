//! The engram database handle.
//!
//! `EngramDb` owns the record store and the optional vector subsystem
//! (embedding service plus vector index). Vector search starts out
//! uninitialized and is bound to one embedding model on first init.

mod crud;
mod export;
mod search;
mod vector;

// pub(crate): module internals hidden; public items re-exported explicitly via lib.rs
pub(crate) mod store;

pub use export::{ImportStats, SNAPSHOT_VERSION, Snapshot};
pub use store::EngramDb;
pub use vector::InitOutcome;

#[cfg(test)]
mod tests;
