//! Orchestration kernel for modular ecosystem simulations.
//!
//! Re-exports the core crate so that downstream component crates depend on a single name.

pub use ecosim_core::*;
