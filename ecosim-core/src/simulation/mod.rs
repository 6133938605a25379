//! A simulation couples a set of components through a shared data store.
//!
//! The [`SimulationBuilder`] loads the input data, records the components' declared variables
//! in the registry and computes the execution order once. The resulting [`Simulation`] runs
//! every component's `init` in init order and then, on each time step, every component's
//! `update` in update order. Components later in the order see what earlier components wrote
//! during the same step.
//!
//! A failed update leaves the data store partially updated, so the simulation refuses any
//! further steps once an update has failed.

mod builder;
mod runtime;

#[cfg(test)]
mod tests;

pub use builder::SimulationBuilder;
pub use runtime::Simulation;
