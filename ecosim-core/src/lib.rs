//! Core of a modular ecosystem simulation.
//!
//! A [`grid::Grid`] of square or hexagonal cells defines the spatial domain. Input arrays are
//! mapped onto the grid's cells by the validators in [`axis`] as they enter the [`data::Data`]
//! store. Components declare the variables they require and populate in each phase; the
//! [`variable::VariableRegistry`] records those declarations and the [`scheduler`] derives an
//! execution order from them. A [`simulation::Simulation`] then runs the components over the
//! shared store.

pub mod axis;
pub mod component;
pub mod config;
pub mod data;
pub mod data_array;
pub mod errors;
pub mod grid;
pub mod io;
pub mod scheduler;
pub mod simulation;
pub mod variable;

#[cfg(test)]
mod example_components;
