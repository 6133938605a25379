//! Scenario tests for building and running simulations.
//!
//! These cover the full path from grid and input data through registration and scheduling to
//! running components and exporting their results.
