//! Alternative job sources.

mod simulated;

pub use simulated::{SimulatedSource, SimulationController};
