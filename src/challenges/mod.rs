// Aggregates challenge classification, bypass strategies, and the manager that orchestrates them.

pub mod core;
pub mod detectors;
pub mod manager;
pub mod strategies;
