//! Operational concerns: observability counters.

pub mod counters;
