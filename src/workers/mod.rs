//! Background workers

pub mod sweep;

pub use sweep::{SweepConfig, SweepReport, SweepWorker};
