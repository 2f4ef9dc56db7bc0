//! Record set validation module

pub mod integrity;

pub use integrity::{repair, RepairReport};
