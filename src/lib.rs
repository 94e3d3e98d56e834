// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! norsim: a NOR flash simulator with configurable wear-out faults.
//!
//! A plain file (or memory buffer) is presented as an MTD NOR device. Pages
//! listed as *weak* start failing writes and erases after a number of erase
//! cycles; pages listed as *grave* start failing reads after a number of
//! reads. A failing page either returns EIO or silently corrupts one byte.

pub mod config;
pub mod device;
pub mod error;
pub mod mtd;
pub mod page;
pub mod parser;
pub mod policy;
pub mod report;
pub mod store;

pub use config::{DeviceConfig, LogConfig};
pub use device::Device;
pub use error::{NorsimError, Result};
pub use mtd::MtdInfo;
pub use page::{LockState, PageCategory};
pub use policy::Behavior;
pub use report::{Report, ReportKind, ReportTrigger};

#[cfg(test)]
mod tests;
