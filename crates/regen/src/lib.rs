#![doc = include_str!("../README.md")]

pub mod marker;
pub mod merge;
pub mod scan;

mod error;
mod types;

pub use error::ScanError;
pub use types::{ConflictRegion, GeneratedFileRecord, Target};
