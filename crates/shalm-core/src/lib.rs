//! Shalm Core - package-level types shared by the shalm crates
//!
//! This crate provides:
//! - `ChartSource`: a chart package loaded from disk (Chart.yaml, values.yaml, templates/)
//! - `Values`: a chart's values document
//! - `CoreError`: errors raised while loading packages or parsing values

pub mod error;
pub mod package;
pub mod values;

pub use error::{CoreError, Result};
pub use package::{ChartMetadata, ChartSource};
pub use values::Values;
