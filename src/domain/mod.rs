//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - execution settings (`ExecutionParams`, `AutoOr`)
//! - stage configuration (`StageSettings`, `ParamValue`, `Phase`)
//! - run switches and reconstruction geometry (`RunFlags`, `ReconSettings`)
//! - COR measurements (`CorObservation`)

pub mod types;

pub use types::*;
