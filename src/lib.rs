//! `tomo-recon` library crate.
//!
//! The binary (`tomo`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes
//! - loaders, savers, reconstructors and external kernels plug in from outside
//! - code stays easy to navigate as the stage list grows

pub mod app;
pub mod cli;
pub mod cor;
pub mod domain;
pub mod error;
pub mod exec;
pub mod filters;
pub mod io;
pub mod math;
pub mod pipeline;
pub mod recon;
pub mod report;
pub mod synthetic;
pub mod volume;
