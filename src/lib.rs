//! loadscope library crate
//!
//! Ingests the files of a performance-testing project, has a reasoning
//! service flag per-file performance issues, correlates them across files and
//! attaches fix suggestions. Exposed as a library so the CLI, tests and
//! benchmarks share one implementation.

pub mod classify;
pub mod config;
pub mod hints;
pub mod pipeline;
pub mod project;
pub mod reasoning;
pub mod service;
pub mod store;
pub mod util;
