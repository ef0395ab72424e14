//! shotcode: multi-variant screenshot-to-code generation
//!
//! Fans one visual input out to several generation backends in parallel, streams each
//! variant's progress back with strict per-variant ordering, and compares stored outputs
//! against their inputs for single, pairwise and N-way evaluation.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod evals;
pub mod image_cache;
pub mod images;
pub mod logging;
pub mod orchestrator;
pub mod prompts;
pub mod protocol;
pub mod provider;
pub mod request;
pub mod screenshot;
pub mod server;
pub mod worker;
