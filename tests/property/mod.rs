//! Property-based tests for ordering and determinism guarantees

mod matcher_determinism;
mod ordering;

#[allow(dead_code)]
#[path = "../integration/test_utils.rs"]
mod support;
