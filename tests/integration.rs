//! Integration test entry point.
//!
//! Wires the shared mock engine and the full-pipeline scenarios into one
//! test binary against the public crate API.

#[path = "integration/mock_engine.rs"]
mod mock_engine;

#[path = "integration/pipeline.rs"]
mod pipeline;
