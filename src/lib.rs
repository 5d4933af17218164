//! MACROSCOPE — Adaptive macro-signal engine orchestrator
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod engine;
pub mod filter;
pub mod orchestrator;
pub mod storage;
pub mod types;
