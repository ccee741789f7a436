//! Core library for the operations agent.
//!
//! This crate contains the event model, the priority queue and dead-letter
//! queue, source pollers, the scheduler, the classifier, guardrails, the
//! context engine, the reasoning/tool-calling loop, the tool registry, the
//! sandboxed script runner, session memory, the approval workflow, the
//! pattern detector, configuration, and the durable/KV storage layers.
pub mod alerts;
pub mod approvals;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod guardrails;
pub mod kv;
pub mod llm;
pub mod model;
pub mod patterns;
pub mod pollers;
pub mod queue;
pub mod reasoning;
pub mod sandbox;
pub mod scheduler;
pub mod sessions;
pub mod storage;
pub mod tools;

pub use error::*;

/// Returns the version of the ops-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
