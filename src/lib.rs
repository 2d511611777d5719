//! # courseforge
//!
//! Background generation engine for AI-authored course roadmaps.
//!
//! Provides a reliable Postgres-backed job queue (pending/processing lists
//! with atomic hand-off and bounded retries), a forward-only run lifecycle
//! state machine with crash-tolerant progress checkpointing, and a generic
//! validate-and-repair loop that coerces an untrusted text generator into
//! schema-valid outlines and format-valid module content.

pub mod config;
pub mod db;
pub mod error;
pub mod generate;
pub mod llm;
pub mod model;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod worker;
