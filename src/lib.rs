//! # Research Orchestration Core
//!
//! A durable, multi-stage research agent service: a query is expanded into
//! searches, synthesized into a cited report, validated for accuracy, and
//! optionally routed to a human reviewer before being marked complete.
//!
//! ## Architecture
//!
//! - **Retrieval Library**: capability traits over an LLM provider, vector
//!   store, and blob store, plus the pure search/hydration operations built
//!   on top of them
//! - **Agent Nodes**: search, synthesis, validation and finalize — pure
//!   functions over one `ResearchState`
//! - **Workflow Engine**: the fixed directed graph connecting the nodes
//! - **Workflow Executor**: a bounded worker pool draining a bounded job
//!   queue off the HTTP request path
//! - **Task Store**: a durable, SQLite-backed record of every task and its
//!   result, enforcing a strict status state machine
//! - **Cost & Telemetry Ledger**: an append-only log of every model call
//! - **HTTP API Layer**: the public surface for submitting queries, polling
//!   status, fetching reports, and submitting human review decisions

/// Agent nodes: search, synthesis, validation, finalize
pub mod agents;
/// HTTP API server, DTOs and handlers
pub mod api;
/// Application configuration
pub mod config;
/// System-wide constants
pub mod constants;
/// Workflow Executor and HITL Review Controller
pub mod executor;
/// Error types and HTTP error mapping
pub mod error;
/// HTTP-backed LLM provider with circuit breaker and retry
pub mod llm;
/// Request-scoped and response middleware
pub mod middleware;
/// Core data models
pub mod models;
/// Capability traits and retrieval operations
pub mod retrieval;
/// Durable, SQLite-backed task store
pub mod store;
/// Append-only cost and telemetry ledger
pub mod telemetry;
/// Input validation at the HTTP boundary
pub mod validation;
/// Workflow Engine: the fixed agent-node graph
pub mod workflow;

pub use error::{ResearchError, Result};
