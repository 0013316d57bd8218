//! `Conductor` Core Library
//!
//! Shared functionality for `Conductor` components:
//! - Workflow definitions and the validator
//! - Canonical event schema
//! - NDJSON parsing of provider delta streams
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod error;
pub mod event;
pub mod ndjson;
pub mod tracing_init;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, EventDraft, EventKind, EventPayload, FinishReason, Status, Termination};
pub use workflow::{WorkflowDefinition, WorkflowSpec, validate};
