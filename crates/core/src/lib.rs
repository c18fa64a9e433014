//! # Stepwise Core
//!
//! Domain types, traits, and error definitions for the Stepwise agent.
//! This crate holds no I/O: it defines the domain model that every other
//! crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the reasoning loop is a trait here:
//! - [`Provider`] for the language-model completion service
//! - [`Tool`] for a registered capability
//!
//! Implementations live in their respective crates, which keeps the loop
//! testable with scripted providers and in-process tools.

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{LoopPhase, Step, StepKind};
pub use error::{Error, ProviderError, RegistryError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use schema::{ParamSpec, ParamType, ToolSpec};
pub use tool::{FailureKind, FnTool, Tool, ToolOutcome, ToolParams, ToolRegistry, ToolStatus};
