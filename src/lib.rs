//! # Flowlog: transaction extraction for message mediation pipelines
//!
//! Flowlog runs inside an integration host at configured mediation points.
//! For every message passing a point it resolves an auditable transaction
//! (flow id, operation, status, applications, payload type, business ids and
//! metadata), propagates correlation values to later hops through the
//! message headers, and hands the transaction to an agent for shipping.
//!
//! ## Features
//!
//! - **Static or dynamic fields**: every field takes a fixed value, a path
//!   expression evaluated against the message, or both
//! - **Registry validation**: applications, operations, payload types and id
//!   types are checked against the agent configuration, with sentinel
//!   fallbacks at runtime
//! - **Correlation**: flow id and operation survive across hops
//! - **Batched shipping**: the default agent ships NDJSON batches from a
//!   background task
//!
//! ## Example: mediator configuration
//!
//! ```yaml
//! location: { artifact_type: proxy, artifact_name: OrderProxy, line_number: 12 }
//! status: success
//! operation: { key: create }
//! to: { application_key: app01 }
//! payload_type: { expression: /order/kind }
//! ids:
//!   - { type_key: orderId, expression: /order/id }
//! properties:
//!   - { name: channel, value: web }
//! ```

// Core modules
pub mod error;
pub mod extraction;
pub mod transaction;

pub mod agent;
pub mod config;

// Per-message resolution and assembly
pub mod runtime;

// Re-export key types
pub use agent::{Agent, AgentCell, ChannelAgent, NdjsonSink, TransactionSink};
pub use config::{AgentConfig, MediatorConfig, MediatorFactory};
pub use error::{AgentError, ConfigError, ExpressionError, MediationError, ParseError, PropertyError};
pub use extraction::{FieldPath, Node, PathSegment};
pub use runtime::{EnvelopeMessage, Expression, HostApi, InboundMessage, Mediator, ValueRegistry};
pub use transaction::{Status, Transaction};
