//! Mediation runtime: everything that runs per in-flight message.
//!
//! Expressions are evaluated through an [`ExpressionEvaluator`] picked once
//! from the host version. Field values are checked against the shared
//! [`ValueRegistry`] and fall back to per-category sentinels.

pub mod assembler;
pub mod correlation;
pub mod expression;
pub mod location;
pub mod message;
pub mod multi_id;
pub mod registry;
pub mod resolver;

// Re-export key types
pub use assembler::{CustomProperty, Mediator, DEFAULT_SEPARATOR, RESERVED_FIELDS};
pub use correlation::{Correlation, CorrelationPropagator, FLOW_ID_KEY, OPERATION_NAME_KEY};
pub use expression::{
    BodyPathEvaluator, EvalOutput, Expression, ExpressionEvaluator, HostApi, ScopedPathEvaluator,
};
pub use location::{ArtifactType, MediatorLocation};
pub use message::{EnvelopeMessage, InboundMessage};
pub use multi_id::{parse_multi_ids, IdExpression, MultiIdResolver};
pub use registry::{Category, ValueRegistry, SELF_APPLICATION_KEY};
pub use resolver::{
    ApplicationResolvers, ApplicationSide, Direction, FieldKind, FieldResolver, FieldSource,
    ResolveContext, StatusResolver,
};
