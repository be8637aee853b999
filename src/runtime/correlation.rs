//! Flow id and operation propagation across mediation points.
//!
//! The first pass over a message decides its flow id and operation and
//! stores both in the carrier-level header store. Later passes over the same
//! message, at this or any following hop, read them back from there.

use crate::runtime::expression::ExpressionEvaluator;
use crate::runtime::message::InboundMessage;
use crate::runtime::registry::ValueRegistry;
use crate::runtime::resolver::{FieldResolver, ResolveContext};

/// Header and property key carrying the flow id.
pub const FLOW_ID_KEY: &str = "flowlogFlowId";

/// Header and property key carrying the operation name.
pub const OPERATION_NAME_KEY: &str = "flowlogOperationName";

/// Flow id and operation decided for a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub flow_id: String,
    pub operation: Option<String>,
}

/// Assigns and recovers correlation values for in-flight messages.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationPropagator {
    operation: FieldResolver,
}

impl CorrelationPropagator {
    pub fn new(operation: FieldResolver) -> Self {
        Self { operation }
    }

    pub fn operation(&self) -> &FieldResolver {
        &self.operation
    }

    /// Decide the flow id and operation and write both back to the header
    /// store. Without an operation the operation header is cleared.
    pub fn propagate(
        &self,
        evaluator: &dyn ExpressionEvaluator,
        registry: &ValueRegistry,
        message: &mut dyn InboundMessage,
    ) -> Correlation {
        let correlation = {
            let ctx = ResolveContext {
                evaluator,
                registry,
                message: &*message,
            };
            Correlation {
                flow_id: self.flow_id(&ctx),
                operation: self.operation_name(&ctx),
            }
        };

        message.set_header(FLOW_ID_KEY, correlation.flow_id.clone());
        match &correlation.operation {
            Some(operation) => message.set_header(OPERATION_NAME_KEY, operation.clone()),
            None => message.remove_header(OPERATION_NAME_KEY),
        }

        tracing::debug!(
            flow_id = %correlation.flow_id,
            operation = ?correlation.operation,
            "correlation propagated"
        );
        correlation
    }

    fn flow_id(&self, ctx: &ResolveContext<'_>) -> String {
        carried_value(ctx.message, FLOW_ID_KEY)
            .unwrap_or_else(|| ctx.message.message_id().to_string())
    }

    /// A configured operation wins outright; otherwise whatever an earlier
    /// hop left on the message.
    fn operation_name(&self, ctx: &ResolveContext<'_>) -> Option<String> {
        if self.operation.is_configured() {
            return self.operation.resolve(ctx);
        }
        carried_value(ctx.message, OPERATION_NAME_KEY)
    }
}

/// Header value, then property value. Type mismatches count as absent.
fn carried_value(message: &dyn InboundMessage, key: &str) -> Option<String> {
    let from_header = message.header(key).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "ignoring header");
        None
    });

    from_header
        .or_else(|| {
            message.property_str(key).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "ignoring property");
                None
            })
        })
        .filter(|value| !value.is_empty())
}
