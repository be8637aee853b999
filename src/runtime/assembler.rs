//! Transaction assembly for one mediation point.
//!
//! A [`Mediator`] is built once from configuration (see
//! [`MediatorFactory`](crate::config::MediatorFactory)) and then runs one
//! pass per in-flight message. It is immutable after construction and can be
//! shared across threads.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::agent::Agent;
use crate::error::MediationError;
use crate::runtime::correlation::CorrelationPropagator;
use crate::runtime::expression::{Expression, ExpressionEvaluator};
use crate::runtime::location::MediatorLocation;
use crate::runtime::message::{property_text, InboundMessage};
use crate::runtime::multi_id::{IdExpression, MultiIdResolver};
use crate::runtime::registry::{Category, ValueRegistry};
use crate::runtime::resolver::{ApplicationResolvers, FieldResolver, ResolveContext, StatusResolver};
use crate::transaction::{Status, Transaction};

/// Separator used in the host log line when none is configured.
pub const DEFAULT_SEPARATOR: &str = ",";

/// Transaction fields a custom property can never overwrite.
pub const RESERVED_FIELDS: [&str; 9] = [
    "from",
    "to",
    "message",
    "status",
    "timestamp",
    "operation",
    "ids",
    "flowId",
    "payloadType",
];

/// Message property -> metadata key, attached on failed transactions.
const ERROR_PROPERTIES: [(&str, &str); 4] = [
    ("ERROR_CODE", "errorCode"),
    ("ERROR_MESSAGE", "errorMessage"),
    ("ERROR_DETAIL", "errorDetails"),
    ("ERROR_EXCEPTION", "errorException"),
];

/// Free-form name/value pair logged by the host and attached as metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomProperty {
    pub name: String,
    pub value: Option<String>,
    pub expression: Option<Expression>,
}

impl CustomProperty {
    pub fn new(name: impl Into<String>, value: Option<String>, expression: Option<Expression>) -> Self {
        Self {
            name: name.into(),
            value,
            expression,
        }
    }

    /// Whether the property becomes transaction metadata.
    pub fn is_metadata(&self) -> bool {
        !RESERVED_FIELDS.contains(&self.name.as_str())
    }

    /// Static value if set, otherwise the evaluated expression.
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<String> {
        if let Some(value) = &self.value {
            return Some(value.clone());
        }

        let expression = self.expression.as_ref()?;
        match ctx.evaluator.first_value(expression, ctx.message) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    property = %self.name,
                    expression = %expression,
                    error = %e,
                    "error while resolving the property expression"
                );
                None
            }
        }
    }
}

/// One configured mediation point.
pub struct Mediator {
    pub(crate) location: MediatorLocation,
    pub(crate) server_name: String,
    pub(crate) separator: String,
    pub(crate) status: StatusResolver,
    pub(crate) applications: ApplicationResolvers,
    pub(crate) payload_type: FieldResolver,
    pub(crate) message: FieldResolver,
    pub(crate) correlation: CorrelationPropagator,
    pub(crate) multi_ids: MultiIdResolver,
    pub(crate) ids: Vec<IdExpression>,
    pub(crate) properties: Vec<CustomProperty>,
    pub(crate) agent: Arc<dyn Agent>,
    pub(crate) evaluator: Arc<dyn ExpressionEvaluator>,
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("location", &self.location)
            .field("server_name", &self.server_name)
            .field("evaluator", &self.evaluator.name())
            .finish_non_exhaustive()
    }
}

impl Mediator {
    pub fn location(&self) -> &MediatorLocation {
        &self.location
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn status(&self) -> &StatusResolver {
        &self.status
    }

    pub fn applications(&self) -> &ApplicationResolvers {
        &self.applications
    }

    pub fn operation(&self) -> &FieldResolver {
        self.correlation.operation()
    }

    pub fn payload_type(&self) -> &FieldResolver {
        &self.payload_type
    }

    pub fn message(&self) -> &FieldResolver {
        &self.message
    }

    pub fn multi_ids(&self) -> &MultiIdResolver {
        &self.multi_ids
    }

    pub fn ids(&self) -> &[IdExpression] {
        &self.ids
    }

    pub fn properties(&self) -> &[CustomProperty] {
        &self.properties
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    fn registry(&self) -> &ValueRegistry {
        self.agent.registry()
    }

    /// Run one pass: propagate correlation values, log, and hand the
    /// transaction to the agent. Never fails and always returns `true`, so
    /// the message continues down the pipeline.
    pub fn mediate(&self, message: &mut dyn InboundMessage) -> bool {
        if let Err(e) = self.try_mediate(message) {
            tracing::error!(
                location = %self.location,
                error = %e,
                "error occurred while recording the transaction"
            );
        }
        true
    }

    fn try_mediate(&self, message: &mut dyn InboundMessage) -> Result<(), MediationError> {
        let transaction = self.resolve(message);

        tracing::info!(
            location = %self.location,
            "{}",
            self.log_line(transaction.as_ref())
        );

        if let Some(transaction) = transaction {
            self.agent.add_transaction(transaction)?;
        }
        Ok(())
    }

    /// Build the transaction for one pass.
    ///
    /// Flow id and operation are always written back to the message headers.
    /// Returns `None` when the agent is disabled.
    pub fn resolve(&self, message: &mut dyn InboundMessage) -> Option<Transaction> {
        let registry = self.registry();
        let correlation = self
            .correlation
            .propagate(self.evaluator.as_ref(), registry, message);

        if !self.agent.is_enabled() {
            tracing::debug!(flow_id = %correlation.flow_id, "agent disabled, no transaction");
            return None;
        }

        let ctx = ResolveContext {
            evaluator: self.evaluator.as_ref(),
            registry,
            message: &*message,
        };

        let mut transaction = self.agent.new_transaction();
        transaction.flow_id = Some(correlation.flow_id);
        transaction.operation_key = correlation.operation;
        transaction.status = self.status.resolve(&ctx);

        let (from, to) = self.applications.resolve(&ctx);
        transaction.from_key = from;
        transaction.to_key = to;
        transaction.payload_type_key = self.payload_type.resolve(&ctx);
        transaction.message = self.message.resolve(&ctx);

        self.multi_ids.apply(&ctx, &mut transaction);
        for id in &self.ids {
            id.apply(&ctx, &mut transaction);
        }

        transaction.add_metadata("artifactType", self.location.artifact_type.type_name());
        transaction.add_metadata("artifactName", self.location.artifact_name.as_str());
        transaction.add_metadata("lineNumber", self.location.line_number.to_string());
        transaction.add_metadata("esbServerName", self.server_name.as_str());

        if transaction.status == Status::Failure {
            add_error_metadata(ctx.message, &mut transaction);
        }

        for property in self.properties.iter().filter(|p| p.is_metadata()) {
            match property.resolve(&ctx) {
                Some(value) => transaction.add_metadata(property.name.as_str(), value),
                None => tracing::debug!(property = %property.name, "property has no value, skipped"),
            }
        }

        Some(transaction)
    }

    /// Human-readable summary of a pass for the host log.
    ///
    /// Properties show their static value, otherwise the value already
    /// attached to the transaction. Expressions are not evaluated again.
    pub fn log_line(&self, transaction: Option<&Transaction>) -> String {
        let sep = self.separator.as_str();
        let mut line = String::new();

        for property in &self.properties {
            let value = property
                .value
                .as_deref()
                .or_else(|| {
                    transaction
                        .filter(|_| property.is_metadata())
                        .and_then(|tx| tx.metadata(&property.name))
                })
                .unwrap_or_default();
            let _ = write!(line, "{} = {}{}", property.name, value, sep);
        }

        let Some(transaction) = transaction else {
            return line;
        };

        let registry = self.registry();
        let entry = |category: Category, key: &Option<String>| {
            key.as_deref()
                .map(|key| registry.entry(category, key))
                .unwrap_or_default()
        };

        let fields = [
            ("operation", entry(Category::Operations, &transaction.operation_key)),
            ("flowId", transaction.flow_id.clone().unwrap_or_default()),
            ("message", transaction.message.clone().unwrap_or_default()),
            ("status", transaction.status.to_string()),
            ("payloadType", entry(Category::PayloadTypes, &transaction.payload_type_key)),
            ("from", entry(Category::Applications, &transaction.from_key)),
            ("to", entry(Category::Applications, &transaction.to_key)),
        ];
        for (name, value) in fields {
            let _ = write!(line, "{} = {}{}", name, value, sep);
        }

        line.push_str("ids = [");
        for (id_type, values) in &transaction.ids {
            let _ = write!(line, "{}: [{}],", id_type, values.join(","));
        }
        line.push(']');
        line
    }
}

fn add_error_metadata(message: &dyn InboundMessage, transaction: &mut Transaction) {
    for (property, key) in ERROR_PROPERTIES {
        if let Some(value) = message.property(property) {
            transaction.add_metadata(key, property_text(value));
        }
    }
}
