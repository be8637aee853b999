//! Per-field resolution policy.
//!
//! Every semantic field of a transaction is resolved the same way: a dynamic
//! expression wins when it yields a value, the static value is used
//! otherwise, and registry-backed fields whose value is unknown fall back to
//! their category's sentinel, which is registered on first use.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, ParseError};
use crate::runtime::expression::{Expression, ExpressionEvaluator};
use crate::runtime::message::InboundMessage;
use crate::runtime::registry::{Category, ValueRegistry, SELF_APPLICATION_KEY};
use crate::transaction::Status;

/// Everything a resolver needs during one mediation pass.
pub struct ResolveContext<'a> {
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub registry: &'a ValueRegistry,
    pub message: &'a dyn InboundMessage,
}

/// Semantic field of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Operation,
    Status,
    FromApplication,
    ToApplication,
    PayloadType,
    Message,
    MultiIds,
}

impl FieldKind {
    /// Registry category values of this field must belong to, if any.
    pub fn category(&self) -> Option<Category> {
        match self {
            FieldKind::Operation => Some(Category::Operations),
            FieldKind::FromApplication | FieldKind::ToApplication => Some(Category::Applications),
            FieldKind::PayloadType => Some(Category::PayloadTypes),
            FieldKind::Status | FieldKind::Message | FieldKind::MultiIds => None,
        }
    }

    /// Configuration element the field is declared in.
    pub fn element(&self) -> &'static str {
        match self {
            FieldKind::Operation => "operation",
            FieldKind::Status => "status",
            FieldKind::FromApplication => "from",
            FieldKind::ToApplication => "to",
            FieldKind::PayloadType => "payloadType",
            FieldKind::Message => "message",
            FieldKind::MultiIds => "multiIds",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element())
    }
}

/// Static and dynamic configuration of one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSource {
    pub static_value: Option<String>,
    pub expression: Option<Expression>,
}

impl FieldSource {
    pub fn new(static_value: Option<String>, expression: Option<Expression>) -> Self {
        Self {
            static_value,
            expression,
        }
    }

    pub fn fixed(value: impl Into<String>) -> Self {
        Self::new(Some(value.into()), None)
    }

    pub fn dynamic(expression: Expression) -> Self {
        Self::new(None, Some(expression))
    }

    pub fn is_configured(&self) -> bool {
        self.static_value.is_some() || self.expression.is_some()
    }

    /// Evaluate the expression, if any.
    pub fn dynamic_value(&self, kind: FieldKind, ctx: &ResolveContext<'_>) -> Option<String> {
        evaluate_field(self.expression.as_ref(), kind, ctx)
    }

    /// Dynamic value if one resolves, otherwise the static value.
    pub fn candidate(&self, kind: FieldKind, ctx: &ResolveContext<'_>) -> Option<String> {
        self.dynamic_value(kind, ctx)
            .or_else(|| self.static_value.clone())
    }
}

/// Resolver for one string-valued field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldResolver {
    kind: FieldKind,
    source: FieldSource,
}

impl FieldResolver {
    pub fn new(kind: FieldKind, source: FieldSource) -> Self {
        Self { kind, source }
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn source(&self) -> &FieldSource {
        &self.source
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_configured()
    }

    /// Setup-time check that a static value belongs to the field's category.
    pub fn validate_static(&self, registry: &ValueRegistry) -> Result<(), ConfigError> {
        if let (Some(category), Some(value)) = (self.kind.category(), &self.source.static_value) {
            if !registry.exists(category, value) {
                return Err(ConfigError::UnknownKey {
                    category: category.label(),
                    key: value.clone(),
                    element: self.kind.element(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the field for one pass.
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<String> {
        let candidate = self.source.candidate(self.kind, ctx);

        let category = match self.kind.category() {
            Some(category) => category,
            None => return candidate,
        };

        match candidate {
            Some(value) if !value.is_empty() && !ctx.registry.exists(category, &value) => {
                tracing::warn!(
                    field = %self.kind,
                    value = %value,
                    fallback = category.sentinel(),
                    "{} '{}' is not configured, falling back to '{}'",
                    category,
                    value,
                    category.sentinel()
                );
                Some(fallback(category, ctx.registry))
            }
            Some(value) => Some(value),
            None if self.source.expression.is_some() => {
                tracing::warn!(
                    field = %self.kind,
                    fallback = category.sentinel(),
                    "{} expression yielded no value, falling back to '{}'",
                    self.kind,
                    category.sentinel()
                );
                Some(fallback(category, ctx.registry))
            }
            None => None,
        }
    }
}

/// Evaluate a field expression. Failures and empty results are logged and
/// reported as no value.
fn evaluate_field(
    expression: Option<&Expression>,
    kind: FieldKind,
    ctx: &ResolveContext<'_>,
) -> Option<String> {
    let expression = expression?;

    match ctx.evaluator.first_value(expression, ctx.message) {
        Ok(Some(value)) if !value.is_empty() => Some(value),
        Ok(_) => {
            tracing::debug!(field = %kind, expression = %expression, "expression yielded no value");
            None
        }
        Err(e) => {
            tracing::warn!(
                field = %kind,
                expression = %expression,
                error = %e,
                "error while resolving the {} expression",
                kind
            );
            None
        }
    }
}

fn fallback(category: Category, registry: &ValueRegistry) -> String {
    registry.ensure_sentinel(category);
    category.sentinel().to_string()
}

/// Resolver for the transaction status.
///
/// The status attribute is parsed eagerly at setup; the expression result is
/// parsed per pass and anything outside the three literals becomes
/// [`Status::Unknown`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusResolver {
    static_status: Option<Status>,
    expression: Option<Expression>,
}

impl StatusResolver {
    pub fn new(static_status: Option<&str>, expression: Option<Expression>) -> Result<Self, ConfigError> {
        let static_status = static_status
            .map(|value| {
                value.parse::<Status>().map_err(|_| ConfigError::InvalidStatus {
                    value: value.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            static_status,
            expression,
        })
    }

    pub fn static_status(&self) -> Option<Status> {
        self.static_status
    }

    pub fn expression(&self) -> Option<&Expression> {
        self.expression.as_ref()
    }

    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Status {
        match evaluate_field(self.expression.as_ref(), FieldKind::Status, ctx) {
            Some(value) => value.parse::<Status>().unwrap_or_else(|_| {
                tracing::warn!(value = %value, "invalid status from expression, using 'unknown'");
                Status::Unknown
            }),
            None => self.static_status.unwrap_or_default(),
        }
    }
}

/// Direction of an application relative to the mediating host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    From,
    To,
}

impl Direction {
    fn kind(&self) -> FieldKind {
        match self {
            Direction::From => FieldKind::FromApplication,
            Direction::To => FieldKind::ToApplication,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::From => f.write_str("from"),
            Direction::To => f.write_str("to"),
        }
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from" => Ok(Direction::From),
            "to" => Ok(Direction::To),
            other => Err(ParseError::new("direction", other)),
        }
    }
}

/// One side of the from/to pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationSide {
    Configured(FieldResolver),
    /// Implicitly the mediating host, never resolved dynamically.
    SelfKey,
}

impl ApplicationSide {
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<String> {
        match self {
            ApplicationSide::Configured(resolver) => resolver.resolve(ctx),
            ApplicationSide::SelfKey => Some(SELF_APPLICATION_KEY.to_string()),
        }
    }

    pub fn resolver(&self) -> Option<&FieldResolver> {
        match self {
            ApplicationSide::Configured(resolver) => Some(resolver),
            ApplicationSide::SelfKey => None,
        }
    }
}

/// From and to application resolvers.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationResolvers {
    pub from: ApplicationSide,
    pub to: ApplicationSide,
}

impl ApplicationResolvers {
    /// Build the pair. A direction left unconfigured becomes the self key
    /// when the other one is configured; configuring neither is an error.
    pub fn new(from: Option<FieldSource>, to: Option<FieldSource>) -> Result<Self, ConfigError> {
        let side = |direction: Direction, source: Option<FieldSource>| match source {
            Some(source) if source.is_configured() => {
                Some(ApplicationSide::Configured(FieldResolver::new(direction.kind(), source)))
            }
            _ => None,
        };

        match (side(Direction::From, from), side(Direction::To, to)) {
            (None, None) => Err(ConfigError::MissingDirection),
            (from, to) => Ok(Self {
                from: from.unwrap_or(ApplicationSide::SelfKey),
                to: to.unwrap_or(ApplicationSide::SelfKey),
            }),
        }
    }

    pub fn validate_static(&self, registry: &ValueRegistry) -> Result<(), ConfigError> {
        for side in [&self.from, &self.to] {
            if let Some(resolver) = side.resolver() {
                resolver.validate_static(registry)?;
            }
        }
        Ok(())
    }

    /// Resolve `(from, to)` for one pass.
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> (Option<String>, Option<String>) {
        (self.from.resolve(ctx), self.to.resolve(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::expression::ScopedPathEvaluator;
    use crate::runtime::message::EnvelopeMessage;
    use serde_json::json;

    fn registry() -> ValueRegistry {
        ValueRegistry::new()
            .with_entries(Category::Applications, [("esb", "ESB"), ("app01", "App 1"), ("app02", "App 2")])
            .with_entries(Category::Operations, [("create", "Create")])
            .with_entries(Category::PayloadTypes, [("order", "Order")])
    }

    fn message() -> EnvelopeMessage {
        EnvelopeMessage::new(json!({
            "route": {"source": "app02", "target": "mystery", "kind": "order", "state": "maybe"}
        }))
        .with_property("outcome", "failure")
    }

    fn expr(text: &str) -> Expression {
        Expression::compile(text).unwrap()
    }

    macro_rules! ctx {
        ($reg:expr, $msg:expr) => {
            ResolveContext {
                evaluator: &ScopedPathEvaluator,
                registry: &$reg,
                message: &$msg,
            }
        };
    }

    #[test]
    fn test_static_only_resolves_to_static() {
        let reg = registry();
        let msg = message();
        let resolver = FieldResolver::new(FieldKind::Operation, FieldSource::fixed("create"));

        assert!(resolver.validate_static(&reg).is_ok());
        assert_eq!(resolver.resolve(&ctx!(reg, msg)), Some("create".to_string()));
    }

    #[test]
    fn test_dynamic_wins_over_static() {
        let reg = registry();
        let msg = message();
        let resolver = FieldResolver::new(
            FieldKind::FromApplication,
            FieldSource::new(Some("app01".to_string()), Some(expr("/route/source"))),
        );

        assert_eq!(resolver.resolve(&ctx!(reg, msg)), Some("app02".to_string()));
    }

    #[test]
    fn test_empty_dynamic_falls_back_to_static() {
        let reg = registry();
        let msg = message();
        let resolver = FieldResolver::new(
            FieldKind::PayloadType,
            FieldSource::new(Some("order".to_string()), Some(expr("/route/missing"))),
        );

        assert_eq!(resolver.resolve(&ctx!(reg, msg)), Some("order".to_string()));
    }

    #[test]
    fn test_unknown_value_falls_back_to_sentinel() {
        let reg = registry();
        let msg = message();
        let resolver = FieldResolver::new(
            FieldKind::ToApplication,
            FieldSource::dynamic(expr("/route/target")),
        );

        assert!(!reg.application_exists("unknownApplication"));
        assert_eq!(
            resolver.resolve(&ctx!(reg, msg)),
            Some("unknownApplication".to_string())
        );
        assert!(reg.application_exists("unknownApplication"));

        // Same offending key again resolves cleanly to the same sentinel.
        assert_eq!(
            resolver.resolve(&ctx!(reg, msg)),
            Some("unknownApplication".to_string())
        );
        assert_eq!(reg.len(Category::Applications), 4);
    }

    #[test]
    fn test_missing_dynamic_without_static_uses_sentinel() {
        let reg = registry();
        let msg = message();
        let resolver = FieldResolver::new(FieldKind::Operation, FieldSource::dynamic(expr("/nothing")));

        assert_eq!(resolver.resolve(&ctx!(reg, msg)), Some("unknownOperation".to_string()));
    }

    #[test]
    fn test_evaluator_failure_is_recovered() {
        let reg = registry();
        let msg = message().with_header("X-Op", 12);
        let resolver = FieldResolver::new(
            FieldKind::Operation,
            FieldSource::new(Some("create".to_string()), Some(expr("$trp:X-Op"))),
        );

        assert_eq!(resolver.resolve(&ctx!(reg, msg)), Some("create".to_string()));
    }

    #[test]
    fn test_message_is_not_validated() {
        let reg = registry();
        let msg = message();
        let dynamic = FieldResolver::new(FieldKind::Message, FieldSource::dynamic(expr("/route/target")));
        let failing = FieldResolver::new(
            FieldKind::Message,
            FieldSource::new(Some("static text".to_string()), Some(expr("/none"))),
        );
        let unset = FieldResolver::new(FieldKind::Message, FieldSource::default());

        assert_eq!(dynamic.resolve(&ctx!(reg, msg)), Some("mystery".to_string()));
        assert_eq!(failing.resolve(&ctx!(reg, msg)), Some("static text".to_string()));
        assert_eq!(unset.resolve(&ctx!(reg, msg)), None);
    }

    #[test]
    fn test_validate_static_rejects_unknown_key() {
        let reg = registry();
        let resolver = FieldResolver::new(FieldKind::PayloadType, FieldSource::fixed("invoice"));

        let err = resolver.validate_static(&reg).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { ref key, .. } if key == "invoice"));
    }

    #[test]
    fn test_status_resolution() {
        let reg = registry();
        let msg = message();

        assert!(matches!(
            StatusResolver::new(Some("done"), None),
            Err(ConfigError::InvalidStatus { .. })
        ));

        let fixed = StatusResolver::new(Some("success"), None).unwrap();
        assert_eq!(fixed.resolve(&ctx!(reg, msg)), Status::Success);

        let invalid = StatusResolver::new(Some("success"), Some(expr("/route/state"))).unwrap();
        assert_eq!(invalid.resolve(&ctx!(reg, msg)), Status::Unknown);

        let from_property = StatusResolver::new(None, Some(expr("$ctx:outcome"))).unwrap();
        assert_eq!(from_property.resolve(&ctx!(reg, msg)), Status::Failure);

        let empty = StatusResolver::new(Some("failure"), Some(expr("/route/none"))).unwrap();
        assert_eq!(empty.resolve(&ctx!(reg, msg)), Status::Failure);

        assert_eq!(StatusResolver::default().resolve(&ctx!(reg, msg)), Status::Unknown);
    }

    #[test]
    fn test_direction_defaulting() {
        let reg = registry();
        let msg = message();

        let only_to = ApplicationResolvers::new(None, Some(FieldSource::fixed("app01"))).unwrap();
        assert_eq!(only_to.from, ApplicationSide::SelfKey);
        assert_eq!(
            only_to.resolve(&ctx!(reg, msg)),
            (Some("esb".to_string()), Some("app01".to_string()))
        );

        let only_from =
            ApplicationResolvers::new(Some(FieldSource::dynamic(expr("/route/source"))), None).unwrap();
        assert_eq!(
            only_from.resolve(&ctx!(reg, msg)),
            (Some("app02".to_string()), Some("esb".to_string()))
        );

        let both = ApplicationResolvers::new(
            Some(FieldSource::fixed("app01")),
            Some(FieldSource::fixed("app02")),
        )
        .unwrap();
        assert_eq!(
            both.resolve(&ctx!(reg, msg)),
            (Some("app01".to_string()), Some("app02".to_string()))
        );

        assert!(matches!(
            ApplicationResolvers::new(None, Some(FieldSource::default())),
            Err(ConfigError::MissingDirection)
        ));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("from".parse::<Direction>(), Ok(Direction::From));
        assert_eq!("to".parse::<Direction>(), Ok(Direction::To));
        assert_eq!(Direction::To.to_string(), "to");
        assert!("sideways".parse::<Direction>().is_err());
    }
}
