//! Expression compilation and evaluation against in-flight messages.
//!
//! Expressions are compiled once at setup. Evaluation goes through the
//! [`ExpressionEvaluator`] capability, which normalizes every result into an
//! ordered sequence of strings.
//!
//! Grammar:
//! - `$ctx:NAME` - message-scoped property
//! - `$trp:NAME` - carrier-level header
//! - `/a/b/[0]/@attr`, `/a/*/text()` - location path into the body
//! - `string(PATH)`, `count(PATH)` - atomic results
//! - `'literal'` - atomic string literal

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::{ExpressionError, ParseError};
use crate::extraction::{FieldPath, Node};
use crate::runtime::message::{property_text, InboundMessage};

/// Prefix addressing message-scoped properties.
pub const PROPERTY_SCOPE_PREFIX: &str = "$ctx:";

/// Prefix addressing carrier-level headers.
pub const HEADER_SCOPE_PREFIX: &str = "$trp:";

fn scope_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$(ctx|trp):([A-Za-z_][\w.\-]*)$").expect("valid regex"))
}

fn function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z][\w\-]*)\((.*)\)$").expect("valid regex"))
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\*{1,2}|\[\d+\]|@[\w.\-:#]+|text\(\)|[\w.\-:#]+)$").expect("valid regex")
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Compiled {
    Literal(String),
    Property(String),
    Header(String),
    Path(FieldPath),
    StringOf(FieldPath),
    CountOf(FieldPath),
}

/// A compiled path expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    compiled: Compiled,
}

impl Expression {
    /// Compile an expression, rejecting malformed syntax.
    pub fn compile(text: &str) -> Result<Self, ExpressionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ExpressionError::Empty);
        }

        let compiled = if let Some(caps) = scope_regex().captures(trimmed) {
            let name = caps[2].to_string();
            if &caps[1] == "ctx" {
                Compiled::Property(name)
            } else {
                Compiled::Header(name)
            }
        } else if trimmed.starts_with('$') {
            return Err(syntax(trimmed, "expected $ctx:NAME or $trp:NAME"));
        } else if let Some(literal) = trimmed
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            if literal.contains('\'') {
                return Err(syntax(trimmed, "unbalanced quotes"));
            }
            Compiled::Literal(literal.to_string())
        } else if let Some(caps) = function_regex().captures(trimmed) {
            let path = compile_path(trimmed, caps[2].trim())?;
            match &caps[1] {
                "string" => Compiled::StringOf(path),
                "count" => Compiled::CountOf(path),
                other => return Err(syntax(trimmed, &format!("unknown function '{}'", other))),
            }
        } else {
            Compiled::Path(compile_path(trimmed, trimmed)?)
        };

        Ok(Self {
            text: trimmed.to_string(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether this expression reads a property or header scope.
    pub fn is_scoped(&self) -> bool {
        matches!(self.compiled, Compiled::Property(_) | Compiled::Header(_))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

fn syntax(expression: &str, reason: &str) -> ExpressionError {
    ExpressionError::Syntax {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

fn compile_path(expression: &str, path: &str) -> Result<FieldPath, ExpressionError> {
    if !path.starts_with('/') {
        return Err(syntax(expression, "location paths must start with '/'"));
    }

    let raw_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for segment in &raw_segments {
        if !segment_regex().is_match(segment) {
            return Err(syntax(expression, &format!("invalid path step '{}'", segment)));
        }
    }

    let field_path = FieldPath::from_slashed(path);
    let last = field_path.segments.len().saturating_sub(1);
    if field_path
        .segments
        .iter()
        .enumerate()
        .any(|(i, segment)| segment.is_terminal() && i != last)
    {
        return Err(syntax(expression, "attribute and text() steps must end the path"));
    }

    Ok(field_path)
}

/// Raw result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutput {
    Atomic(String),
    Nodes(Vec<Node>),
}

impl EvalOutput {
    /// Coerce into an ordered sequence of strings.
    ///
    /// Atomic values become a one-element sequence. Nodes map to their text
    /// and nodes with empty text are dropped.
    pub fn into_strings(self) -> Vec<String> {
        match self {
            EvalOutput::Atomic(value) => vec![value],
            EvalOutput::Nodes(nodes) => nodes
                .iter()
                .map(Node::text)
                .filter(|text| !text.is_empty())
                .collect(),
        }
    }
}

/// Capability to evaluate a compiled expression against a message.
pub trait ExpressionEvaluator: Send + Sync {
    /// Short adapter name, used in logs.
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        expr: &Expression,
        message: &dyn InboundMessage,
    ) -> Result<EvalOutput, ExpressionError>;

    /// Evaluate and coerce into the full string sequence.
    fn evaluate_all(
        &self,
        expr: &Expression,
        message: &dyn InboundMessage,
    ) -> Result<Vec<String>, ExpressionError> {
        Ok(self.evaluate(expr, message)?.into_strings())
    }

    /// First element of the coerced sequence, if any.
    fn first_value(
        &self,
        expr: &Expression,
        message: &dyn InboundMessage,
    ) -> Result<Option<String>, ExpressionError> {
        Ok(self.evaluate_all(expr, message)?.into_iter().next())
    }
}

fn evaluate_body(expr: &Expression, message: &dyn InboundMessage) -> Result<EvalOutput, ExpressionError> {
    let select = |path: &FieldPath| -> Vec<Node> {
        message.body().map(|body| path.select(body)).unwrap_or_default()
    };

    match &expr.compiled {
        Compiled::Literal(value) => Ok(EvalOutput::Atomic(value.clone())),
        Compiled::Path(path) => Ok(EvalOutput::Nodes(select(path))),
        Compiled::StringOf(path) => Ok(EvalOutput::Atomic(
            select(path).first().map(Node::text).unwrap_or_default(),
        )),
        Compiled::CountOf(path) => Ok(EvalOutput::Atomic(select(path).len().to_string())),
        Compiled::Property(_) | Compiled::Header(_) => {
            Err(ExpressionError::Unsupported(expr.text.clone()))
        }
    }
}

/// Evaluator for hosts older than 4.8: body paths, functions and literals.
#[derive(Debug, Default, Clone, Copy)]
pub struct BodyPathEvaluator;

impl ExpressionEvaluator for BodyPathEvaluator {
    fn name(&self) -> &'static str {
        "body-path"
    }

    fn evaluate(
        &self,
        expr: &Expression,
        message: &dyn InboundMessage,
    ) -> Result<EvalOutput, ExpressionError> {
        evaluate_body(expr, message)
    }
}

/// Evaluator for hosts 4.8 and later: adds `$ctx:` and `$trp:` scopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScopedPathEvaluator;

impl ExpressionEvaluator for ScopedPathEvaluator {
    fn name(&self) -> &'static str {
        "scoped-path"
    }

    fn evaluate(
        &self,
        expr: &Expression,
        message: &dyn InboundMessage,
    ) -> Result<EvalOutput, ExpressionError> {
        match &expr.compiled {
            Compiled::Property(name) => Ok(match message.property(name) {
                None | Some(serde_json::Value::Null) => EvalOutput::Nodes(Vec::new()),
                Some(value) => EvalOutput::Atomic(property_text(value)),
            }),
            Compiled::Header(name) => match message.header(name) {
                Ok(Some(value)) => Ok(EvalOutput::Atomic(value)),
                Ok(None) => Ok(EvalOutput::Nodes(Vec::new())),
                Err(e) => Err(ExpressionError::Evaluation {
                    expression: expr.text.clone(),
                    reason: e.to_string(),
                }),
            },
            _ => evaluate_body(expr, message),
        }
    }
}

/// Host API generation, probed once at startup to pick an evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostApi {
    Legacy,
    #[default]
    Scoped,
}

impl HostApi {
    /// First host version exposing scoped expressions.
    pub const SCOPED_SINCE: (u32, u32) = (4, 8);

    /// Pick the API generation from a `major.minor[.patch]` host version.
    pub fn probe(version: &str) -> Result<Self, ParseError> {
        let mut parts = version.trim().split('.');
        let mut number = || -> Result<u32, ParseError> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| ParseError::new("host version", version))
        };
        let major = number()?;
        let minor = number()?;

        if (major, minor) >= Self::SCOPED_SINCE {
            Ok(HostApi::Scoped)
        } else {
            Ok(HostApi::Legacy)
        }
    }

    pub fn evaluator(self) -> Arc<dyn ExpressionEvaluator> {
        match self {
            HostApi::Legacy => Arc::new(BodyPathEvaluator),
            HostApi::Scoped => Arc::new(ScopedPathEvaluator),
        }
    }
}

impl fmt::Display for HostApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostApi::Legacy => f.write_str("legacy"),
            HostApi::Scoped => f.write_str("scoped"),
        }
    }
}

impl FromStr for HostApi {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(HostApi::Legacy),
            "scoped" => Ok(HostApi::Scoped),
            other => Err(ParseError::new("host api", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::message::EnvelopeMessage;
    use serde_json::json;

    fn message() -> EnvelopeMessage {
        EnvelopeMessage::new(json!({
            "order": {
                "id": "A-1",
                "lines": [
                    {"sku": "X1"},
                    {"sku": ""},
                    {"sku": "X3"}
                ]
            }
        }))
        .with_property("channel", "web")
        .with_property("retries", 2)
        .with_header("X-Tenant", "acme")
        .with_header("X-Count", 5)
    }

    fn compile(text: &str) -> Expression {
        Expression::compile(text).unwrap()
    }

    #[test]
    fn test_compile_rejects_malformed() {
        assert_eq!(Expression::compile("  "), Err(ExpressionError::Empty));
        assert!(Expression::compile("order/id").is_err());
        assert!(Expression::compile("/order/[x]").is_err());
        assert!(Expression::compile("/order/[0").is_err());
        assert!(Expression::compile("/order/@id/name").is_err());
        assert!(Expression::compile("upper(/order/id)").is_err());
        assert!(Expression::compile("$env:HOME").is_err());
        assert!(Expression::compile("'it's'").is_err());
    }

    #[test]
    fn test_compile_accepts_grammar() {
        for text in [
            "/order/id",
            "/order/lines/*/sku",
            "/order/lines/[0]/sku/text()",
            "/order/@currency",
            "string(/order/id)",
            "count(/order/lines)",
            "'fixed'",
            "$ctx:channel",
            "$trp:X-Tenant",
        ] {
            assert!(Expression::compile(text).is_ok(), "{} should compile", text);
        }
        assert_eq!(compile(" /order/id ").to_string(), "/order/id");
        assert!(compile("$ctx:channel").is_scoped());
        assert!(!compile("/order/id").is_scoped());
    }

    #[test]
    fn test_node_sequence_drops_empty_text() {
        let values = ScopedPathEvaluator
            .evaluate_all(&compile("/order/lines/sku"), &message())
            .unwrap();

        assert_eq!(values, vec!["X1", "X3"]);
    }

    #[test]
    fn test_atomic_results() {
        let msg = message();
        let eval = ScopedPathEvaluator;

        assert_eq!(
            eval.evaluate(&compile("count(/order/lines)"), &msg).unwrap(),
            EvalOutput::Atomic("3".to_string())
        );
        assert_eq!(
            eval.first_value(&compile("string(/order/id)"), &msg).unwrap(),
            Some("A-1".to_string())
        );
        assert_eq!(
            eval.first_value(&compile("'fixed'"), &msg).unwrap(),
            Some("fixed".to_string())
        );
    }

    #[test]
    fn test_first_value_of_empty_sequence() {
        let value = ScopedPathEvaluator
            .first_value(&compile("/order/missing"), &message())
            .unwrap();

        assert_eq!(value, None);
    }

    #[test]
    fn test_scoped_reads() {
        let msg = message();
        let eval = ScopedPathEvaluator;

        assert_eq!(
            eval.first_value(&compile("$ctx:channel"), &msg).unwrap(),
            Some("web".to_string())
        );
        assert_eq!(
            eval.first_value(&compile("$ctx:retries"), &msg).unwrap(),
            Some("2".to_string())
        );
        assert_eq!(eval.first_value(&compile("$ctx:missing"), &msg).unwrap(), None);
        assert_eq!(
            eval.first_value(&compile("$trp:X-Tenant"), &msg).unwrap(),
            Some("acme".to_string())
        );
        assert!(matches!(
            eval.first_value(&compile("$trp:X-Count"), &msg),
            Err(ExpressionError::Evaluation { .. })
        ));
    }

    #[test]
    fn test_legacy_evaluator_rejects_scopes() {
        let msg = message();

        assert!(matches!(
            BodyPathEvaluator.evaluate(&compile("$ctx:channel"), &msg),
            Err(ExpressionError::Unsupported(_))
        ));
        assert_eq!(
            BodyPathEvaluator
                .first_value(&compile("/order/id"), &msg)
                .unwrap(),
            Some("A-1".to_string())
        );
    }

    #[test]
    fn test_host_api_probe() {
        assert_eq!(HostApi::probe("4.8.0"), Ok(HostApi::Scoped));
        assert_eq!(HostApi::probe("5.0"), Ok(HostApi::Scoped));
        assert_eq!(HostApi::probe("4.7.1"), Ok(HostApi::Legacy));
        assert!(HostApi::probe("four").is_err());
        assert!(HostApi::probe("4").is_err());

        assert_eq!(HostApi::Legacy.evaluator().name(), "body-path");
        assert_eq!(HostApi::Scoped.evaluator().name(), "scoped-path");
        assert_eq!("legacy".parse::<HostApi>(), Ok(HostApi::Legacy));
    }
}
