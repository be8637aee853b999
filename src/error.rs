//! Error types shared across the crate.
//!
//! [`ConfigError`] is only produced while building a mediator. Every other
//! error is recovered at mediation time.

use std::path::PathBuf;

/// Fatal errors raised while loading configuration or building a mediator.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid status '{value}', must be one of: success, failure, unknown")]
    InvalidStatus { value: String },

    #[error("{category} '{key}' at {element} is not defined in the agent configuration")]
    UnknownKey {
        category: &'static str,
        key: String,
        element: &'static str,
    },

    #[error("invalid expression at {element}: {source}")]
    InvalidExpression {
        element: &'static str,
        #[source]
        source: ExpressionError,
    },

    #[error("either 'from' or 'to' must be configured")]
    MissingDirection,

    #[error("application with key '{0}' must be configured when the agent is enabled")]
    MissingSelfApplication(String),

    #[error("invalid value: {0}")]
    Parse(#[from] ParseError),
}

/// Failure to compile or evaluate a path expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("syntax error in '{expression}': {reason}")]
    Syntax { expression: String, reason: String },

    #[error("'{0}' is not supported by this host evaluator")]
    Unsupported(String),

    #[error("evaluation of '{expression}' failed: {reason}")]
    Evaluation { expression: String, reason: String },
}

/// Unknown input while parsing a closed set of string-keyed variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Reading a header or property whose stored value has the wrong type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("property '{key}' holds a {actual} value, expected a string")]
pub struct PropertyError {
    pub key: String,
    pub actual: &'static str,
}

/// Failure handing a transaction over to an agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent channel is closed")]
    ChannelClosed,

    #[error("agent is disabled")]
    Disabled,
}

/// Pass-level failure, caught and logged by `Mediator::mediate`.
#[derive(Debug, thiserror::Error)]
pub enum MediationError {
    #[error("transaction handoff failed: {0}")]
    Handoff(#[from] AgentError),
}
