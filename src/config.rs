//! YAML configuration for the agent and for individual mediators.
//!
//! [`AgentConfig`] describes the process-wide agent: its registry contents,
//! host version and shipping parameters. [`MediatorConfig`] describes one
//! mediation point and is turned into a [`Mediator`] by [`MediatorFactory`],
//! which performs every setup-time validation.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent::{validate_agent, Agent, ChannelAgent};
use crate::error::ConfigError;
use crate::runtime::assembler::{CustomProperty, Mediator, DEFAULT_SEPARATOR};
use crate::runtime::correlation::CorrelationPropagator;
use crate::runtime::expression::{Expression, ExpressionEvaluator, HostApi};
use crate::runtime::location::MediatorLocation;
use crate::runtime::multi_id::{IdExpression, MultiIdResolver};
use crate::runtime::registry::{Category, ValueRegistry};
use crate::runtime::resolver::{
    ApplicationResolvers, ApplicationSide, FieldKind, FieldResolver, FieldSource, StatusResolver,
};
use crate::transaction::Transaction;

/// Environment variable naming the agent configuration file.
pub const AGENT_CONFIG_ENV: &str = "FLOWLOG_AGENT_CONFIG";

/// Server name used when nothing else is available.
pub const DEFAULT_SERVER_NAME: &str = "localhost";

fn default_enabled() -> bool {
    true
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Batching parameters of the transaction shipper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "TransportConfig::default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "TransportConfig::default_size_threshold")]
    pub size_threshold: usize,
}

impl TransportConfig {
    fn default_interval_ms() -> u64 {
        5000
    }

    fn default_size_threshold() -> usize {
        100
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            interval_ms: Self::default_interval_ms(),
            size_threshold: Self::default_size_threshold(),
        }
    }
}

/// Process-wide agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Host version, used to pick the expression evaluator.
    #[serde(default)]
    pub host_version: Option<String>,

    #[serde(default)]
    pub server_name: Option<String>,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Key -> display entry, per registry category
    #[serde(default)]
    pub applications: IndexMap<String, String>,

    #[serde(default)]
    pub operations: IndexMap<String, String>,

    #[serde(default)]
    pub payload_types: IndexMap<String, String>,

    #[serde(default)]
    pub id_types: IndexMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host_version: None,
            server_name: None,
            transport: TransportConfig::default(),
            applications: IndexMap::new(),
            operations: IndexMap::new(),
            payload_types: IndexMap::new(),
            id_types: IndexMap::new(),
        }
    }
}

impl AgentConfig {
    /// Load agent configuration from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use flowlog::config::AgentConfig;
    ///
    /// let config = AgentConfig::load_from_file("config/agent.yaml")?;
    /// println!("applications: {:?}", config.applications.keys());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&read_file(path.as_ref())?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Build the value registry from the configured categories.
    pub fn registry(&self) -> ValueRegistry {
        ValueRegistry::new()
            .with_entries(Category::Applications, self.applications.clone())
            .with_entries(Category::Operations, self.operations.clone())
            .with_entries(Category::PayloadTypes, self.payload_types.clone())
            .with_entries(Category::IdTypes, self.id_types.clone())
    }

    /// Host API generation. Without a host version the scoped API is
    /// assumed.
    pub fn host_api(&self) -> Result<HostApi, ConfigError> {
        match self.host_version.as_deref() {
            Some(version) => Ok(HostApi::probe(version)?),
            None => Ok(HostApi::default()),
        }
    }

    /// Server name reported in transaction metadata.
    ///
    /// First non-empty of `COMPUTERNAME`, `HOSTNAME`, the configured name and
    /// `localhost`.
    pub fn resolve_server_name(&self) -> String {
        first_non_empty([
            std::env::var("COMPUTERNAME").ok(),
            std::env::var("HOSTNAME").ok(),
            self.server_name.clone(),
        ])
    }

    /// Build the default channel agent. The receiver goes to the shipper.
    pub fn build_agent(&self) -> (ChannelAgent, mpsc::UnboundedReceiver<Transaction>) {
        ChannelAgent::new(self.enabled, Arc::new(self.registry()))
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string())
}

/// Registry-backed field: a static key and/or an expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Free-text field: a static value and/or an expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdConfig {
    pub type_key: String,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Configuration of one mediation point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediatorConfig {
    pub location: MediatorLocation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_expression: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<KeyedField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ValueField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ApplicationField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ApplicationField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<KeyedField>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<IdConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_ids: Option<ValueField>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyConfig>,
}

impl MediatorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&read_file(path.as_ref())?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Turn a built mediator back into its configuration.
    ///
    /// Implicit self directions and the default separator are left out, so
    /// building the result again gives an equivalent mediator.
    pub fn from_mediator(mediator: &Mediator) -> Self {
        let application = |side: &ApplicationSide| {
            side.resolver().map(|resolver| ApplicationField {
                application_key: resolver.source().static_value.clone(),
                expression: expression_text(resolver.source().expression.as_ref()),
            })
        };

        Self {
            location: mediator.location().clone(),
            separator: Some(mediator.separator().to_string())
                .filter(|separator| separator != DEFAULT_SEPARATOR),
            status: mediator.status().static_status().map(|s| s.to_string()),
            status_expression: expression_text(mediator.status().expression()),
            operation: keyed_field(mediator.operation().source()),
            message: value_field(mediator.message().source()),
            from: application(&mediator.applications().from),
            to: application(&mediator.applications().to),
            payload_type: keyed_field(mediator.payload_type().source()),
            ids: mediator
                .ids()
                .iter()
                .map(|id| IdConfig {
                    type_key: id.type_key.clone(),
                    expression: id.expression.to_string(),
                })
                .collect(),
            multi_ids: value_field(mediator.multi_ids().source()),
            properties: mediator
                .properties()
                .iter()
                .map(|property| PropertyConfig {
                    name: property.name.clone(),
                    value: property.value.clone(),
                    expression: expression_text(property.expression.as_ref()),
                })
                .collect(),
        }
    }
}

fn expression_text(expression: Option<&Expression>) -> Option<String> {
    expression.map(|e| e.to_string())
}

fn keyed_field(source: &FieldSource) -> Option<KeyedField> {
    source.is_configured().then(|| KeyedField {
        key: source.static_value.clone(),
        expression: expression_text(source.expression.as_ref()),
    })
}

fn value_field(source: &FieldSource) -> Option<ValueField> {
    source.is_configured().then(|| ValueField {
        value: source.static_value.clone(),
        expression: expression_text(source.expression.as_ref()),
    })
}

/// Builds mediators against one shared agent and evaluator.
pub struct MediatorFactory {
    agent: Arc<dyn Agent>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    server_name: String,
}

impl MediatorFactory {
    pub fn new(agent: Arc<dyn Agent>, host_api: HostApi, server_name: impl Into<String>) -> Self {
        tracing::debug!(%host_api, "selected expression evaluator");
        Self {
            agent,
            evaluator: host_api.evaluator(),
            server_name: server_name.into(),
        }
    }

    /// Factory using the host API and server name of an agent configuration.
    pub fn from_agent_config(config: &AgentConfig, agent: Arc<dyn Agent>) -> Result<Self, ConfigError> {
        Ok(Self::new(agent, config.host_api()?, config.resolve_server_name()))
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Build and validate a mediator.
    pub fn create(&self, config: &MediatorConfig) -> Result<Mediator, ConfigError> {
        validate_agent(self.agent.as_ref())?;
        let registry = self.agent.registry();

        let status = StatusResolver::new(
            config.status.as_deref(),
            compile(config.status_expression.as_deref(), FieldKind::Status.element())?,
        )?;

        let operation = FieldResolver::new(
            FieldKind::Operation,
            keyed_source(config.operation.as_ref(), FieldKind::Operation)?,
        );
        operation.validate_static(registry)?;

        let application_source = |field: Option<&ApplicationField>, kind: FieldKind| {
            field
                .map(|field| {
                    Ok::<_, ConfigError>(FieldSource::new(
                        field.application_key.clone(),
                        compile(field.expression.as_deref(), kind.element())?,
                    ))
                })
                .transpose()
        };
        let applications = ApplicationResolvers::new(
            application_source(config.from.as_ref(), FieldKind::FromApplication)?,
            application_source(config.to.as_ref(), FieldKind::ToApplication)?,
        )?;
        applications.validate_static(registry)?;

        let payload_type = FieldResolver::new(
            FieldKind::PayloadType,
            keyed_source(config.payload_type.as_ref(), FieldKind::PayloadType)?,
        );
        payload_type.validate_static(registry)?;

        let message = FieldResolver::new(
            FieldKind::Message,
            value_source(config.message.as_ref(), FieldKind::Message)?,
        );

        let ids = config
            .ids
            .iter()
            .map(|id| {
                let expression = Expression::compile(&id.expression)
                    .map_err(|source| ConfigError::InvalidExpression { element: "ids", source })?;
                IdExpression::new(id.type_key.as_str(), expression, registry)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let multi_ids = MultiIdResolver::new(value_source(config.multi_ids.as_ref(), FieldKind::MultiIds)?);

        let properties = config
            .properties
            .iter()
            .map(|property| {
                Ok::<_, ConfigError>(CustomProperty::new(
                    property.name.as_str(),
                    property.value.clone(),
                    compile(property.expression.as_deref(), "property")?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let separator = config
            .separator
            .clone()
            .filter(|separator| !separator.is_empty())
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string());

        tracing::debug!(location = %config.location, "mediator created");

        Ok(Mediator {
            location: config.location.clone(),
            server_name: self.server_name.clone(),
            separator,
            status,
            applications,
            payload_type,
            message,
            correlation: CorrelationPropagator::new(operation),
            multi_ids,
            ids,
            properties,
            agent: Arc::clone(&self.agent),
            evaluator: Arc::clone(&self.evaluator),
        })
    }
}

fn compile(expression: Option<&str>, element: &'static str) -> Result<Option<Expression>, ConfigError> {
    expression
        .map(|text| Expression::compile(text).map_err(|source| ConfigError::InvalidExpression { element, source }))
        .transpose()
}

fn keyed_source(field: Option<&KeyedField>, kind: FieldKind) -> Result<FieldSource, ConfigError> {
    Ok(match field {
        Some(field) => FieldSource::new(field.key.clone(), compile(field.expression.as_deref(), kind.element())?),
        None => FieldSource::default(),
    })
}

fn value_source(field: Option<&ValueField>, kind: FieldKind) -> Result<FieldSource, ConfigError> {
    Ok(match field {
        Some(field) => FieldSource::new(field.value.clone(), compile(field.expression.as_deref(), kind.element())?),
        None => FieldSource::default(),
    })
}
