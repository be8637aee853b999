//! Business identifier extraction.
//!
//! Two sources feed a transaction's ids: a compound `type=v1,v2||type=v3`
//! string (static or evaluated), and one expression per declared id type.

use indexmap::IndexMap;

use crate::error::ConfigError;
use crate::runtime::expression::Expression;
use crate::runtime::registry::{Category, ValueRegistry};
use crate::runtime::resolver::{FieldKind, FieldSource, ResolveContext};
use crate::transaction::Transaction;

/// Separator between id groups.
pub const GROUP_DELIMITER: &str = "||";

/// Separator between an id type and its values.
pub const TYPE_DELIMITER: char = '=';

/// Separator between values of one id type.
pub const VALUE_DELIMITER: char = ',';

/// Parse a compound id string into id type -> values.
///
/// Groups that do not split into exactly two parts on `=` are skipped.
/// Values are kept as written, empty tokens included. Unknown id types are
/// replaced by the id type sentinel, which is registered on first use.
pub fn parse_multi_ids(input: &str, registry: &ValueRegistry) -> IndexMap<String, Vec<String>> {
    let mut ids: IndexMap<String, Vec<String>> = IndexMap::new();

    for group in input.split(GROUP_DELIMITER) {
        let parts: Vec<&str> = group.split(TYPE_DELIMITER).collect();
        let (id_type, values) = match parts.as_slice() {
            [id_type, values] => (*id_type, *values),
            _ => {
                tracing::debug!(group, "skipping malformed id group");
                continue;
            }
        };

        let id_type = if registry.id_type_exists(id_type) {
            id_type.to_string()
        } else {
            tracing::warn!(
                id_type,
                fallback = Category::IdTypes.sentinel(),
                "id type '{}' is not configured, falling back to '{}'",
                id_type,
                Category::IdTypes.sentinel()
            );
            registry.ensure_sentinel(Category::IdTypes);
            Category::IdTypes.sentinel().to_string()
        };

        ids.entry(id_type)
            .or_default()
            .extend(values.split(VALUE_DELIMITER).map(str::to_string));
    }

    ids
}

/// Compound id source of a mediator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiIdResolver {
    source: FieldSource,
}

impl MultiIdResolver {
    pub fn new(source: FieldSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &FieldSource {
        &self.source
    }

    /// Evaluate the source and merge the parsed ids into the transaction.
    pub fn apply(&self, ctx: &ResolveContext<'_>, transaction: &mut Transaction) {
        let Some(raw) = self.source.candidate(FieldKind::MultiIds, ctx) else {
            return;
        };

        for (id_type, values) in parse_multi_ids(&raw, ctx.registry) {
            transaction.add_ids(id_type, values);
        }
    }
}

/// One declared id type with the expression extracting its values.
#[derive(Debug, Clone, PartialEq)]
pub struct IdExpression {
    pub type_key: String,
    pub expression: Expression,
}

impl IdExpression {
    /// Setup-time check that the id type is declared.
    pub fn new(
        type_key: impl Into<String>,
        expression: Expression,
        registry: &ValueRegistry,
    ) -> Result<Self, ConfigError> {
        let type_key = type_key.into();
        if !registry.id_type_exists(&type_key) {
            return Err(ConfigError::UnknownKey {
                category: Category::IdTypes.label(),
                key: type_key,
                element: "ids",
            });
        }
        Ok(Self {
            type_key,
            expression,
        })
    }

    /// Evaluate the full value sequence and merge it into the transaction.
    pub fn apply(&self, ctx: &ResolveContext<'_>, transaction: &mut Transaction) {
        match ctx.evaluator.evaluate_all(&self.expression, ctx.message) {
            Ok(values) => transaction.add_ids(self.type_key.clone(), values),
            Err(e) => tracing::warn!(
                id_type = %self.type_key,
                expression = %self.expression,
                error = %e,
                "error while resolving the id expression"
            ),
        }
    }
}
