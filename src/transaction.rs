//! Transaction record produced by one mediation pass.
//!
//! A transaction is the unit handed to an agent. It is built fresh for every
//! pass and owned by the pass until handoff.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Outcome classification of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    #[default]
    Unknown,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Success, Status::Failure, Status::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseError;

    /// Exact, case-sensitive match against the three literals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Status::Success),
            "failure" => Ok(Status::Failure),
            "unknown" => Ok(Status::Unknown),
            other => Err(ParseError::new("status", other)),
        }
    }
}

/// One auditable record of a message passing a mediation point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub flow_id: Option<String>,
    pub operation_key: Option<String>,
    pub status: Status,
    pub from_key: Option<String>,
    pub to_key: Option<String>,
    pub payload_type_key: Option<String>,
    pub message: Option<String>,

    /// id type -> extracted values, in extraction order
    #[serde(default)]
    pub ids: IndexMap<String, Vec<String>>,

    #[serde(default)]
    pub metadata: IndexMap<String, String>,

    /// Set by the agent on handoff.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append values for an id type, creating the entry if needed. An empty
    /// value list leaves the ids untouched.
    pub fn add_ids(&mut self, type_key: impl Into<String>, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        self.ids.entry(type_key.into()).or_default().extend(values);
    }

    /// Add a metadata entry. Last write wins.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert to an NDJSON line (newline-delimited JSON)
    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        let json = self.to_json()?;
        Ok(format!("{}\n", json))
    }
}
