//! Where a mediator is declared, attached to transactions as metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Kind of artifact hosting a mediator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArtifactType {
    Api,
    ProxyService,
    Sequence,
}

impl ArtifactType {
    /// Tag name used in configuration.
    pub fn tag_name(&self) -> &'static str {
        match self {
            ArtifactType::Api => "api",
            ArtifactType::ProxyService => "proxy",
            ArtifactType::Sequence => "sequence",
        }
    }

    /// Type name reported in metadata.
    pub fn type_name(&self) -> &'static str {
        match self {
            ArtifactType::Api => "api",
            ArtifactType::ProxyService => "proxyService",
            ArtifactType::Sequence => "sequence",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for ArtifactType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(ArtifactType::Api),
            "proxy" => Ok(ArtifactType::ProxyService),
            "sequence" => Ok(ArtifactType::Sequence),
            other => Err(ParseError::new("artifact type", other)),
        }
    }
}

impl TryFrom<String> for ArtifactType {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactType> for String {
    fn from(value: ArtifactType) -> Self {
        value.tag_name().to_string()
    }
}

/// Artifact and line a mediator was declared at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediatorLocation {
    pub artifact_type: ArtifactType,
    pub artifact_name: String,
    #[serde(default)]
    pub line_number: u32,
}

impl MediatorLocation {
    pub fn new(artifact_type: ArtifactType, artifact_name: impl Into<String>, line_number: u32) -> Self {
        Self {
            artifact_type,
            artifact_name: artifact_name.into(),
            line_number,
        }
    }
}

impl fmt::Display for MediatorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}:{}", self.artifact_type, self.artifact_name, self.line_number)
    }
}
