//! Typed triples and the closed entity/relationship schemas
//!
//! A triple is `(subject, predicate, object)` with optional typed ends.
//! Types come from a closed schema; unknown strings are preserved as
//! free-form (untyped triples stay legal for backward compatibility).
//! Normalization is case-insensitive.

use serde::{Deserialize, Serialize};

/// Closed entity-type schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    // Code
    Package,
    Module,
    Class,
    Method,
    Function,
    Interface,
    Enum,
    // Documentation
    DesignDoc,
    UserDoc,
    Prd,
    Runbook,
    Readme,
    ApiDoc,
    // Infrastructure
    Service,
    Endpoint,
    Config,
    Dependency,
    /// Free-form type outside the closed schema
    Other(String),
}

impl EntityType {
    /// Normalize a raw string into the closed schema, case-insensitively
    pub fn normalize(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "package" => Self::Package,
            "module" => Self::Module,
            "class" | "struct" | "impl" => Self::Class,
            "method" => Self::Method,
            "function" => Self::Function,
            "interface" | "trait" => Self::Interface,
            "enum" => Self::Enum,
            "designdoc" | "design_doc" => Self::DesignDoc,
            "userdoc" | "user_doc" => Self::UserDoc,
            "prd" => Self::Prd,
            "runbook" => Self::Runbook,
            "readme" => Self::Readme,
            "apidoc" | "api_doc" => Self::ApiDoc,
            "service" => Self::Service,
            "endpoint" => Self::Endpoint,
            "config" => Self::Config,
            "dependency" => Self::Dependency,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Canonical lowercase label
    pub fn label(&self) -> String {
        match self {
            Self::Package => "package".to_string(),
            Self::Module => "module".to_string(),
            Self::Class => "class".to_string(),
            Self::Method => "method".to_string(),
            Self::Function => "function".to_string(),
            Self::Interface => "interface".to_string(),
            Self::Enum => "enum".to_string(),
            Self::DesignDoc => "designdoc".to_string(),
            Self::UserDoc => "userdoc".to_string(),
            Self::Prd => "prd".to_string(),
            Self::Runbook => "runbook".to_string(),
            Self::Readme => "readme".to_string(),
            Self::ApiDoc => "apidoc".to_string(),
            Self::Service => "service".to_string(),
            Self::Endpoint => "endpoint".to_string(),
            Self::Config => "config".to_string(),
            Self::Dependency => "dependency".to_string(),
            Self::Other(raw) => raw.to_lowercase(),
        }
    }
}

/// Closed relationship vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Calls,
    Extends,
    Implements,
    Imports,
    Contains,
    References,
    DependsOn,
    DefinedIn,
    /// Free-form predicate outside the closed vocabulary
    #[serde(untagged)]
    Other(String),
}

impl Relationship {
    /// Normalize a raw string into the closed vocabulary, case-insensitively
    pub fn normalize(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "calls" => Self::Calls,
            "extends" => Self::Extends,
            "implements" => Self::Implements,
            "imports" => Self::Imports,
            "contains" => Self::Contains,
            "references" => Self::References,
            "depends_on" | "dependson" => Self::DependsOn,
            "defined_in" | "definedin" => Self::DefinedIn,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Canonical snake_case label
    pub fn label(&self) -> String {
        match self {
            Self::Calls => "calls".to_string(),
            Self::Extends => "extends".to_string(),
            Self::Implements => "implements".to_string(),
            Self::Imports => "imports".to_string(),
            Self::Contains => "contains".to_string(),
            Self::References => "references".to_string(),
            Self::DependsOn => "depends_on".to_string(),
            Self::DefinedIn => "defined_in".to_string(),
            Self::Other(raw) => raw.to_lowercase(),
        }
    }
}

/// A knowledge-graph edge with optional typed ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    /// Subject entity identity string
    pub subject: String,
    /// Relationship between subject and object
    pub predicate: Relationship,
    /// Object entity identity string
    pub object: String,
    /// Subject's type, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<EntityType>,
    /// Object's type, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<EntityType>,
    /// The chunk this triple was extracted from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

impl Triple {
    /// Build an untyped triple
    pub fn untyped(subject: &str, predicate: Relationship, object: &str) -> Self {
        Self {
            subject: subject.to_string(),
            predicate,
            object: object.to_string(),
            subject_type: None,
            object_type: None,
            chunk_id: None,
        }
    }

    /// Dedupe key: `(subject, predicate, object)`
    pub fn key(&self) -> (String, String, String) {
        (
            self.subject.clone(),
            self.predicate.label(),
            self.object.clone(),
        )
    }

    /// Text rendering used for keyword seeding
    pub fn as_text(&self) -> String {
        format!("{} {} {}", self.subject, self.predicate.label(), self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_normalization_is_case_insensitive() {
        assert_eq!(EntityType::normalize("Class"), EntityType::Class);
        assert_eq!(EntityType::normalize("CLASS"), EntityType::Class);
        assert_eq!(EntityType::normalize("struct"), EntityType::Class);
        assert_eq!(EntityType::normalize("Trait"), EntityType::Interface);
        assert_eq!(
            EntityType::normalize("Widget"),
            EntityType::Other("Widget".to_string())
        );
    }

    #[test]
    fn relationship_normalization() {
        assert_eq!(Relationship::normalize("Calls"), Relationship::Calls);
        assert_eq!(Relationship::normalize("DEPENDS_ON"), Relationship::DependsOn);
        assert_eq!(
            Relationship::normalize("mentions"),
            Relationship::Other("mentions".to_string())
        );
    }

    #[test]
    fn triple_key_and_text() {
        let triple = Triple::untyped("Indexer", Relationship::Calls, "Splitter");
        assert_eq!(
            triple.key(),
            ("Indexer".to_string(), "calls".to_string(), "Splitter".to_string())
        );
        assert_eq!(triple.as_text(), "Indexer calls Splitter");
    }
}
