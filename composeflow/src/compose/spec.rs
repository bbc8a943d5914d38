//! Composition spec validation.

use crate::errors::ValidationError;
use serde_yaml::Value;
use std::collections::BTreeSet;

/// Top-level key listing the services of a composition.
pub const SERVICES_KEY: &str = "services";

/// A parsed composition document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionSpec {
    raw_text: String,
    declared_services: BTreeSet<String>,
}

impl CompositionSpec {
    /// Parses and validates a composition document.
    ///
    /// A missing or empty `services` key yields an empty service set.
    /// Syntax errors, a non-mapping document, or a non-mapping `services`
    /// value are rejected.
    pub fn parse(raw_text: impl Into<String>) -> Result<Self, ValidationError> {
        let raw_text = raw_text.into();
        let document: Value =
            serde_yaml::from_str(&raw_text).map_err(|e| ValidationError::new(e.to_string()))?;

        let declared_services = match document {
            Value::Null => BTreeSet::new(),
            Value::Mapping(root) => match root.get(SERVICES_KEY) {
                None | Some(Value::Null) => BTreeSet::new(),
                Some(Value::Mapping(services)) => services.keys().map(key_name).collect(),
                Some(_) => {
                    return Err(ValidationError::new(format!(
                        "`{SERVICES_KEY}` must be a mapping of service names"
                    )))
                }
            },
            _ => {
                return Err(ValidationError::new(
                    "top-level document must be a mapping",
                ))
            }
        };

        Ok(Self {
            raw_text,
            declared_services,
        })
    }

    /// The document text as given.
    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Names of the declared services.
    #[must_use]
    pub fn declared_services(&self) -> &BTreeSet<String> {
        &self.declared_services
    }

    /// Number of declared services.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.declared_services.len()
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
