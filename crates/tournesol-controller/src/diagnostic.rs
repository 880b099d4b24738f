/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Diagnostic Extraction
//!
//! Turns one analysis `Result` resource into a [`Diagnostic`]. Extraction never
//! fails: missing or malformed fields become empty strings, and later stages
//! are expected to cope with an empty error or solution.
//!
//! The resource carries `spec.name` (either `namespace/name` or a bare name),
//! `spec.kind` and `spec.details`, the latter shaped like:
//!
//! ```text
//! Error: <what went wrong>
//!
//! Solution: <what to change>
//! ```

use kube::api::DynamicObject;
use serde::Deserialize;

const DEFAULT_NAMESPACE: &str = "default";
const ERROR_PREFIX: &str = "Error: ";
const SOLUTION_PREFIX: &str = "Solution: ";

/// Fields read from a diagnostic resource before interpretation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDiagnostic {
    pub uid: Option<String>,
    pub metadata_name: Option<String>,
    pub metadata_namespace: Option<String>,
    pub resource_version: Option<String>,
    /// `spec.name`
    pub name: String,
    /// `spec.kind`
    pub kind: String,
    /// `spec.details`
    pub details: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResultSpec {
    name: String,
    kind: String,
    details: String,
}

impl RawDiagnostic {
    /// Reads the raw record from a watched object. A missing or oddly shaped
    /// `spec` yields empty fields.
    pub fn from_object(obj: &DynamicObject) -> Self {
        let spec = obj
            .data
            .get("spec")
            .cloned()
            .and_then(|v| serde_json::from_value::<ResultSpec>(v).ok())
            .unwrap_or_default();

        Self {
            uid: obj.metadata.uid.clone(),
            metadata_name: obj.metadata.name.clone(),
            metadata_namespace: obj.metadata.namespace.clone(),
            resource_version: obj.metadata.resource_version.clone(),
            name: spec.name,
            kind: spec.kind,
            details: spec.details,
        }
    }

    /// Stable dedup key: the resource UID, else the resource name.
    pub fn identity(&self) -> String {
        non_empty(self.uid.as_deref())
            .or_else(|| non_empty(self.metadata_name.as_deref()))
            .unwrap_or_default()
            .to_string()
    }
}

/// One detected cluster problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub identity: String,
    /// `spec.name` as written on the resource
    pub resource_name: String,
    pub kind: String,
    pub namespace: String,
    pub error_text: String,
    pub solution_text: String,
}

impl Diagnostic {
    /// Name of the affected object without its namespace qualifier.
    pub fn short_name(&self) -> &str {
        match self.resource_name.split_once('/') {
            Some((_, name)) => name,
            None => &self.resource_name,
        }
    }
}

/// Builds a [`Diagnostic`] from the raw record.
pub fn extract(raw: &RawDiagnostic) -> Diagnostic {
    let (error_text, solution_text) = split_details(&raw.details);
    Diagnostic {
        identity: raw.identity(),
        resource_name: raw.name.clone(),
        kind: raw.kind.clone(),
        namespace: resolve_namespace(&raw.name, raw.metadata_namespace.as_deref()),
        error_text,
        solution_text,
    }
}

/// Namespace resolution order: the `namespace/` prefix of the name, then the
/// fallback namespace, then `"default"`.
pub fn resolve_namespace(name: &str, fallback: Option<&str>) -> String {
    if let Some((ns, _)) = name.split_once('/') {
        if !ns.is_empty() {
            return ns.to_string();
        }
    }
    non_empty(fallback).unwrap_or(DEFAULT_NAMESPACE).to_string()
}

/// Splits `details` at the first blank line into (error, solution).
pub fn split_details(details: &str) -> (String, String) {
    let (error_part, solution_part) = match details.split_once("\n\n") {
        Some((e, s)) => (e, s),
        None => (details, ""),
    };
    (
        strip_prefix(error_part, ERROR_PREFIX),
        strip_prefix(solution_part, SOLUTION_PREFIX),
    )
}

fn strip_prefix(text: &str, prefix: &str) -> String {
    let text = text.trim();
    text.strip_prefix(prefix.trim_end())
        .map(str::trim_start)
        .unwrap_or(text)
        .to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
