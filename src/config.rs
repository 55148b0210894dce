//! Configuration Management
//!
//! Organization configuration: which repositories to manage and the label
//! set they should converge to.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::github::DEFAULT_ENDPOINT;

/// Configuration file name looked up in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".org-labeler.yaml";

/// Environment variable holding the access token
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Desired Label
///
/// The canonical definition of a label, keyed by its name in [`OrgConfig::labels`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredLabel {
    /// Label color (6-digit hex code, # prefix optional)
    pub color: String,

    /// Label description
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,

    /// Existing label names to merge into this label
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

impl DesiredLabel {
    pub fn new(color: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            description: description.into(),
            synonyms: Vec::new(),
        }
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    /// Validate a label definition
    ///
    /// # Errors
    /// - If the name or a synonym is empty
    /// - If the color format is invalid
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::label_validation("Label name cannot be empty"));
        }

        if !is_valid_hex_color(&normalize_color(&self.color)) {
            return Err(Error::InvalidLabelColor(format!("{name}: {}", self.color)));
        }

        if self.synonyms.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::label_validation(format!(
                "Label {name} has an empty synonym"
            )));
        }

        Ok(())
    }
}

/// Desired labels keyed by canonical name, in configured order
pub type DesiredLabels = IndexMap<String, DesiredLabel>;

/// Organization Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgConfig {
    /// GitHub access token (CLI flag and environment take precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// API base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// GitHub organization
    #[serde(alias = "organisation")]
    pub organization: String,

    /// Repositories managed by this configuration
    #[serde(default)]
    pub project_repos: Vec<String>,

    /// Desired labels, in the order they are reconciled
    #[serde(default)]
    pub labels: DesiredLabels,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl OrgConfig {
    /// Validate configuration
    ///
    /// # Errors
    /// - If the organization or a repository name is empty
    /// - If the endpoint is not a URL
    /// - If there are issues with label configuration
    /// - If two label names differ only in case
    pub fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            return Err(Error::config_validation("Organization is required"));
        }

        if self.project_repos.iter().any(|r| r.trim().is_empty()) {
            return Err(Error::config_validation("Repository names cannot be empty"));
        }

        url::Url::parse(&self.endpoint).map_err(|e| {
            Error::config_validation(format!("Invalid endpoint {}: {e}", self.endpoint))
        })?;

        let mut seen = HashSet::new();
        for (name, label) in &self.labels {
            label.validate(name)?;
            if !seen.insert(name.to_lowercase()) {
                return Err(Error::config_validation(format!(
                    "Duplicate label name (case-insensitive): {name}"
                )));
            }
        }

        Ok(())
    }

    /// Strip `#` and lower-case every label color
    pub fn normalize(&mut self) {
        for label in self.labels.values_mut() {
            label.color = normalize_color(&label.color);
        }
    }
}

/// Normalize color (remove # and convert to lowercase)
pub fn normalize_color(color: &str) -> String {
    color.trim_start_matches('#').to_lowercase()
}

/// Validate hex color code
///
/// # Arguments
/// - `color`: Color code (6-digit hex without #)
fn is_valid_hex_color(color: &str) -> bool {
    if color.len() != 6 {
        return false;
    }

    color.chars().all(|c| c.is_ascii_hexdigit())
}

/// JSON Schema the raw configuration document must satisfy
fn config_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "access_token": { "type": "string" },
            "endpoint": { "type": "string" },
            "organization": { "type": "string" },
            "organisation": { "type": "string" },
            "project_repos": { "type": "array", "items": { "type": "string" } },
            "labels": {
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "properties": {
                        "color": { "type": "string" },
                        "description": { "type": ["string", "null"] },
                        "synonyms": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["color"],
                    "additionalProperties": false
                }
            }
        },
        "anyOf": [
            { "required": ["organization"] },
            { "required": ["organisation"] }
        ],
        "additionalProperties": false
    })
}

/// Check a raw document against [`config_schema`]
fn check_schema(document: &serde_json::Value) -> Result<()> {
    let schema = config_schema();
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| Error::config_validation(format!("Invalid configuration schema: {e}")))?;

    if let Err(errors) = compiled.validate(document) {
        let messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        return Err(Error::config_validation(messages.join("; ")));
    }

    Ok(())
}

/// Parse organization configuration from YAML content
///
/// # Errors
/// If parsing, schema checking or validation fails
pub fn parse_config(content: &str) -> Result<OrgConfig> {
    let document: serde_yaml::Value = serde_yaml::from_str(content)?;
    check_schema(&serde_json::to_value(&document)?)?;

    // serde_yaml keeps mapping order, which fixes the reconcile order of labels
    let mut config: OrgConfig = serde_yaml::from_value(document)?;
    config.normalize();
    config.validate()?;
    Ok(config)
}

/// Load organization configuration from a YAML file
///
/// # Errors
/// If file reading, parsing or validation fails
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<OrgConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Configuration file not found: {}", path.display()),
        )
        .into());
    }

    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Default configuration location (`~/.org-labeler.yaml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
}

/// Resolve the access token
///
/// Order: explicit argument, `GITHUB_TOKEN`, configuration file.
///
/// # Errors
/// If no token is available
pub fn resolve_access_token(arg_token: Option<String>, config: &OrgConfig) -> Result<String> {
    arg_token
        .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
        .or_else(|| config.access_token.clone())
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| {
            Error::config_validation(
                "GitHub access token is required. Set via --access-token, GITHUB_TOKEN env var, or access_token in the config file",
            )
        })
}

/// Sample configuration written by `init`
pub fn sample_config() -> OrgConfig {
    let mut labels = IndexMap::new();
    labels.insert(
        "bug".to_string(),
        DesiredLabel::new("d73a4a", "Something isn't working").with_synonyms(["defect"]),
    );
    labels.insert(
        "enhancement".to_string(),
        DesiredLabel::new("a2eeef", "New feature or request").with_synonyms(["feature"]),
    );
    labels.insert(
        "documentation".to_string(),
        DesiredLabel::new("0075ca", "Improvements or additions to documentation")
            .with_synonyms(["docs"]),
    );
    labels.insert(
        "good first issue".to_string(),
        DesiredLabel::new("7057ff", "Good for newcomers").with_synonyms(["beginner-friendly"]),
    );
    labels.insert(
        "help wanted".to_string(),
        DesiredLabel::new("008672", "Extra attention is needed"),
    );

    OrgConfig {
        access_token: None,
        endpoint: default_endpoint(),
        organization: "my-org".to_string(),
        project_repos: vec!["my-repo".to_string()],
        labels,
    }
}
