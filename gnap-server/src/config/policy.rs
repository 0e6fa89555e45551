use crate::models::AccessDescriptor;
use serde::Deserialize;
use std::collections::HashMap;

/// What the policy does with a requested right of a given type
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    /// Granted without asking anybody
    AlwaysAllowed,
    /// Granted only after the resource owner consented
    NeedsConsent,
    /// Never granted
    Forbidden,
}

/// Policy rule for one resource type
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccessRule {
    /// Resource type the rule applies to
    pub r#type: String,
    /// Decision for rights of this type
    pub permission: Permission,
    /// Actions that may be requested; empty allows any action
    #[serde(default)]
    pub actions: Vec<String>,
    /// Lifetime of tokens carrying this right, in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Access policy data
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Rules keyed by resource type; types without a rule are denied
    pub rules: Vec<AccessRule>,
    /// Descriptors clients may request by reference
    pub references: HashMap<String, AccessDescriptor>,
}
