//! Access policy: decides how a grant request can be satisfied

use crate::config::{AccessRule, Permission, PolicyConfig};
use crate::grant::checked_lifetime;
use crate::models::{AccessDescriptor, AccessItem, GrantRequest};
use log::debug;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while evaluating a request.
///
/// Callers must treat both variants as a denial.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Policy evaluation failed: {0}")]
    EvaluationFailed(String),
}

/// How a grant request can proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every right can be granted right away
    Approved,
    /// At least one right needs the resource owner's consent
    RequiresInteraction,
    /// At least one right can never be granted
    Denied,
}

/// Result of a policy evaluation; never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPolicyDecision {
    pub outcome: Outcome,
    /// Rights that will be granted, empty when denied
    pub access: Vec<AccessDescriptor>,
    /// Token lifetime imposed by the matched rules
    pub expires_in: Option<u64>,
}

impl AccessPolicyDecision {
    fn denied() -> Self {
        Self {
            outcome: Outcome::Denied,
            access: vec![],
            expires_in: None,
        }
    }
}

/// Decision component consulted on every grant request.
///
/// Implementations must be pure: the same request against the same policy
/// data yields the same decision, and evaluation has no side effects.
pub trait AccessPolicy: Send + Sync {
    fn evaluate(&self, request: &GrantRequest) -> Result<AccessPolicyDecision, PolicyError>;
}

/// Policy driven by per-type rules from the configuration.
///
/// A right whose type has no rule is denied. A single denied right denies the
/// whole request, even when other rights would need consent.
#[derive(Debug, Clone, Default)]
pub struct RulePolicy {
    rules: HashMap<String, AccessRule>,
    references: HashMap<String, AccessDescriptor>,
}

impl RulePolicy {
    pub fn new(config: &PolicyConfig) -> Result<Self, String> {
        let mut rules = HashMap::with_capacity(config.rules.len());
        for rule in &config.rules {
            if rule.r#type.trim().is_empty() {
                return Err("Policy rule without a type".to_string());
            }
            if let Some(expires_in) = rule.expires_in {
                checked_lifetime(expires_in).map_err(|e| {
                    format!("Invalid expires_in for type '{}': {e}", rule.r#type)
                })?;
            }
            if rules.insert(rule.r#type.clone(), rule.clone()).is_some() {
                return Err(format!("Duplicate policy rule for type '{}'", rule.r#type));
            }
        }

        Ok(Self {
            rules,
            references: config.references.clone(),
        })
    }

    /// Policy without rules, denying every request
    pub fn deny_all() -> Self {
        Self::default()
    }

    fn validate(access: &[AccessItem]) -> Result<(), PolicyError> {
        if access.is_empty() {
            return Err(PolicyError::InvalidRequest(
                "no access rights requested".to_string(),
            ));
        }
        for (index, item) in access.iter().enumerate() {
            let well_formed = match item {
                AccessItem::Reference(reference) => !reference.trim().is_empty(),
                AccessItem::Descriptor(descriptor) => !descriptor.r#type.trim().is_empty(),
            };
            if !well_formed {
                return Err(PolicyError::InvalidRequest(format!(
                    "access right #{index} has no type"
                )));
            }
        }
        Ok(())
    }

    fn resolve(&self, item: &AccessItem) -> Result<Option<AccessDescriptor>, PolicyError> {
        match item {
            AccessItem::Descriptor(descriptor) => Ok(Some(descriptor.clone())),
            AccessItem::Reference(reference) => match self.references.get(reference) {
                None => Ok(None),
                Some(descriptor) if descriptor.r#type.trim().is_empty() => {
                    Err(PolicyError::EvaluationFailed(format!(
                        "reference '{reference}' resolves to a descriptor without type"
                    )))
                }
                Some(descriptor) => Ok(Some(descriptor.clone())),
            },
        }
    }
}

impl AccessPolicy for RulePolicy {
    fn evaluate(&self, request: &GrantRequest) -> Result<AccessPolicyDecision, PolicyError> {
        let access = request
            .access_token
            .as_ref()
            .map(|token| token.access.as_slice())
            .unwrap_or_default();
        Self::validate(access)?;

        let mut granted = Vec::with_capacity(access.len());
        let mut denied = false;
        let mut needs_consent = false;
        let mut expires_in: Option<u64> = None;

        for item in access {
            let Some(descriptor) = self.resolve(item)? else {
                debug!("Unknown access reference {item:?}");
                denied = true;
                continue;
            };

            let Some(rule) = self.rules.get(&descriptor.r#type) else {
                debug!("No policy rule for type '{}'", descriptor.r#type);
                denied = true;
                continue;
            };

            if !rule.actions.is_empty()
                && !descriptor
                    .actions
                    .iter()
                    .all(|action| rule.actions.contains(action))
            {
                debug!(
                    "Actions {:?} exceed the ones allowed for type '{}'",
                    descriptor.actions, descriptor.r#type
                );
                denied = true;
                continue;
            }

            match rule.permission {
                Permission::Forbidden => denied = true,
                Permission::NeedsConsent => needs_consent = true,
                Permission::AlwaysAllowed => {}
            }

            if let Some(rule_expiry) = rule.expires_in {
                expires_in = Some(expires_in.map_or(rule_expiry, |current| current.min(rule_expiry)));
            }
            granted.push(descriptor);
        }

        if denied {
            return Ok(AccessPolicyDecision::denied());
        }

        let outcome = if needs_consent {
            Outcome::RequiresInteraction
        } else {
            Outcome::Approved
        };

        Ok(AccessPolicyDecision {
            outcome,
            access: granted,
            expires_in,
        })
    }
}
