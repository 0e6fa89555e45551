use crate::config::Settings;
use crate::gnap::{GnapConfig, Operation, OperationError, INTERACT_PATH};
use crate::interaction::{InteractionError, RedirectInteraction};
use crate::policy::RulePolicy;
use crate::store::{create_store_provider, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort startup
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to create store provider: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid policy configuration: {0}")]
    Policy(String),
    #[error("Invalid interaction configuration: {0}")]
    Interaction(#[from] InteractionError),
    #[error(transparent)]
    Operation(#[from] OperationError),
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub operation: Arc<Operation>,
}

impl AppState {
    /// Wires the GNAP operation from the settings: store, policy and
    /// interaction handler.
    pub async fn new(settings: Settings) -> Result<Self, StartupError> {
        let store_provider = create_store_provider(&settings.store)?;
        let access_policy = RulePolicy::new(&settings.policy).map_err(StartupError::Policy)?;
        let interaction_handler = RedirectInteraction::new(
            &settings.base_url,
            INTERACT_PATH,
            &settings.interaction.ui_url,
        )?;

        let operation = Operation::new(GnapConfig {
            store_provider,
            access_policy: Arc::new(access_policy),
            base_url: settings.base_url.clone(),
            interaction_handler: Arc::new(interaction_handler),
            interaction: settings.interaction.clone(),
            token: settings.token.clone(),
        })
        .await?;

        Ok(Self {
            settings: Arc::new(settings),
            operation: Arc::new(operation),
        })
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        match self.operation.health_check().await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Grant store is unhealthy: {e}");
                false
            }
        }
    }
}
