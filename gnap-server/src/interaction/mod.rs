//! Resource-owner interaction through browser redirects

use crate::grant::credential::GrantId;
use crate::models::{InteractFinish, INTERACT_FINISH_REDIRECT};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Query parameter carrying the pending grant identifier
pub const TXN_ID_PARAM: &str = "txnID";

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("Invalid interaction URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported interaction finish method '{0}'")]
    UnsupportedFinish(String),
    #[error("Interaction finish URI must use http or https: {0}")]
    UnsupportedScheme(String),
    #[error("Interaction finish nonce is empty")]
    MissingNonce,
}

/// Collaborator driving the resource-owner interaction.
///
/// The core only hands over the pending grant identifier; everything the
/// resource owner sees lives behind the URLs built here.
pub trait InteractionHandler: Send + Sync {
    /// URL of this server's interact endpoint for the given pending grant
    fn prepare_interaction(&self, grant_id: &GrantId) -> Result<Url, InteractionError>;

    /// Page the interact endpoint sends the resource owner to
    fn interaction_target(&self, txn_id: Option<&str>) -> Url;

    /// Client finish URI carrying the interaction reference and hash
    fn finish_redirect(
        &self,
        finish: &InteractFinish,
        server_nonce: &str,
        interact_ref: &str,
        grant_uri: &str,
    ) -> Result<Url, InteractionError>;
}

/// Checks the finish parameters a client sent with its grant request
pub fn validate_finish(finish: &InteractFinish) -> Result<Url, InteractionError> {
    if finish.method != INTERACT_FINISH_REDIRECT {
        return Err(InteractionError::UnsupportedFinish(finish.method.clone()));
    }
    if finish.nonce.is_empty() {
        return Err(InteractionError::MissingNonce);
    }
    let uri = Url::parse(&finish.uri)?;
    if !matches!(uri.scheme(), "http" | "https") {
        return Err(InteractionError::UnsupportedScheme(finish.uri.clone()));
    }
    Ok(uri)
}

/// Hash binding the finish redirect to this grant:
/// `base64url(SHA-256(client nonce \n server nonce \n interact_ref \n grant URI))`
pub fn interaction_hash(
    client_nonce: &str,
    server_nonce: &str,
    interact_ref: &str,
    grant_uri: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{client_nonce}\n{server_nonce}\n{interact_ref}\n{grant_uri}"));
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Redirect-based interaction: clients send the resource owner to the
/// interact endpoint, which forwards to the front-end page.
#[derive(Debug, Clone)]
pub struct RedirectInteraction {
    interact_url: Url,
    ui_url: Url,
}

impl RedirectInteraction {
    pub fn new(base_url: &str, interact_path: &str, ui_url: &str) -> Result<Self, InteractionError> {
        let interact_url = Url::parse(&format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            interact_path
        ))?;
        let ui_url = Url::parse(ui_url)?;

        Ok(Self {
            interact_url,
            ui_url,
        })
    }
}

impl InteractionHandler for RedirectInteraction {
    fn prepare_interaction(&self, grant_id: &GrantId) -> Result<Url, InteractionError> {
        let mut url = self.interact_url.clone();
        url.query_pairs_mut()
            .append_pair(TXN_ID_PARAM, grant_id.as_str());
        Ok(url)
    }

    fn interaction_target(&self, txn_id: Option<&str>) -> Url {
        let mut url = self.ui_url.clone();
        if let Some(txn_id) = txn_id {
            url.query_pairs_mut().append_pair(TXN_ID_PARAM, txn_id);
        }
        url
    }

    fn finish_redirect(
        &self,
        finish: &InteractFinish,
        server_nonce: &str,
        interact_ref: &str,
        grant_uri: &str,
    ) -> Result<Url, InteractionError> {
        let mut url = validate_finish(finish)?;
        let hash = interaction_hash(&finish.nonce, server_nonce, interact_ref, grant_uri);
        url.query_pairs_mut()
            .append_pair("hash", &hash)
            .append_pair("interact_ref", interact_ref);
        Ok(url)
    }
}
