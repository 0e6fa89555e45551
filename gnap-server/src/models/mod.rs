//! GNAP wire types shared by the grant, continue and introspection endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Interaction start mode supported by this server
pub const INTERACT_START_REDIRECT: &str = "redirect";
/// Interaction finish method supported by this server
pub const INTERACT_FINISH_REDIRECT: &str = "redirect";

/// A single access right, either requested by a client or granted to it
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq, Default)]
pub struct AccessDescriptor {
    /// Type of resource the right applies to
    #[serde(default)]
    pub r#type: String,
    /// Actions the client wants to perform
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    /// Locations (usually URIs) of the resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    /// Kinds of data requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datatypes: Vec<String>,
    /// Identifier of a specific resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// Entry of the requested access list
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum AccessItem {
    /// Reference to a descriptor known to the server policy
    Reference(String),
    /// Fully described access right
    Descriptor(AccessDescriptor),
}

/// The `access_token` member of a grant request
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct AccessTokenRequest {
    /// Requested rights, in the order the client listed them
    #[serde(default)]
    pub access: Vec<AccessItem>,
    /// Label the client uses to tell several tokens apart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Token flags such as `bearer`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

/// Client identification, either an instance identifier or an inline description
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
#[serde(untagged)]
pub enum ClientRef {
    /// Identifier of a pre-registered client instance
    Instance(String),
    /// Client described inline
    Client(ClientInfo),
}

/// Inline client description
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct ClientInfo {
    /// Public key of the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub key: Option<Value>,
    /// Display information shown to the resource owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub display: Option<Value>,
}

/// How the client is able to finish an interaction
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct InteractFinish {
    /// Finish method, only `redirect` is supported
    pub method: String,
    /// Client URI the resource owner is sent back to
    pub uri: String,
    /// Client nonce mixed into the interaction hash
    pub nonce: String,
}

/// Interaction capabilities offered by the client
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct InteractRequest {
    /// Ways the client can start an interaction
    #[serde(default)]
    pub start: Vec<String>,
    /// How the client wants to be told that the interaction finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<InteractFinish>,
}

impl InteractRequest {
    /// Whether the client can send the resource owner to a redirect URL
    pub fn supports_redirect(&self) -> bool {
        self.start.iter().any(|mode| mode == INTERACT_START_REDIRECT)
    }
}

/// Grant request body
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct GrantRequest {
    /// Requested access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessTokenRequest>,
    /// Client making the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientRef>,
    /// Interaction modes the client supports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact: Option<InteractRequest>,
}

/// Continuation access token handed to the client
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct ContinueToken {
    /// Credential the client presents with the `GNAP` scheme
    pub value: String,
}

/// Instructions for continuing a pending grant
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct ContinueInfo {
    /// Credential bound to the pending grant
    pub access_token: ContinueToken,
    /// Continuation endpoint
    pub uri: String,
    /// Seconds the client should wait before continuing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<u64>,
}

/// Interaction instructions returned to the client
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct InteractResponse {
    /// Where the client sends the resource owner
    pub redirect: String,
    /// Server nonce used in the finish hash, present when the client asked for a finish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
}

/// Issued access token
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct AccessToken {
    /// Token value
    pub value: String,
    /// Label copied from the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Rights bound to the token
    pub access: Vec<AccessDescriptor>,
    /// Lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Response of the grant request and continue endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct GrantResponse {
    /// Present while the grant is pending
    #[serde(rename = "continue", default, skip_serializing_if = "Option::is_none")]
    pub continue_info: Option<ContinueInfo>,
    /// Present when the resource owner must interact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact: Option<InteractResponse>,
    /// Present once the grant is finalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
}

/// Continue request body
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct ContinueRequest {
    /// Interaction reference the client received on its finish URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact_ref: Option<String>,
}

/// Introspection request sent by a resource server
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct IntrospectRequest {
    /// Token to inspect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Proofing method the client used with the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    /// Identification of the calling resource server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub resource_server: Option<Value>,
}

/// Introspection answer
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct IntrospectResponse {
    /// Whether the token is currently valid
    pub active: bool,
    /// Rights bound to the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Vec<AccessDescriptor>>,
    /// Label of the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Issued-at, Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Expiry, Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Instance identifier of the client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Key of the client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub key: Option<Value>,
}

impl IntrospectResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Callback sent by the interaction front-end once the resource owner decided
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct InteractionCompleteRequest {
    /// Transaction (pending grant) identifier from the interaction URL
    #[serde(rename = "txnID")]
    pub txn_id: String,
    /// `true` when the resource owner approved, `false` when they cancelled
    pub approved: bool,
}

/// Answer to the interaction front-end
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct InteractionCompleteResponse {
    /// Client finish URI the resource owner should be sent to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}
