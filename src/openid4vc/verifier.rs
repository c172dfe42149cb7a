/// OpenID4VP verifier: verifier records and authorization requests asking a
/// wallet to present credentials.
///
/// Presentations are not received yet, so sessions stay in `RequestCreated`.
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;
use url::form_urlencoded;

use crate::error::AgentError;
use crate::events::{EventPayload, EventSender, emit};

pub const AUTHORIZATION_REQUEST_SCHEME: &str = "openid4vp://";

const NONCE_LENGTH: usize = 24;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenId4VcVerifierRecord {
    pub verifier_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationSessionState {
    RequestCreated,
    RequestUriRetrieved,
    ResponseVerified,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSession {
    pub id: String,
    pub verifier_id: String,
    pub created_at: DateTime<Utc>,
    pub state: VerificationSessionState,
    pub nonce: String,
    pub authorization_request: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuthorizationRequestOptions {
    /// Defaults to the agent's first verifier.
    pub verifier_id: Option<String>,
    /// DIF presentation definition describing the credentials wanted.
    #[serde(default)]
    pub presentation_definition: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAuthorizationRequest {
    pub authorization_request: String,
    pub verification_session: VerificationSession,
}

/// The agent's `openId4VcVerifier` module.
pub struct OpenId4VcVerifierApi {
    base_url: String,
    verifiers: RwLock<Vec<OpenId4VcVerifierRecord>>,
    sessions: RwLock<Vec<VerificationSession>>,
    events: EventSender,
}

impl OpenId4VcVerifierApi {
    /// `base_url` is where the verifier routes are mounted, e.g. `<public url>/siop`.
    pub fn new(base_url: impl Into<String>, events: EventSender) -> Self {
        Self {
            base_url: base_url.into(),
            verifiers: RwLock::new(Vec::new()),
            sessions: RwLock::new(Vec::new()),
            events,
        }
    }

    pub async fn create_verifier(&self) -> OpenId4VcVerifierRecord {
        let record = OpenId4VcVerifierRecord {
            verifier_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        };
        self.verifiers.write().await.push(record.clone());
        info!("Created OpenID4VC verifier {}", record.verifier_id);
        record
    }

    pub async fn verifier(&self, verifier_id: &str) -> Option<OpenId4VcVerifierRecord> {
        self.verifiers
            .read()
            .await
            .iter()
            .find(|verifier| verifier.verifier_id == verifier_id)
            .cloned()
    }

    pub async fn default_verifier(&self) -> Option<OpenId4VcVerifierRecord> {
        self.verifiers.read().await.first().cloned()
    }

    /// Create an `openid4vp://` authorization request and its verification session.
    pub async fn create_authorization_request(
        &self, options: CreateAuthorizationRequestOptions,
    ) -> Result<CreatedAuthorizationRequest, AgentError> {
        let verifier = match &options.verifier_id {
            Some(verifier_id) => self.verifier(verifier_id).await,
            None => self.default_verifier().await,
        }
        .ok_or_else(|| {
            AgentError::NotFound(format!(
                "verifier {}",
                options.verifier_id.as_deref().unwrap_or("(default)")
            ))
        })?;

        if !options.presentation_definition.is_object() {
            return Err(AgentError::InvalidRequest(
                "presentationDefinition must be an object".to_string(),
            ));
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LENGTH)
            .map(char::from)
            .collect();
        let client_id = format!("{}/{}", self.base_url, verifier.verifier_id);
        let authorization_request = format!(
            "{AUTHORIZATION_REQUEST_SCHEME}?{}",
            form_urlencoded::Serializer::new(String::new())
                .append_pair("client_id", &client_id)
                .append_pair("response_type", "vp_token")
                .append_pair("response_mode", "direct_post")
                .append_pair("response_uri", &format!("{client_id}/authorize"))
                .append_pair("nonce", &nonce)
                .append_pair("state", &session_id)
                .append_pair(
                    "presentation_definition",
                    &options.presentation_definition.to_string()
                )
                .finish()
        );

        let session = VerificationSession {
            id: session_id,
            verifier_id: verifier.verifier_id,
            created_at: Utc::now(),
            state: VerificationSessionState::RequestCreated,
            nonce,
            authorization_request: authorization_request.clone(),
        };
        self.sessions.write().await.push(session.clone());
        emit(
            &self.events,
            EventPayload::VerificationSessionStateChanged {
                verification_session_id: session.id.clone(),
                verifier_id: session.verifier_id.clone(),
                state: session.state,
            },
        );

        Ok(CreatedAuthorizationRequest {
            authorization_request,
            verification_session: session,
        })
    }
}
