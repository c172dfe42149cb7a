/// OpenID4VCI issuer: issuer records, pre-authorized credential offers and
/// credential-issuer metadata.
///
/// Token and credential endpoints are not served, so sessions stay in
/// `OfferCreated` until a wallet-facing front end advances them.
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use url::form_urlencoded;

use crate::error::AgentError;
use crate::events::{EventPayload, EventSender, emit};

pub const CREDENTIAL_OFFER_SCHEME: &str = "openid-credential-offer://";

const PRE_AUTHORIZED_CODE_LENGTH: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuerDisplay {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSupported {
    pub id: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,
    #[serde(default)]
    pub cryptographic_binding_methods_supported: Vec<String>,
    #[serde(default)]
    pub cryptographic_suites_supported: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenId4VcIssuerRecord {
    pub issuer_id: String,
    pub created_at: DateTime<Utc>,
    pub display: Vec<IssuerDisplay>,
    pub credentials_supported: Vec<CredentialSupported>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateIssuerOptions {
    pub display: Vec<IssuerDisplay>,
    pub credentials_supported: Vec<CredentialSupported>,
}

impl CreateIssuerOptions {
    /// The issuer every agent starts with: one SD-JWT credential bound to did:key.
    pub fn test_issuer(label: &str) -> Self {
        Self {
            display: vec![IssuerDisplay {
                name: "Test Issuer".to_string(),
                description: Some(format!("This is my {label} test issuer")),
                text_color: Some("#000000".to_string()),
                background_color: Some("#FFFFFF".to_string()),
            }],
            credentials_supported: vec![CredentialSupported {
                id: "Test Issuer".to_string(),
                format: "vc+sd-jwt".to_string(),
                vct: Some("Test Issuer".to_string()),
                cryptographic_binding_methods_supported: vec!["did:key".to_string()],
                cryptographic_suites_supported: vec!["EdDSA".to_string()],
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IssuanceSessionState {
    OfferCreated,
    OfferUriRetrieved,
    AccessTokenRequested,
    AccessTokenCreated,
    CredentialRequestReceived,
    CredentialsPartiallyIssued,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceSession {
    pub id: String,
    pub issuer_id: String,
    pub created_at: DateTime<Utc>,
    pub state: IssuanceSessionState,
    pub pre_authorized_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_pin: Option<String>,
    pub offered_credentials: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    pub user_pin_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfferGrants {
    #[serde(rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code")]
    pub pre_authorized_code: PreAuthorizedCodeGrant,
}

/// The credential offer object a wallet receives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialOfferPayload {
    pub credential_issuer: String,
    pub credentials: Vec<String>,
    pub grants: OfferGrants,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCredentialOfferOptions {
    /// Defaults to the agent's first issuer.
    pub issuer_id: Option<String>,
    pub offered_credentials: Vec<String>,
    #[serde(default)]
    pub user_pin_required: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCredentialOffer {
    pub credential_offer: String,
    pub issuance_session: IssuanceSession,
}

/// Credential issuer metadata (`/.well-known/openid-credential-issuer`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuerMetadata {
    pub credential_issuer: String,
    pub token_endpoint: String,
    pub credential_endpoint: String,
    pub display: Vec<IssuerDisplay>,
    pub credentials_supported: Vec<CredentialSupported>,
}

/// The agent's `openId4VcIssuer` module.
pub struct OpenId4VcIssuerApi {
    base_url: String,
    issuers: RwLock<Vec<OpenId4VcIssuerRecord>>,
    sessions: RwLock<Vec<IssuanceSession>>,
    events: EventSender,
}

impl OpenId4VcIssuerApi {
    /// `base_url` is where the issuer routes are mounted, e.g. `<public url>/oid4vci`.
    pub fn new(base_url: impl Into<String>, events: EventSender) -> Self {
        Self {
            base_url: base_url.into(),
            issuers: RwLock::new(Vec::new()),
            sessions: RwLock::new(Vec::new()),
            events,
        }
    }

    pub async fn create_issuer(&self, options: CreateIssuerOptions) -> OpenId4VcIssuerRecord {
        let record = OpenId4VcIssuerRecord {
            issuer_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            display: options.display,
            credentials_supported: options.credentials_supported,
        };
        self.issuers.write().await.push(record.clone());
        info!("Created OpenID4VC issuer {}", record.issuer_id);
        record
    }

    pub async fn issuer(&self, issuer_id: &str) -> Option<OpenId4VcIssuerRecord> {
        self.issuers
            .read()
            .await
            .iter()
            .find(|issuer| issuer.issuer_id == issuer_id)
            .cloned()
    }

    pub async fn default_issuer(&self) -> Option<OpenId4VcIssuerRecord> {
        self.issuers.read().await.first().cloned()
    }

    fn credential_issuer(&self, issuer_id: &str) -> String {
        format!("{}/{issuer_id}", self.base_url)
    }

    /// Create a pre-authorized code offer and its issuance session.
    pub async fn create_credential_offer(
        &self, options: CreateCredentialOfferOptions,
    ) -> Result<CreatedCredentialOffer, AgentError> {
        let issuer = match &options.issuer_id {
            Some(issuer_id) => self.issuer(issuer_id).await,
            None => self.default_issuer().await,
        }
        .ok_or_else(|| {
            AgentError::NotFound(format!(
                "issuer {}",
                options.issuer_id.as_deref().unwrap_or("(default)")
            ))
        })?;

        if options.offered_credentials.is_empty() {
            return Err(AgentError::InvalidRequest(
                "offeredCredentials must not be empty".to_string(),
            ));
        }
        if let Some(unknown) = options
            .offered_credentials
            .iter()
            .find(|id| !issuer.credentials_supported.iter().any(|c| &c.id == *id))
        {
            return Err(AgentError::InvalidRequest(format!(
                "credential {unknown} is not supported by issuer {}",
                issuer.issuer_id
            )));
        }

        let (pre_authorized_code, user_pin) = generate_codes(options.user_pin_required);
        let payload = CredentialOfferPayload {
            credential_issuer: self.credential_issuer(&issuer.issuer_id),
            credentials: options.offered_credentials.clone(),
            grants: OfferGrants {
                pre_authorized_code: PreAuthorizedCodeGrant {
                    pre_authorized_code: pre_authorized_code.clone(),
                    user_pin_required: options.user_pin_required,
                },
            },
        };
        let json = serde_json::to_string(&payload)
            .map_err(|e| AgentError::Internal(format!("serializing credential offer: {e}")))?;
        let credential_offer = format!(
            "{CREDENTIAL_OFFER_SCHEME}?credential_offer={}",
            form_urlencoded::byte_serialize(json.as_bytes()).collect::<String>()
        );

        let session = IssuanceSession {
            id: uuid::Uuid::new_v4().to_string(),
            issuer_id: issuer.issuer_id,
            created_at: Utc::now(),
            state: IssuanceSessionState::OfferCreated,
            pre_authorized_code,
            user_pin,
            offered_credentials: options.offered_credentials,
        };
        self.sessions.write().await.push(session.clone());
        emit(
            &self.events,
            EventPayload::IssuanceSessionStateChanged {
                issuance_session_id: session.id.clone(),
                issuer_id: session.issuer_id.clone(),
                state: session.state,
            },
        );

        Ok(CreatedCredentialOffer {
            credential_offer,
            issuance_session: session,
        })
    }

    pub async fn issuer_metadata(&self, issuer_id: &str) -> Result<IssuerMetadata, AgentError> {
        let issuer = self
            .issuer(issuer_id)
            .await
            .ok_or_else(|| AgentError::NotFound(format!("issuer {issuer_id}")))?;
        let credential_issuer = self.credential_issuer(issuer_id);
        Ok(IssuerMetadata {
            token_endpoint: format!("{credential_issuer}/token"),
            credential_endpoint: format!("{credential_issuer}/credential"),
            credential_issuer,
            display: issuer.display,
            credentials_supported: issuer.credentials_supported,
        })
    }
}

fn generate_codes(user_pin_required: bool) -> (String, Option<String>) {
    let mut rng = rand::thread_rng();
    let code = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(PRE_AUTHORIZED_CODE_LENGTH)
        .map(char::from)
        .collect();
    let pin = user_pin_required.then(|| format!("{:06}", rng.gen_range(0..1_000_000)));
    (code, pin)
}
