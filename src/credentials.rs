/// Credential exchange records (issue-credential v2, issuer side).
///
/// An offer carries the credential preview; the AnonCreds format payloads
/// that a full exchange attaches are not produced here.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::info;

use crate::connections::ConnectionsApi;
use crate::error::AgentError;
use crate::events::{EventPayload, EventSender, emit};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialState {
    ProposalSent,
    ProposalReceived,
    OfferSent,
    OfferReceived,
    Declined,
    RequestSent,
    RequestReceived,
    CredentialIssued,
    CredentialReceived,
    Done,
    Abandoned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialRole {
    Issuer,
    Holder,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialPreviewAttribute {
    pub name: String,
    pub value: String,
    #[serde(rename = "mime-type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Attributes as sent by clients: either the preview array or a plain object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CredentialAttributes {
    List(Vec<CredentialPreviewAttribute>),
    Map(Map<String, Value>),
}

impl CredentialAttributes {
    pub fn into_preview(self) -> Vec<CredentialPreviewAttribute> {
        match self {
            Self::List(attributes) => attributes,
            Self::Map(map) => map
                .into_iter()
                .map(|(name, value)| CredentialPreviewAttribute {
                    name,
                    value: match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    },
                    mime_type: None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialExchangeRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub connection_id: String,
    pub thread_id: String,
    pub state: CredentialState,
    pub role: CredentialRole,
    pub protocol_version: String,
    pub credential_attributes: Vec<CredentialPreviewAttribute>,
}

#[derive(Debug, Clone)]
pub struct OfferCredentialOptions {
    pub connection_id: String,
    pub attributes: Vec<CredentialPreviewAttribute>,
}

/// The agent's `credentials` module.
pub struct CredentialsApi {
    connections: Arc<ConnectionsApi>,
    records: RwLock<Vec<CredentialExchangeRecord>>,
    events: EventSender,
}

impl CredentialsApi {
    pub fn new(connections: Arc<ConnectionsApi>, events: EventSender) -> Self {
        Self {
            connections,
            records: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Send a credential offer over an existing connection.
    pub async fn offer_credential(
        &self, options: OfferCredentialOptions,
    ) -> Result<CredentialExchangeRecord, AgentError> {
        if options.attributes.is_empty() {
            return Err(AgentError::InvalidRequest(
                "attributes must not be empty".to_string(),
            ));
        }
        if self.connections.find_connection(&options.connection_id).await.is_none() {
            return Err(AgentError::NotFound(format!(
                "connection {}",
                options.connection_id
            )));
        }

        let record = CredentialExchangeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            connection_id: options.connection_id,
            thread_id: uuid::Uuid::new_v4().to_string(),
            state: CredentialState::OfferSent,
            role: CredentialRole::Issuer,
            protocol_version: "v2".to_string(),
            credential_attributes: options.attributes,
        };
        self.records.write().await.push(record.clone());
        info!(
            "Offered credential {} on connection {}",
            record.id, record.connection_id
        );
        emit(
            &self.events,
            EventPayload::CredentialStateChanged {
                credential_exchange_id: record.id.clone(),
                connection_id: record.connection_id.clone(),
                state: record.state,
                previous_state: None,
            },
        );
        Ok(record)
    }

    pub async fn credential_exchanges(&self) -> Vec<CredentialExchangeRecord> {
        self.records.read().await.clone()
    }
}
