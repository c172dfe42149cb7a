/// Out-of-band invitations and connection records.
///
/// Invitations follow Aries RFC 0434 (OOB 1.1) and are exchanged as URLs with
/// a base64url `oob` query parameter. The DID-exchange handshake that would
/// follow needs a DIDComm transport and is not driven from here; connection
/// records stop at `invitation-received`.
use std::collections::HashMap;
use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};
use url::Url;

use crate::dids::key::did_key_from_public_key;
use crate::error::AgentError;
use crate::events::{AgentEvent, EventPayload, EventSender, emit};

pub const OOB_INVITATION_TYPE: &str = "https://didcomm.org/out-of-band/1.1/invitation";
pub const DID_EXCHANGE_PROTOCOL: &str = "https://didcomm.org/didexchange/1.1";
pub const CONNECTIONS_PROTOCOL: &str = "https://didcomm.org/connections/1.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    Start,
    InvitationSent,
    InvitationReceived,
    RequestSent,
    RequestReceived,
    ResponseSent,
    ResponseReceived,
    Abandoned,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OutOfBandState {
    Initial,
    AwaitResponse,
    PrepareResponse,
    Done,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutOfBandRole {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    Requester,
    Responder,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvitationService {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub recipient_keys: Vec<String>,
    #[serde(default)]
    pub routing_keys: Vec<String>,
    pub service_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutOfBandInvitation {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default)]
    pub accept: Vec<String>,
    #[serde(default)]
    pub handshake_protocols: Vec<String>,
    pub services: Vec<InvitationService>,
}

impl OutOfBandInvitation {
    /// Encode as an invitation URL: `<endpoint>?oob=<base64url(json)>`.
    pub fn to_url(&self, endpoint: &str) -> Result<String, AgentError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| AgentError::Internal(format!("serializing invitation: {e}")))?;
        let mut url = Url::parse(endpoint)
            .map_err(|e| AgentError::Internal(format!("invalid endpoint {endpoint}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("oob", &Base64UrlUnpadded::encode_string(&json));
        Ok(url.to_string())
    }

    /// Parse an invitation URL produced by [`Self::to_url`].
    pub fn from_url(invitation_url: &str) -> Result<Self, AgentError> {
        let invalid = |msg: String| AgentError::InvalidRequest(format!("invalid invitation URL: {msg}"));
        let url = Url::parse(invitation_url).map_err(|e| invalid(e.to_string()))?;
        let oob = url
            .query_pairs()
            .find(|(name, _)| name == "oob")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| invalid("missing oob parameter".to_string()))?;
        // some agents pad their base64url
        let bytes = Base64UrlUnpadded::decode_vec(oob.trim_end_matches('='))
            .map_err(|e| invalid(e.to_string()))?;
        let invitation: Self = serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
        if invitation.type_ != OOB_INVITATION_TYPE {
            return Err(invalid(format!("unexpected message type {}", invitation.type_)));
        }
        Ok(invitation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutOfBandRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub role: OutOfBandRole,
    pub state: OutOfBandState,
    pub reusable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub out_of_band_invitation: OutOfBandInvitation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub role: ConnectionRole,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub their_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub out_of_band_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationOptions {
    pub label: Option<String>,
    pub alias: Option<String>,
    pub goal_code: Option<String>,
    pub goal: Option<String>,
    #[serde(default)]
    pub multi_use: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInvitation {
    pub invitation_url: String,
    pub out_of_band_record: OutOfBandRecord,
}

/// The agent's `oob` and `connections` modules.
pub struct ConnectionsApi {
    label: String,
    endpoint: String,
    out_of_band: RwLock<Vec<OutOfBandRecord>>,
    connections: RwLock<HashMap<String, ConnectionRecord>>,
    events: EventSender,
}

impl ConnectionsApi {
    pub fn new(label: impl Into<String>, endpoint: impl Into<String>, events: EventSender) -> Self {
        Self {
            label: label.into(),
            endpoint: endpoint.into(),
            out_of_band: RwLock::new(Vec::new()),
            connections: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Create an out-of-band invitation with a fresh recipient key.
    pub async fn create_invitation(
        &self, options: CreateInvitationOptions,
    ) -> Result<CreatedInvitation, AgentError> {
        let recipient_key = SigningKey::generate(&mut OsRng);
        let invitation = OutOfBandInvitation {
            type_: OOB_INVITATION_TYPE.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            label: options.label.unwrap_or_else(|| self.label.clone()),
            goal_code: options.goal_code,
            goal: options.goal,
            accept: vec!["didcomm/aip1".to_string(), "didcomm/aip2;env=rfc19".to_string()],
            handshake_protocols: vec![
                DID_EXCHANGE_PROTOCOL.to_string(),
                CONNECTIONS_PROTOCOL.to_string(),
            ],
            services: vec![InvitationService {
                id: "#inline-0".to_string(),
                type_: "did-communication".to_string(),
                recipient_keys: vec![did_key_from_public_key(&recipient_key.verifying_key())],
                routing_keys: Vec::new(),
                service_endpoint: self.endpoint.clone(),
            }],
        };
        let invitation_url = invitation.to_url(&self.endpoint)?;

        let record = OutOfBandRecord {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            role: OutOfBandRole::Sender,
            state: OutOfBandState::AwaitResponse,
            reusable: options.multi_use,
            alias: options.alias,
            out_of_band_invitation: invitation,
        };
        self.out_of_band.write().await.push(record.clone());
        info!("Created out-of-band invitation {}", record.id);
        emit(
            &self.events,
            EventPayload::OutOfBandStateChanged {
                out_of_band_id: record.id.clone(),
                state: record.state,
                previous_state: None,
            },
        );

        Ok(CreatedInvitation {
            invitation_url,
            out_of_band_record: record,
        })
    }

    /// Accept an invitation URL and create the requester-side connection.
    pub async fn receive_invitation(
        &self, invitation_url: &str, alias: Option<String>,
    ) -> Result<ConnectionRecord, AgentError> {
        let invitation = OutOfBandInvitation::from_url(invitation_url)?;
        let their_label = invitation.label.clone();

        let oob_record = OutOfBandRecord {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            role: OutOfBandRole::Receiver,
            state: OutOfBandState::PrepareResponse,
            reusable: false,
            alias: alias.clone(),
            out_of_band_invitation: invitation,
        };
        let connection = ConnectionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            role: ConnectionRole::Requester,
            state: ConnectionState::InvitationReceived,
            their_label: Some(their_label),
            alias,
            out_of_band_id: oob_record.id.clone(),
        };

        self.out_of_band.write().await.push(oob_record.clone());
        self.connections
            .write()
            .await
            .insert(connection.id.clone(), connection.clone());
        info!("Received invitation from {:?}, connection {}", connection.their_label, connection.id);

        emit(
            &self.events,
            EventPayload::OutOfBandStateChanged {
                out_of_band_id: oob_record.id,
                state: oob_record.state,
                previous_state: None,
            },
        );
        emit(
            &self.events,
            EventPayload::ConnectionStateChanged {
                connection_id: connection.id.clone(),
                state: connection.state,
                previous_state: None,
            },
        );
        Ok(connection)
    }

    pub async fn find_connection(&self, connection_id: &str) -> Option<ConnectionRecord> {
        self.connections.read().await.get(connection_id).cloned()
    }
}

/// Last-known state per connection id, fed only by agent events.
pub type ConnectionStates = Arc<RwLock<HashMap<String, ConnectionState>>>;

/// Forward `ConnectionStateChanged` events into `states` until the channel closes.
pub async fn track_connection_states(mut rx: broadcast::Receiver<AgentEvent>, states: ConnectionStates) {
    loop {
        match rx.recv().await {
            Ok(AgentEvent {
                payload: EventPayload::ConnectionStateChanged {
                    connection_id,
                    state,
                    ..
                },
                ..
            }) => {
                debug!("Connection {connection_id} is now {state:?}");
                states.write().await.insert(connection_id, state);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("connection tracker lagged, skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
