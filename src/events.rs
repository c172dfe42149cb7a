/// Agent event bus. Every state change of a record is published here and
/// fanned out to subscribers (connection tracker, logger, SSE clients).
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::connections::{ConnectionState, OutOfBandState};
use crate::credentials::CredentialState;
use crate::openid4vc::{IssuanceSessionState, VerificationSessionState};

pub type EventSender = broadcast::Sender<AgentEvent>;

/// Typed payload of an [`AgentEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EventPayload {
    ConnectionStateChanged {
        connection_id: String,
        state: ConnectionState,
        previous_state: Option<ConnectionState>,
    },
    OutOfBandStateChanged {
        out_of_band_id: String,
        state: OutOfBandState,
        previous_state: Option<OutOfBandState>,
    },
    CredentialStateChanged {
        credential_exchange_id: String,
        connection_id: String,
        state: CredentialState,
        previous_state: Option<CredentialState>,
    },
    IssuanceSessionStateChanged {
        issuance_session_id: String,
        issuer_id: String,
        state: IssuanceSessionState,
    },
    VerificationSessionStateChanged {
        verification_session_id: String,
        verifier_id: String,
        state: VerificationSessionState,
    },
    DidCreated {
        did: String,
        method: String,
    },
}

/// A single event emitted by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: String,
    pub timestamp: String,
    pub payload: EventPayload,
}

impl AgentEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            payload,
        }
    }

    /// Name of the event type, as used for SSE `event:` lines.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::ConnectionStateChanged { .. } => "ConnectionStateChanged",
            EventPayload::OutOfBandStateChanged { .. } => "OutOfBandStateChanged",
            EventPayload::CredentialStateChanged { .. } => "CredentialStateChanged",
            EventPayload::IssuanceSessionStateChanged { .. } => "IssuanceSessionStateChanged",
            EventPayload::VerificationSessionStateChanged { .. } => {
                "VerificationSessionStateChanged"
            }
            EventPayload::DidCreated { .. } => "DidCreated",
        }
    }
}

/// Create a broadcast channel for agent events.
/// The receiver is dropped; subscribers use `sender.subscribe()`.
pub fn create_event_channel() -> EventSender {
    let (tx, _rx) = broadcast::channel::<AgentEvent>(256);
    tx
}

/// Publish an event. Having no subscribers is not an error.
pub fn emit(events: &EventSender, payload: EventPayload) {
    let _ = events.send(AgentEvent::new(payload));
}

/// Log every event until the channel closes.
pub async fn log_events(mut rx: broadcast::Receiver<AgentEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match &event.payload {
                EventPayload::IssuanceSessionStateChanged {
                    issuance_session_id,
                    state,
                    ..
                } => {
                    info!("Issuance session {issuance_session_id} state changed to {state:?}");
                }
                EventPayload::VerificationSessionStateChanged {
                    verification_session_id,
                    state,
                    ..
                } => {
                    info!("Verification session {verification_session_id} state changed to {state:?}");
                }
                payload => debug!(kind = event.kind(), "agent event: {payload:?}"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("event logger lagged, skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
