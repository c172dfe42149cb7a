/// Agent module: assembles the wallet and protocol modules, then runs the
/// startup sequence: event tasks → wallet → endorser import → issuer → verifier.
use std::sync::Arc;

use tracing::{error, info};

use crate::config::{AgentConfig, EndorserConfig};
use crate::connections::{ConnectionStates, ConnectionsApi, track_connection_states};
use crate::credentials::CredentialsApi;
use crate::dids::{DidImportOptions, DidRegistry, DidsApi, ImportedKey, KeyType};
use crate::error::AgentError;
use crate::events::{EventSender, create_event_channel, log_events};
use crate::openid4vc::{CreateIssuerOptions, OpenId4VcIssuerApi, OpenId4VcVerifierApi};
use crate::wallet::Wallet;

/// The agent and its modules.
pub struct Agent {
    pub config: AgentConfig,
    pub dids: DidsApi,
    pub connections: Arc<ConnectionsApi>,
    pub credentials: CredentialsApi,
    pub openid4vc_issuer: OpenId4VcIssuerApi,
    pub openid4vc_verifier: OpenId4VcVerifierApi,
    pub events: EventSender,
}

impl Agent {
    /// Construct the agent, opening (and loading) its wallet.
    pub async fn new(config: AgentConfig, events: EventSender) -> Result<Self, AgentError> {
        let wallet = Arc::new(Wallet::open(config.wallet_id.clone(), config.did_cache_path()).await?);
        let connections = Arc::new(ConnectionsApi::new(
            config.label.clone(),
            config.public_url.clone(),
            events.clone(),
        ));

        Ok(Self {
            dids: DidsApi::new(wallet, events.clone()),
            credentials: CredentialsApi::new(connections.clone(), events.clone()),
            openid4vc_issuer: OpenId4VcIssuerApi::new(
                format!("{}/oid4vci", config.public_url),
                events.clone(),
            ),
            openid4vc_verifier: OpenId4VcVerifierApi::new(
                format!("{}/siop", config.public_url),
                events.clone(),
            ),
            connections,
            events,
            config,
        })
    }
}

/// Shared application state passed into every Axum handler.
pub struct AppState {
    pub agent: Agent,
    /// Last-known state per connection, maintained from agent events.
    pub connection_states: ConnectionStates,
}

/// Bootstrap the agent and its background tasks.
pub async fn initialise(config: AgentConfig) -> Result<Arc<AppState>, AgentError> {
    info!("Initialising agent '{}' (wallet '{}')", config.label, config.wallet_id);

    // ── 1. Event bus + subscribers ──────────────────────────────────────
    let events = create_event_channel();
    tokio::spawn(log_events(events.subscribe()));
    let connection_states = ConnectionStates::default();
    tokio::spawn(track_connection_states(
        events.subscribe(),
        connection_states.clone(),
    ));

    // ── 2. Agent + wallet ───────────────────────────────────────────────
    let agent = Agent::new(config, events).await?;
    info!("Agent initialised");

    // ── 3. Endorser DID ─────────────────────────────────────────────────
    import_endorser_if_empty(&agent.dids, agent.config.endorser.as_ref()).await;
    let created = agent.dids.created_dids().await;
    let dids: Vec<&str> = created.iter().map(|r| r.did.as_str()).collect();
    info!("Created DIDs: {dids:?}");

    // ── 4. OpenID4VC issuer ─────────────────────────────────────────────
    let issuer = agent
        .openid4vc_issuer
        .create_issuer(CreateIssuerOptions::test_issuer(&agent.config.label))
        .await;
    info!(
        "OpenID4VC issuer metadata: {}/oid4vci/{}/.well-known/openid-credential-issuer",
        agent.config.public_url, issuer.issuer_id
    );

    // ── 5. OpenID4VC verifier ───────────────────────────────────────────
    let verifier = agent.openid4vc_verifier.create_verifier().await;
    info!(
        "OpenID4VC verifier: {}/siop/{}",
        agent.config.public_url, verifier.verifier_id
    );

    Ok(Arc::new(AppState {
        agent,
        connection_states,
    }))
}

/// Import the endorser DID when the wallet holds no DIDs yet.
///
/// Returns whether an import was attempted. A failed import is logged and
/// does not stop the agent.
pub async fn import_endorser_if_empty<R: DidRegistry>(
    registry: &R,
    endorser: Option<&EndorserConfig>,
) -> bool {
    let Some(endorser) = endorser else {
        return false;
    };
    if !registry.created_dids().await.is_empty() {
        return false;
    }

    let options = DidImportOptions {
        did: endorser.did.clone(),
        private_keys: vec![ImportedKey {
            key_type: KeyType::Ed25519,
            private_key: endorser.seed,
        }],
        overwrite: true,
    };
    match registry.import(options).await {
        Ok(record) => info!("Imported endorser DID {}", record.did),
        Err(e) => error!("Failed to import endorser DID {}: {e}", endorser.did),
    }
    true
}
