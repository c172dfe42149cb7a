/// DID management: create, import, resolve and list DIDs held by the agent.
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::seed_bytes;
use crate::events::{EventPayload, EventSender, emit};
use crate::wallet::Wallet;

pub mod key;

#[derive(Error, Debug)]
pub enum DidError {
    #[error("invalid DID: {0}")]
    InvalidDid(String),
    #[error("unsupported DID method: {0}")]
    UnsupportedMethod(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("DID already exists in wallet: {0}")]
    AlreadyExists(String),
    #[error("DID not found: {0}")]
    NotFound(String),
    #[error("no key in wallet for DID: {0}")]
    KeyNotFound(String),
    #[error("DID storage error: {0}")]
    Storage(String),
}

/// A DID created in or imported into the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DidRecord {
    pub id: String,
    pub did: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_method_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: String,
    pub public_key_multibase: String,
}

/// W3C DID document (the subset produced by this agent).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(default)]
    pub assertion_method: Vec<String>,
    #[serde(default)]
    pub capability_invocation: Vec<String>,
    #[serde(default)]
    pub capability_delegation: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionError {
    InvalidDid,
    NotFound,
    UnsupportedDidMethod,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DidResolutionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResolutionError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DidResolutionResult {
    pub did_document: Option<DidDocument>,
    pub did_document_metadata: Map<String, Value>,
    pub did_resolution_metadata: DidResolutionMetadata,
}

impl DidResolutionResult {
    fn resolved(document: DidDocument) -> Self {
        Self {
            did_document: Some(document),
            did_document_metadata: Map::new(),
            did_resolution_metadata: DidResolutionMetadata {
                content_type: Some("application/did+ld+json".to_string()),
                ..Default::default()
            },
        }
    }

    fn failed(error: ResolutionError, message: impl Into<String>) -> Self {
        Self {
            did_document: None,
            did_document_metadata: Map::new(),
            did_resolution_metadata: DidResolutionMetadata {
                content_type: None,
                error: Some(error),
                message: Some(message.into()),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCreateOptions {
    /// DID method; defaults to `key`.
    pub method: Option<String>,
    /// Optional 32-byte seed for deterministic key generation.
    pub seed: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DidState {
    pub state: String,
    pub did: String,
    pub did_document: DidDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCreateResult {
    pub did_state: DidState,
    pub did_record: DidRecord,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Ed25519,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedKey {
    pub key_type: KeyType,
    pub private_key: [u8; 32],
}

impl std::fmt::Debug for ImportedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedKey")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidImportOptions {
    pub did: String,
    pub private_keys: Vec<ImportedKey>,
    #[serde(default)]
    pub overwrite: bool,
}

/// The DID operations the agent bootstrap depends on.
pub trait DidRegistry {
    fn created_dids(&self) -> impl Future<Output = Vec<DidRecord>> + Send;

    fn import(
        &self, options: DidImportOptions,
    ) -> impl Future<Output = Result<DidRecord, DidError>> + Send;
}

/// Split `did:<method>:<id>` and return the method.
pub fn did_method(did: &str) -> Result<&str, DidError> {
    let invalid = || DidError::InvalidDid(did.to_string());
    let rest = did.strip_prefix("did:").ok_or_else(invalid)?;
    let (method, id) = rest.split_once(':').ok_or_else(invalid)?;
    let valid_method = !method.is_empty()
        && method
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !valid_method || id.is_empty() {
        return Err(invalid());
    }
    Ok(method)
}

/// The agent's `dids` module.
pub struct DidsApi {
    wallet: Arc<Wallet>,
    events: EventSender,
    /// Held across the alias lookup and create in `get_or_create`.
    alias_lock: Mutex<()>,
}

impl DidsApi {
    pub fn new(wallet: Arc<Wallet>, events: EventSender) -> Self {
        Self {
            wallet,
            events,
            alias_lock: Mutex::new(()),
        }
    }

    /// Create a new DID. Only `did:key` can be registered without a ledger.
    pub async fn create(&self, options: DidCreateOptions) -> Result<DidCreateResult, DidError> {
        let method = options.method.as_deref().unwrap_or("key");
        if method != "key" {
            return Err(DidError::UnsupportedMethod(method.to_string()));
        }

        let signing_key = match options.seed.as_deref() {
            Some(seed) => SigningKey::from_bytes(
                &seed_bytes(seed).map_err(|e| DidError::InvalidKey(e.to_string()))?,
            ),
            None => SigningKey::generate(&mut OsRng),
        };
        let did = key::did_key_from_public_key(&signing_key.verifying_key());
        let vm_id = key::did_key_verification_method_id(&did)?;
        let document = key::ed25519_document(&did, &vm_id, &signing_key.verifying_key());

        let record = self
            .store(&did, "key", options.alias, &vm_id, signing_key)
            .await?;
        info!("Created DID {did} in wallet {}", self.wallet.id);
        emit(
            &self.events,
            EventPayload::DidCreated {
                did: did.clone(),
                method: "key".to_string(),
            },
        );

        Ok(DidCreateResult {
            did_state: DidState {
                state: "finished".to_string(),
                did,
                did_document: document,
            },
            did_record: record,
        })
    }

    /// Import an existing DID together with its private key.
    pub async fn import(&self, options: DidImportOptions) -> Result<DidRecord, DidError> {
        let method = did_method(&options.did)?.to_string();
        if !options.overwrite && self.wallet.dids().find(&options.did).await.is_some() {
            return Err(DidError::AlreadyExists(options.did));
        }

        let Some(imported) = options.private_keys.first() else {
            return Err(DidError::InvalidKey("no private key supplied".to_string()));
        };
        let signing_key = match imported.key_type {
            KeyType::Ed25519 => SigningKey::from_bytes(&imported.private_key),
        };

        let vm_id = if method == "key" {
            if key::public_key_from_did_key(&options.did)? != signing_key.verifying_key() {
                return Err(DidError::InvalidKey(format!(
                    "private key does not control {}",
                    options.did
                )));
            }
            key::did_key_verification_method_id(&options.did)?
        } else {
            format!("{}#key-1", options.did)
        };

        let record = self
            .store(&options.did, &method, None, &vm_id, signing_key)
            .await?;
        info!("Imported DID {}", options.did);
        Ok(record)
    }

    /// Resolve a DID to its document.
    pub async fn resolve(&self, did: &str) -> DidResolutionResult {
        debug!("Resolving {did}");
        let method = match did_method(did) {
            Ok(method) => method,
            Err(e) => return DidResolutionResult::failed(ResolutionError::InvalidDid, e.to_string()),
        };

        if method == "key" {
            return match key::did_key_document(did) {
                Ok(document) => DidResolutionResult::resolved(document),
                Err(e) => DidResolutionResult::failed(ResolutionError::InvalidDid, e.to_string()),
            };
        }

        // other methods resolve only for DIDs held in the wallet
        match self.wallet_document(did).await {
            Some(document) => DidResolutionResult::resolved(document),
            None if matches!(method, "indy" | "sov" | "ethr") => DidResolutionResult::failed(
                ResolutionError::NotFound,
                format!("{did} is not held by this agent"),
            ),
            None => DidResolutionResult::failed(
                ResolutionError::UnsupportedDidMethod,
                format!("no resolver registered for did:{method}"),
            ),
        }
    }

    pub async fn created_dids(&self) -> Vec<DidRecord> {
        self.wallet.dids().all().await
    }

    /// Return the DID cached under `alias`, creating it on first use.
    pub async fn get_or_create(&self, alias: &str) -> Result<DidRecord, DidError> {
        let _guard = self.alias_lock.lock().await;
        if let Some(record) = self.wallet.dids().find_by_alias(alias).await {
            debug!("Using cached DID {} for alias {alias}", record.did);
            return Ok(record);
        }
        let created = self
            .create(DidCreateOptions {
                alias: Some(alias.to_string()),
                ..Default::default()
            })
            .await?;
        Ok(created.did_record)
    }

    /// First created DID whose key is held in the wallet.
    pub async fn default_signing_did(&self) -> Option<String> {
        for record in self.created_dids().await {
            if self.wallet.has_key(&record.did).await {
                return Some(record.did);
            }
        }
        None
    }

    /// Key id and signing key for a DID held in the wallet.
    pub async fn signer(&self, did: &str) -> Result<(String, SigningKey), DidError> {
        self.wallet.signer_for(did).await
    }

    /// Dereference a verification method (or bare DID) to its public key.
    pub async fn resolve_verification_key(&self, kid: &str) -> Result<VerifyingKey, DidError> {
        let did = kid.split('#').next().unwrap_or(kid);
        let resolution = self.resolve(did).await;
        let document = resolution.did_document.ok_or_else(|| {
            let message = resolution.did_resolution_metadata.message.unwrap_or_default();
            DidError::NotFound(format!("{did}: {message}"))
        })?;

        let method = document
            .verification_method
            .iter()
            .find(|vm| vm.id == kid)
            .or_else(|| {
                // bare DID: fall back to the first assertion method
                (kid == did).then(|| document.verification_method.first()).flatten()
            })
            .ok_or_else(|| DidError::NotFound(kid.to_string()))?;
        key::public_key_from_multikey(&method.public_key_multibase)
    }

    async fn wallet_document(&self, did: &str) -> Option<DidDocument> {
        let record = self.wallet.dids().find(did).await?;
        let vm_id = record
            .verification_method_id
            .unwrap_or_else(|| format!("{did}#key-1"));
        let public_key = match record.public_key_multibase {
            Some(multikey) => key::public_key_from_multikey(&multikey).ok()?,
            None => self.wallet.verifying_key(did).await?,
        };
        Some(key::ed25519_document(did, &vm_id, &public_key))
    }

    async fn store(
        &self, did: &str, method: &str, alias: Option<String>, vm_id: &str, signing_key: SigningKey,
    ) -> Result<DidRecord, DidError> {
        let record = DidRecord {
            id: uuid::Uuid::new_v4().to_string(),
            did: did.to_string(),
            method: method.to_string(),
            alias,
            created_at: Utc::now(),
            verification_method_id: Some(vm_id.to_string()),
            public_key_multibase: Some(key::multikey(&signing_key.verifying_key())),
        };
        self.wallet.dids().save(record.clone()).await?;
        self.wallet.insert_key(did, vm_id, signing_key).await;
        Ok(record)
    }
}

impl DidRegistry for DidsApi {
    async fn created_dids(&self) -> Vec<DidRecord> {
        Self::created_dids(self).await
    }

    async fn import(&self, options: DidImportOptions) -> Result<DidRecord, DidError> {
        Self::import(self, options).await
    }
}
