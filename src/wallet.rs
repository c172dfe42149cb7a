/// Wallet: signing keys held in memory plus the DID record cache.
///
/// Keys never leave this module except as a `SigningKey` handed to a signer.
/// DID records can be persisted to a JSON file so a DID is created once per
/// wallet; keys are not persisted.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ed25519_dalek::{SigningKey, VerifyingKey};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::dids::{DidError, DidRecord};

#[derive(Clone)]
struct KeyEntry {
    verification_method_id: String,
    signing_key: SigningKey,
}

pub struct Wallet {
    pub id: String,
    keys: RwLock<HashMap<String, KeyEntry>>,
    dids: DidStore,
}

impl Wallet {
    /// In-memory wallet with no DID cache file.
    pub fn in_memory(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keys: RwLock::new(HashMap::new()),
            dids: DidStore::in_memory(),
        }
    }

    /// Open a wallet, loading the DID cache from `cache_path` if given.
    pub async fn open(id: impl Into<String>, cache_path: Option<PathBuf>) -> Result<Self, DidError> {
        let dids = match cache_path {
            Some(path) => DidStore::load(path).await?,
            None => DidStore::in_memory(),
        };
        Ok(Self {
            id: id.into(),
            keys: RwLock::new(HashMap::new()),
            dids,
        })
    }

    pub fn dids(&self) -> &DidStore {
        &self.dids
    }

    /// Store (or replace) the key controlling `did`.
    pub async fn insert_key(&self, did: &str, verification_method_id: &str, signing_key: SigningKey) {
        self.keys.write().await.insert(
            did.to_string(),
            KeyEntry {
                verification_method_id: verification_method_id.to_string(),
                signing_key,
            },
        );
    }

    pub async fn has_key(&self, did: &str) -> bool {
        self.keys.read().await.contains_key(did)
    }

    /// Key id and signing key for `did`.
    pub async fn signer_for(&self, did: &str) -> Result<(String, SigningKey), DidError> {
        self.keys
            .read()
            .await
            .get(did)
            .map(|entry| (entry.verification_method_id.clone(), entry.signing_key.clone()))
            .ok_or_else(|| DidError::KeyNotFound(did.to_string()))
    }

    pub async fn verifying_key(&self, did: &str) -> Option<VerifyingKey> {
        self.keys
            .read()
            .await
            .get(did)
            .map(|entry| entry.signing_key.verifying_key())
    }
}

/// DID records created in or imported into the wallet.
pub struct DidStore {
    records: RwLock<Vec<DidRecord>>,
    path: Option<PathBuf>,
}

impl DidStore {
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            path: None,
        }
    }

    /// Load the cache file; a missing file is an empty cache.
    pub async fn load(path: PathBuf) -> Result<Self, DidError> {
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<DidRecord>>(&bytes)
                .map_err(|e| DidError::Storage(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(DidError::Storage(format!("{}: {e}", path.display()))),
        };
        info!("Loaded {} DID record(s) from {}", records.len(), path.display());
        Ok(Self {
            records: RwLock::new(records),
            path: Some(path),
        })
    }

    pub async fn all(&self) -> Vec<DidRecord> {
        self.records.read().await.clone()
    }

    pub async fn find(&self, did: &str) -> Option<DidRecord> {
        self.records.read().await.iter().find(|r| r.did == did).cloned()
    }

    pub async fn find_by_alias(&self, alias: &str) -> Option<DidRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.alias.as_deref() == Some(alias))
            .cloned()
    }

    /// Insert a record, replacing any record for the same DID, and persist.
    /// Memory is only updated once the cache file has been written.
    pub async fn save(&self, record: DidRecord) -> Result<(), DidError> {
        let mut records = self.records.write().await;
        let mut updated = records.clone();
        match updated.iter_mut().find(|r| r.did == record.did) {
            Some(existing) => *existing = record,
            None => updated.push(record),
        }
        if let Some(path) = &self.path {
            persist(path, &updated).await?;
        }
        *records = updated;
        Ok(())
    }
}

async fn persist(path: &Path, records: &[DidRecord]) -> Result<(), DidError> {
    let storage_err = |e: std::io::Error| DidError::Storage(format!("{}: {e}", path.display()));
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
    }
    let json = serde_json::to_vec_pretty(records).map_err(|e| DidError::Storage(e.to_string()))?;
    tokio::fs::write(path, json).await.map_err(storage_err)?;
    debug!("Persisted {} DID record(s) to {}", records.len(), path.display());
    Ok(())
}
