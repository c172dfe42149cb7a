/// `did:key` for Ed25519 keys.
///
/// The method-specific identifier is the multibase (base58btc) encoding of the
/// multicodec-prefixed public key, so resolution needs no network access.
use ed25519_dalek::{PUBLIC_KEY_LENGTH, VerifyingKey};
use multibase::Base;

use super::{DidDocument, DidError, VerificationMethod};

/// Multicodec prefix for an Ed25519 public key.
pub const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

pub const DID_KEY_PREFIX: &str = "did:key:";

/// Multibase (`z…`) encoding of a multicodec Ed25519 public key.
pub fn multikey(public_key: &VerifyingKey) -> String {
    let mut bytes = Vec::with_capacity(ED25519_CODEC.len() + PUBLIC_KEY_LENGTH);
    bytes.extend_from_slice(&ED25519_CODEC);
    bytes.extend_from_slice(public_key.as_bytes());
    multibase::encode(Base::Base58Btc, bytes)
}

pub fn did_key_from_public_key(public_key: &VerifyingKey) -> String {
    format!("{DID_KEY_PREFIX}{}", multikey(public_key))
}

/// Verification method id for a `did:key`: `<did>#<multikey>`.
pub fn did_key_verification_method_id(did: &str) -> Result<String, DidError> {
    let multikey = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| DidError::InvalidDid(did.to_string()))?;
    Ok(format!("{did}#{multikey}"))
}

pub fn public_key_from_did_key(did: &str) -> Result<VerifyingKey, DidError> {
    let did = did.split('#').next().unwrap_or(did);
    let multikey = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| DidError::InvalidDid(did.to_string()))?;
    public_key_from_multikey(multikey).map_err(|_| DidError::InvalidDid(did.to_string()))
}

pub fn public_key_from_multikey(multikey: &str) -> Result<VerifyingKey, DidError> {
    let (base, bytes) =
        multibase::decode(multikey).map_err(|e| DidError::InvalidKey(e.to_string()))?;
    if base != Base::Base58Btc {
        return Err(DidError::InvalidKey(format!("unexpected multibase {base:?}")));
    }
    let Some(raw) = bytes.strip_prefix(&ED25519_CODEC[..]) else {
        return Err(DidError::InvalidKey("not an Ed25519 multikey".to_string()));
    };
    let raw: [u8; PUBLIC_KEY_LENGTH] = raw
        .try_into()
        .map_err(|_| DidError::InvalidKey(format!("expected 32 key bytes, got {}", raw.len())))?;
    VerifyingKey::from_bytes(&raw).map_err(|e| DidError::InvalidKey(e.to_string()))
}

/// Build the DID document for a DID controlled by a single Ed25519 key.
pub fn ed25519_document(did: &str, vm_id: &str, public_key: &VerifyingKey) -> DidDocument {
    DidDocument {
        context: vec![
            "https://www.w3.org/ns/did/v1".to_string(),
            "https://w3id.org/security/suites/ed25519-2020/v1".to_string(),
        ],
        id: did.to_string(),
        verification_method: vec![VerificationMethod {
            id: vm_id.to_string(),
            type_: "Ed25519VerificationKey2020".to_string(),
            controller: did.to_string(),
            public_key_multibase: multikey(public_key),
        }],
        authentication: vec![vm_id.to_string()],
        assertion_method: vec![vm_id.to_string()],
        capability_invocation: vec![vm_id.to_string()],
        capability_delegation: vec![vm_id.to_string()],
    }
}

/// Resolve a `did:key` locally.
pub fn did_key_document(did: &str) -> Result<DidDocument, DidError> {
    let public_key = public_key_from_did_key(did)?;
    let vm_id = did_key_verification_method_id(did)?;
    Ok(ed25519_document(did, &vm_id, &public_key))
}
