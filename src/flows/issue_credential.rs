/// Issue a W3C verifiable credential as a JWT-VC signed by a wallet DID.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{JWT_PROOF_TYPE, VC_CONTEXT_V1, VERIFIABLE_CREDENTIAL};
use crate::dids::DidsApi;
use crate::error::AgentError;
use crate::jwt;

/// Alias of the DID created on first issuance when the wallet has no signing DID.
pub const ISSUER_DID_ALIAS: &str = "issuer";

/// Registered JWT claims of a JWT-encoded verifiable credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtVcClaims {
    pub iss: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub vc: Value,
}

#[derive(Debug, Clone)]
pub struct IssueCredentialRequest {
    /// Holder DID (or other identifier) the claims are about.
    pub subject: String,
    pub claims: Value,
    /// Issuer DID; defaults to the first wallet DID with a key, then to the
    /// DID cached under [`ISSUER_DID_ALIAS`].
    pub issuer: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Build, sign and return the credential with a `JwtProof2020` proof.
pub async fn create_verifiable_credential(
    dids: &DidsApi,
    request: IssueCredentialRequest,
) -> Result<Value, AgentError> {
    let Value::Object(claims) = request.claims else {
        return Err(AgentError::InvalidRequest(
            "claims must be a JSON object".to_string(),
        ));
    };

    let (issuer, explicit) = match request.issuer {
        Some(issuer) => (issuer, true),
        None => match dids.default_signing_did().await {
            Some(did) => (did, false),
            None => (dids.get_or_create(ISSUER_DID_ALIAS).await?.did, false),
        },
    };
    let (kid, signing_key) = match dids.signer(&issuer).await {
        Ok(signer) => signer,
        Err(_) if explicit => {
            return Err(AgentError::InvalidRequest(format!(
                "issuer {issuer} has no key in this wallet"
            )));
        }
        // cached issuer DID whose key did not survive a restart
        Err(_) => return Err(AgentError::NoIssuerDid),
    };
    debug!("Issuing credential for {} with key {kid}", request.subject);

    let now = Utc::now();
    let credential_id = format!("urn:uuid:{}", uuid::Uuid::new_v4());

    let mut credential_subject = Map::new();
    credential_subject.insert("id".to_string(), Value::String(request.subject.clone()));
    for (name, value) in claims {
        if name != "id" {
            credential_subject.insert(name, value);
        }
    }

    let mut credential = json!({
        "@context": [VC_CONTEXT_V1],
        "id": credential_id,
        "type": [VERIFIABLE_CREDENTIAL],
        "issuer": { "id": issuer },
        "issuanceDate": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        "credentialSubject": credential_subject,
    });
    if let Some(expiration) = request.expiration_date {
        credential["expirationDate"] = json!(expiration.to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    let jwt_claims = JwtVcClaims {
        iss: issuer.clone(),
        sub: Some(request.subject),
        nbf: Some(now.timestamp()),
        iat: Some(now.timestamp()),
        exp: request.expiration_date.map(|exp| exp.timestamp()),
        jti: Some(credential_id),
        vc: json!({
            "@context": credential["@context"],
            "type": credential["type"],
            "credentialSubject": credential["credentialSubject"],
        }),
    };
    let token = jwt::encode(&kid, &jwt_claims, &signing_key)?;

    credential["proof"] = json!({ "type": JWT_PROOF_TYPE, "jwt": token });
    info!("Issued credential {} from {issuer}", jwt_claims.jti.as_deref().unwrap_or_default());
    Ok(credential)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dids::{DidCreateOptions, DidRecord};
    use crate::events::create_event_channel;
    use crate::wallet::Wallet;

    fn dids_api() -> DidsApi {
        DidsApi::new(Arc::new(Wallet::in_memory("test")), create_event_channel())
    }

    fn request(claims: Value) -> IssueCredentialRequest {
        IssueCredentialRequest {
            subject: "did:example:holder".to_string(),
            claims,
            issuer: None,
            expiration_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_verifiable_credential() {
        let dids = dids_api();
        let issuer = dids.create(DidCreateOptions::default()).await.unwrap().did_state.did;

        let vc = create_verifiable_credential(&dids, request(json!({ "degree": "BSc", "id": "ignored" })))
            .await
            .unwrap();
        assert_eq!(vc["issuer"]["id"], issuer);
        assert_eq!(vc["credentialSubject"]["id"], "did:example:holder");
        assert_eq!(vc["credentialSubject"]["degree"], "BSc");
        assert_eq!(vc["proof"]["type"], JWT_PROOF_TYPE);

        let token = vc["proof"]["jwt"].as_str().unwrap();
        let decoded = jwt::decode::<JwtVcClaims>(token).unwrap();
        assert_eq!(decoded.claims.iss, issuer);
        assert_eq!(decoded.claims.sub.as_deref(), Some("did:example:holder"));
        assert_eq!(decoded.claims.jti.as_deref(), vc["id"].as_str());
        assert!(decoded.kid().unwrap().starts_with(&issuer));
    }

    #[tokio::test]
    async fn test_issuer_did_created_once() {
        let dids = dids_api();
        let first = create_verifiable_credential(&dids, request(json!({ "a": 1 })))
            .await
            .unwrap();
        let second = create_verifiable_credential(&dids, request(json!({ "a": 2 })))
            .await
            .unwrap();
        assert_eq!(first["issuer"], second["issuer"]);

        let created = dids.created_dids().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].alias.as_deref(), Some(ISSUER_DID_ALIAS));
    }

    #[tokio::test]
    async fn test_cached_issuer_without_key() {
        let wallet = Arc::new(Wallet::in_memory("test"));
        wallet
            .dids()
            .save(DidRecord {
                id: "cached".to_string(),
                did: "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK".to_string(),
                method: "key".to_string(),
                alias: Some(ISSUER_DID_ALIAS.to_string()),
                created_at: Utc::now(),
                verification_method_id: None,
                public_key_multibase: None,
            })
            .await
            .unwrap();
        let dids = DidsApi::new(wallet, create_event_channel());

        let err = create_verifiable_credential(&dids, request(json!({ "a": 1 })))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoIssuerDid));
    }

    #[tokio::test]
    async fn test_rejects_non_object_claims_and_foreign_issuer() {
        let dids = dids_api();
        dids.create(DidCreateOptions::default()).await.unwrap();

        let err = create_verifiable_credential(&dids, request(json!(["a"])))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidRequest(_)));

        let err = create_verifiable_credential(
            &dids,
            IssueCredentialRequest {
                issuer: Some("did:ethr:0xabc".to_string()),
                ..request(json!({ "a": 1 }))
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::InvalidRequest(_)));
    }
}
