/// Verify a JWT-VC: decode, dereference the signing key through DID
/// resolution, then check signature, issuer binding and validity window.
/// A credential object must also be exactly the credential its JWT signs.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::issue_credential::JwtVcClaims;
use crate::dids::DidsApi;
use crate::error::AgentError;
use crate::jwt;

/// Tolerated clock difference for `nbf`/`exp`, in seconds.
const CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerificationError {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerificationResult {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<VerificationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<JwtVcClaims>,
}

impl VerificationResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            verified: false,
            error: Some(VerificationError {
                message: message.into(),
            }),
            payload: None,
        }
    }
}

/// Pull the compact JWT out of either a bare string or a VC carrying `proof.jwt`.
fn extract_jwt(credential: &Value) -> Option<&str> {
    match credential {
        Value::String(token) => Some(token),
        Value::Object(vc) => vc.get("proof")?.get("jwt")?.as_str(),
        _ => None,
    }
}

/// Verify `credential`. An unverifiable credential is a normal result,
/// not an error; only an unrecognisable payload is rejected.
pub async fn verify_credential(dids: &DidsApi, credential: &Value) -> Result<VerificationResult, AgentError> {
    let token = extract_jwt(credential).ok_or_else(|| {
        AgentError::InvalidRequest(
            "credential must be a JWT or a credential with proof.jwt".to_string(),
        )
    })?;

    let verified = verify_jwt(dids, token).await.and_then(|claims| match credential {
        Value::Object(vc) => matches_payload(vc, &claims).map(|()| claims),
        _ => Ok(claims),
    });
    let result = match verified {
        Ok(claims) => VerificationResult {
            verified: true,
            error: None,
            payload: Some(claims),
        },
        Err(message) => {
            warn!("Credential verification failed: {message}");
            VerificationResult::failed(message)
        }
    };
    Ok(result)
}

fn timestamp(secs: i64) -> Result<String, String> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| format!("timestamp {secs} out of range"))
}

/// Rebuild the credential from its signed payload and require the submitted
/// object (without `proof`) to be exactly that credential.
fn matches_payload(vc: &Map<String, Value>, claims: &JwtVcClaims) -> Result<(), String> {
    let mut expected = match &claims.vc {
        Value::Object(payload) => payload.clone(),
        _ => return Err("JWT vc claim is not an object".to_string()),
    };
    expected.insert("issuer".to_string(), json!({ "id": claims.iss }));
    if let Some(jti) = &claims.jti {
        expected.insert("id".to_string(), json!(jti));
    }
    if let Some(nbf) = claims.nbf {
        expected.insert("issuanceDate".to_string(), json!(timestamp(nbf)?));
    }
    if let Some(exp) = claims.exp {
        expected.insert("expirationDate".to_string(), json!(timestamp(exp)?));
    }

    let mut submitted = vc.clone();
    submitted.remove("proof");
    // `issuer` may be given as a bare DID
    if let Some(Value::String(issuer)) = submitted.get("issuer") {
        let issuer = json!({ "id": issuer });
        submitted.insert("issuer".to_string(), issuer);
    }

    if submitted != expected {
        return Err("credential does not match its JWT payload".to_string());
    }
    Ok(())
}

async fn verify_jwt(dids: &DidsApi, token: &str) -> Result<JwtVcClaims, String> {
    let decoded = jwt::decode::<JwtVcClaims>(token).map_err(|e| e.to_string())?;
    let kid = decoded.kid().map_err(|e| e.to_string())?;
    debug!("Verifying credential signed with {kid}");

    let kid_did = kid.split('#').next().unwrap_or(kid);
    if decoded.claims.iss != kid_did {
        return Err(format!("issuer {} does not control key {kid}", decoded.claims.iss));
    }

    let public_key = dids
        .resolve_verification_key(kid)
        .await
        .map_err(|e| e.to_string())?;
    decoded.verify(&public_key).map_err(|e| e.to_string())?;

    let now = Utc::now().timestamp();
    if let Some(nbf) = decoded.claims.nbf {
        if nbf > now + CLOCK_SKEW_SECS {
            return Err("credential is not yet valid".to_string());
        }
    }
    if let Some(exp) = decoded.claims.exp {
        if exp <= now - CLOCK_SKEW_SECS {
            return Err("credential has expired".to_string());
        }
    }
    Ok(decoded.claims)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use ed25519_dalek::SigningKey;
    use serde_json::json;

    use super::*;
    use crate::dids::DidCreateOptions;
    use crate::dids::key::{did_key_from_public_key, did_key_verification_method_id};
    use crate::events::create_event_channel;
    use crate::flows::issue_credential::{IssueCredentialRequest, create_verifiable_credential};
    use crate::wallet::Wallet;

    async fn issuer() -> DidsApi {
        let dids = DidsApi::new(Arc::new(Wallet::in_memory("test")), create_event_channel());
        dids.create(DidCreateOptions::default()).await.unwrap();
        dids
    }

    async fn issue(dids: &DidsApi, expiration_days: Option<i64>) -> Value {
        create_verifiable_credential(
            dids,
            IssueCredentialRequest {
                subject: "did:example:holder".to_string(),
                claims: json!({ "degree": "BSc" }),
                issuer: None,
                expiration_date: expiration_days.map(|d| Utc::now() + Duration::days(d)),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_verify_issued_credential() {
        let dids = issuer().await;
        let vc = issue(&dids, Some(30)).await;

        let result = verify_credential(&dids, &vc).await.unwrap();
        assert!(result.verified, "{result:?}");
        assert_eq!(result.payload.unwrap().vc["credentialSubject"]["degree"], "BSc");

        // bare JWTs are accepted as well
        let result = verify_credential(&dids, &vc["proof"]["jwt"]).await.unwrap();
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_verify_with_another_agent() {
        // did:key credentials verify without access to the issuer's wallet
        let vc = issue(&issuer().await, None).await;
        let verifier = DidsApi::new(Arc::new(Wallet::in_memory("verifier")), create_event_channel());
        assert!(verify_credential(&verifier, &vc).await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_tampered_and_expired() {
        let dids = issuer().await;
        let vc = issue(&dids, None).await;
        let token = vc["proof"]["jwt"].as_str().unwrap();
        let (signing_input, signature) = token.rsplit_once('.').unwrap();
        let flipped = if signature.starts_with('A') { 'B' } else { 'A' };
        let tampered = format!("{signing_input}.{flipped}{}", &signature[1..]);
        let result = verify_credential(&dids, &json!(tampered)).await.unwrap();
        assert!(!result.verified);
        assert!(result.error.is_some());

        let expired = issue(&dids, Some(-1)).await;
        let result = verify_credential(&dids, &expired).await.unwrap();
        assert_eq!(result, VerificationResult::failed("credential has expired"));
    }

    #[tokio::test]
    async fn test_tampered_credential_object() {
        let dids = issuer().await;
        let vc = issue(&dids, Some(30)).await;

        let mut subject = vc.clone();
        subject["credentialSubject"]["degree"] = json!("PhD");
        let result = verify_credential(&dids, &subject).await.unwrap();
        assert_eq!(
            result,
            VerificationResult::failed("credential does not match its JWT payload")
        );

        let mut issuer = vc.clone();
        issuer["issuer"]["id"] = json!("did:example:attacker");
        assert!(!verify_credential(&dids, &issuer).await.unwrap().verified);

        let mut expiry = vc.clone();
        expiry["expirationDate"] = json!("2999-01-01T00:00:00Z");
        assert!(!verify_credential(&dids, &expiry).await.unwrap().verified);

        let mut extra = vc.clone();
        extra["evidence"] = json!([]);
        assert!(!verify_credential(&dids, &extra).await.unwrap().verified);

        // a bare-DID issuer is the same credential
        let mut bare = vc.clone();
        bare["issuer"] = bare["issuer"]["id"].clone();
        assert!(verify_credential(&dids, &bare).await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_issuer_must_match_key() {
        let dids = issuer().await;
        let key = SigningKey::from_bytes(&[5u8; 32]);
        let did = did_key_from_public_key(&key.verifying_key());
        let kid = did_key_verification_method_id(&did).unwrap();
        let claims = JwtVcClaims {
            iss: "did:example:someone-else".to_string(),
            sub: None,
            nbf: None,
            iat: None,
            exp: None,
            jti: None,
            vc: json!({}),
        };
        let token = jwt::encode(&kid, &claims, &key).unwrap();
        let result = verify_credential(&dids, &json!(token)).await.unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_unrecognised_payload() {
        let dids = issuer().await;
        for credential in [json!(42), json!({ "proof": {} }), json!(null)] {
            assert!(matches!(
                verify_credential(&dids, &credential).await,
                Err(AgentError::InvalidRequest(_))
            ));
        }
    }
}
