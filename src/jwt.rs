/// # Compact JWS (EdDSA)
///
/// Just enough of RFC 7515 to sign and verify JWT-encoded verifiable
/// credentials with Ed25519 keys held in the wallet.
use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ALG_EDDSA: &str = "EdDSA";

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("invalid compact JWS format")]
    Format,
    #[error("issue decoding {0}: {1}")]
    Encoding(&'static str, base64ct::Error),
    #[error("issue deserializing {0}: {1}")]
    Json(&'static str, serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("missing key ID in JWS header")]
    MissingKid,
    #[error("signature verification failed")]
    InvalidSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A decoded (not yet verified) JWT.
#[derive(Debug, Clone)]
pub struct Jwt<T> {
    pub header: Header,
    pub claims: T,
    signing_input: String,
    signature: Vec<u8>,
}

impl<T> Jwt<T> {
    pub fn kid(&self) -> Result<&str, JwtError> {
        self.header.kid.as_deref().ok_or(JwtError::MissingKid)
    }

    /// Verify the signature against `public_key`.
    pub fn verify(&self, public_key: &VerifyingKey) -> Result<(), JwtError> {
        if self.header.alg != ALG_EDDSA {
            return Err(JwtError::UnsupportedAlgorithm(self.header.alg.clone()));
        }
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| JwtError::InvalidSignature)?;
        public_key
            .verify(self.signing_input.as_bytes(), &signature)
            .map_err(|_| JwtError::InvalidSignature)
    }
}

/// Sign `claims`, returning a JWT in compact JWS form.
pub fn encode<T: Serialize>(kid: &str, claims: &T, signing_key: &SigningKey) -> Result<String, JwtError> {
    let header = Header {
        alg: ALG_EDDSA.to_string(),
        typ: Some("JWT".to_string()),
        kid: Some(kid.to_string()),
    };
    let header = serde_json::to_vec(&header).map_err(|e| JwtError::Json("header", e))?;
    let claims = serde_json::to_vec(claims).map_err(|e| JwtError::Json("claims", e))?;

    let signing_input = format!(
        "{}.{}",
        Base64UrlUnpadded::encode_string(&header),
        Base64UrlUnpadded::encode_string(&claims)
    );
    let signature = signing_key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        Base64UrlUnpadded::encode_string(&signature.to_bytes())
    ))
}

/// Decode a compact JWS without verifying it.
pub fn decode<T: DeserializeOwned>(compact: &str) -> Result<Jwt<T>, JwtError> {
    let parts = compact.split('.').collect::<Vec<&str>>();
    let [header, claims, signature] = parts[..] else {
        return Err(JwtError::Format);
    };

    let decoded = Base64UrlUnpadded::decode_vec(header).map_err(|e| JwtError::Encoding("header", e))?;
    let header: Header =
        serde_json::from_slice(&decoded).map_err(|e| JwtError::Json("header", e))?;
    let decoded = Base64UrlUnpadded::decode_vec(claims).map_err(|e| JwtError::Encoding("claims", e))?;
    let claims_value: T =
        serde_json::from_slice(&decoded).map_err(|e| JwtError::Json("claims", e))?;
    let signature_bytes =
        Base64UrlUnpadded::decode_vec(signature).map_err(|e| JwtError::Encoding("signature", e))?;

    Ok(Jwt {
        header,
        claims: claims_value,
        signing_input: format!("{}.{}", parts[0], parts[1]),
        signature: signature_bytes,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let claims = json!({ "iss": "did:key:z6Mk", "sub": "did:example:holder" });
        let token = encode("did:key:z6Mk#z6Mk", &claims, &key).unwrap();

        let jwt = decode::<Value>(&token).unwrap();
        assert_eq!(jwt.kid().unwrap(), "did:key:z6Mk#z6Mk");
        assert_eq!(jwt.claims, claims);
        jwt.verify(&key.verifying_key()).unwrap();

        let other = SigningKey::from_bytes(&[8u8; 32]);
        assert!(matches!(
            jwt.verify(&other.verifying_key()),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_claims() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let token = encode("kid", &json!({ "admin": false }), &key).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged = Base64UrlUnpadded::encode_string(br#"{"admin":true}"#);
        let tampered = format!("{}.{forged}.{}", parts[0], parts[2]);

        let jwt = decode::<Value>(&tampered).unwrap();
        assert!(jwt.verify(&key.verifying_key()).is_err());
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(decode::<Value>("a.b"), Err(JwtError::Format)));
        assert!(matches!(
            decode::<Value>("!!.e30.AA"),
            Err(JwtError::Encoding("header", _))
        ));
    }
}
