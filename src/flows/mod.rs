pub mod issue_credential;
pub mod verify_credential;

/// W3C credential vocabulary shared by the issue and verify flows.
pub const VC_CONTEXT_V1: &str = "https://www.w3.org/2018/credentials/v1";
pub const VERIFIABLE_CREDENTIAL: &str = "VerifiableCredential";
pub const JWT_PROOF_TYPE: &str = "JwtProof2020";
