/// OpenID4VC modules: the credential issuer and the presentation verifier.
mod issuer;
mod verifier;

pub use issuer::*;
pub use verifier::*;
