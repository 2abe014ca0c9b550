//! RS256 signed access tokens.
//!
//! Every token is signed with RS256 and verification refuses any header that
//! names a different algorithm before the claims are looked at.

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde::{Deserialize, Serialize};

use crate::config::KeyMaterial;
use crate::errors::TokenError;

/// The only algorithm used to sign or accepted to verify
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    /// Client identifier the token was issued to
    pub aud: String,
    /// User email, or the client identifier for client credentials tokens
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies access tokens with the server key pair.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenCodec {
    pub fn from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
        issuer: impl Into<String>,
    ) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| TokenError::InvalidKey(format!("private key: {}", e)))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| TokenError::InvalidKey(format!("public key: {}", e)))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: issuer.into(),
        })
    }

    pub fn from_key_material(
        material: &KeyMaterial,
        issuer: impl Into<String>,
    ) -> Result<Self, TokenError> {
        Self::from_pem(&material.private_pem, &material.public_pem, issuer)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a token for `subject` issued to `client_id`, valid for `lifetime` seconds.
    pub fn sign(&self, client_id: &str, subject: &str, lifetime: u64) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: self.issuer.clone(),
            aud: client_id.to_string(),
            sub: subject.to_string(),
            iat: now,
            exp: now + lifetime as i64,
        };
        self.sign_claims(&claims)
    }

    pub fn sign_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::SigningFailed(e.to_string()))
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let header =
            decode_header(token).map_err(|e| TokenError::VerificationFailed(e.to_string()))?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(TokenError::UnexpectedAlgorithm(format!("{:?}", header.alg)));
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Audience varies per client; callers inspect it when they need to.
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub", "aud"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::VerificationFailed(e.to_string()))
    }
}
