use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HS512 needs a key at least as long as its 512-bit output.
pub const MIN_SECRET_LEN: usize = 64;

/// Claims
///
/// Payload of an identity token. Only the subject is populated: the decimal string
/// form of the user id. No `exp`/`iat` is carried, so tokens do not expire.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    WeakKey(usize),
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

/// TokenService
///
/// Issues and verifies compact HS512 tokens with a key fixed at construction.
/// The keys are immutable behind an `Arc`, so clones are cheap and every method can
/// be called concurrently without locking. Verification never raises: malformed
/// input, a bad signature or an unexpected algorithm simply fail closed.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<Keys>,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakKey(secret.len()));
        }

        let mut validation = Validation::new(Algorithm::HS512);
        // The payload carries no registered time claims.
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;

        Ok(Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
                validation,
            }),
        })
    }

    /// issue
    ///
    /// Signs a token whose subject is `user_id` in decimal form.
    pub fn issue(&self, user_id: i64) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.keys.encoding)?;
        Ok(token)
    }

    /// verify
    ///
    /// True only for a well-formed token signed with this service's key.
    pub fn verify(&self, token: &str) -> bool {
        self.decode(token).is_some()
    }

    /// extract_subject
    ///
    /// The user id carried by a structurally valid, correctly signed token.
    /// Only the canonical decimal form of an `i64` is accepted, so `"+7"`,
    /// `"007"` or `" 7"` yield `None` rather than aliasing user 7.
    pub fn extract_subject(&self, token: &str) -> Option<i64> {
        let sub = self.decode(token)?.sub;
        let id: i64 = sub.parse().ok()?;
        (id.to_string() == sub).then_some(id)
    }

    fn decode(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.keys.decoding, &self.keys.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(kind = ?e.kind(), "token rejected");
                None
            }
        }
    }
}
