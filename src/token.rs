// Client assertion for the ASM API: an ES256 JWT signed with the account's
// private key, valid for 20 minutes. A new one is minted for every request.

use crate::config::Credentials;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Audience the ASM token endpoint expects in every assertion.
pub const AUDIENCE: &str = "https://account.apple.com/auth/oauth2/v2/token";

pub const TOKEN_LIFETIME_MINUTES: i64 = 20;

/// Payload of the signed assertion. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// A signed assertion plus the window it is valid for.
#[derive(Debug, Clone)]
pub struct AuthToken {
    token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

/// Holds the parsed signing key so each request only pays for signing.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    key_id: String,
    issuer_id: String,
}

impl TokenIssuer {
    /// Parse the PEM key. A key that is not a PKCS#8 EC key fails here with
    /// `AsmError::Signing`.
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let key = EncodingKey::from_ec_pem(credentials.key_pem())?;
        Ok(TokenIssuer {
            key,
            key_id: credentials.key_id().to_string(),
            issuer_id: credentials.issuer_id().to_string(),
        })
    }

    /// Mint a token valid from now.
    pub fn mint(&self) -> Result<AuthToken> {
        self.mint_at(Utc::now())
    }

    /// Mint a token as if the clock read `now`. Sub-second precision is
    /// dropped so `exp - iat` is exactly the lifetime.
    pub fn mint_at(&self, now: DateTime<Utc>) -> Result<AuthToken> {
        let iat = now.timestamp();
        let exp = iat + Duration::minutes(TOKEN_LIFETIME_MINUTES).num_seconds();

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        let claims = Claims {
            iss: self.issuer_id.clone(),
            iat,
            exp,
            aud: AUDIENCE.to_string(),
        };
        let token = encode(&header, &claims, &self.key)?;

        Ok(AuthToken {
            token,
            issued_at: DateTime::from_timestamp(iat, 0).unwrap_or(now),
            expires_at: DateTime::from_timestamp(exp, 0).unwrap_or(now),
        })
    }
}
