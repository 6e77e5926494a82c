use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};

use storyloom_types::api::Claims;

/// Which secret a token is signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

/// Issues and verifies HS256 tokens. Access and refresh tokens use separate
/// secrets so one can never stand in for the other.
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access_token(&self, user_id: i64, email: &str) -> anyhow::Result<String> {
        self.issue(KeyClass::Access, user_id, email)
    }

    pub fn issue_refresh_token(&self, user_id: i64, email: &str) -> anyhow::Result<String> {
        self.issue(KeyClass::Refresh, user_id, email)
    }

    pub fn verify(&self, token: &str, class: KeyClass) -> Result<Claims, TokenError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret(class).as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })
    }

    fn issue(&self, class: KeyClass, user_id: i64, email: &str) -> anyhow::Result<String> {
        let ttl = match class {
            KeyClass::Access => self.access_ttl,
            KeyClass::Refresh => self.refresh_ttl,
        };
        let expires = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow::anyhow!("token lifetime {} is out of range", ttl))?;
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            exp: expires.timestamp().max(0) as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret(class).as_bytes()),
        )?;

        Ok(token)
    }

    fn secret(&self, class: KeyClass) -> &str {
        match class {
            KeyClass::Access => &self.access_secret,
            KeyClass::Refresh => &self.refresh_secret,
        }
    }
}
