//! Manage json web tokens.
//!
//! Tokens are stateless: a token is valid iff it was signed with the secret of
//! its kind and the clock is before its `exp` claim.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::clock::Clock;

/// Fixed symmetric signing algorithm.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Identity embedded in a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

/// Pieces of information asserted on a JWT.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User ID.
    sub: String,
    email: String,
    /// Identifies the time at which the JWT was issued.
    iat: u64,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    exp: u64,
}

/// Signing secret. Wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {
    /// Create a new [`Secret`].
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(secret.as_ref().to_vec()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// Kind of token. Each kind has its own secret and lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Error raised while issuing a token.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signing secret is empty")]
    EmptySecret,
    #[error("token lifetime must be at least one second")]
    InvalidLifetime,
    #[error("principal must carry an id")]
    InvalidPrincipal,
    #[error("cannot encode token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// Error raised while verifying a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Signature is valid but the token is past its expiry.
    #[error("token expired")]
    Expired,
    /// Any other failure: bad signature, malformed token, wrong algorithm.
    #[error("invalid token")]
    InvalidSignature,
}

/// Sign and verify tokens against a caller-supplied secret.
#[derive(Clone)]
pub struct TokenProvider {
    clock: Arc<dyn Clock>,
}

impl TokenProvider {
    /// Create a new [`TokenProvider`].
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Sign a token for `principal` expiring `lifetime` from now.
    pub fn issue(
        &self,
        principal: &Principal,
        secret: &Secret,
        lifetime: Duration,
    ) -> Result<String, SigningError> {
        if secret.is_empty() {
            return Err(SigningError::EmptySecret);
        }
        if principal.id.is_empty() {
            return Err(SigningError::InvalidPrincipal);
        }
        if lifetime.as_secs() == 0 {
            return Err(SigningError::InvalidLifetime);
        }

        let iat = self.clock.now();
        let exp = iat
            .checked_add(lifetime.as_secs())
            .ok_or(SigningError::InvalidLifetime)?;
        let claims = Claims {
            sub: principal.id.clone(),
            email: principal.email.clone(),
            iat,
            exp,
        };

        Ok(encode(
            &Header::new(ALGORITHM),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?)
    }

    /// Decode and check a token.
    ///
    /// The signature is checked first: a token signed with another secret is
    /// [`VerifyError::InvalidSignature`] even when it is also expired.
    pub fn verify(&self, token: &str, secret: &Secret) -> Result<Principal, VerifyError> {
        if token.is_empty() || secret.is_empty() {
            return Err(VerifyError::InvalidSignature);
        }

        // Expiry is compared against our own clock below.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_owned()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|_| VerifyError::InvalidSignature)?
        .claims;

        if self.clock.now() >= claims.exp {
            return Err(VerifyError::Expired);
        }

        Ok(Principal {
            id: claims.sub,
            email: claims.email,
        })
    }
}

/// Secret and lifetime for one [`TokenKind`].
#[derive(Clone, Debug)]
pub struct TokenPolicy {
    pub secret: Secret,
    pub lifetime: Duration,
}

/// Freshly issued access and refresh tokens.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issue and check access and refresh tokens with their own policies.
#[derive(Clone)]
pub struct TokenManager {
    provider: TokenProvider,
    access: TokenPolicy,
    refresh: TokenPolicy,
}

impl TokenManager {
    /// Create a new [`TokenManager`].
    pub fn new(provider: TokenProvider, access: TokenPolicy, refresh: TokenPolicy) -> Self {
        Self {
            provider,
            access,
            refresh,
        }
    }

    fn policy(&self, kind: TokenKind) -> &TokenPolicy {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime of tokens of this kind.
    pub fn lifetime(&self, kind: TokenKind) -> Duration {
        self.policy(kind).lifetime
    }

    /// Create a new token of `kind`.
    pub fn create(&self, kind: TokenKind, principal: &Principal) -> Result<String, SigningError> {
        let policy = self.policy(kind);
        let token = self
            .provider
            .issue(principal, &policy.secret, policy.lifetime)?;

        metrics::counter!("tokens_issued_total", "kind" => kind.as_str()).increment(1);
        Ok(token)
    }

    /// Create both an access and a refresh token.
    pub fn create_pair(&self, principal: &Principal) -> Result<TokenPair, SigningError> {
        Ok(TokenPair {
            access_token: self.create(TokenKind::Access, principal)?,
            refresh_token: self.create(TokenKind::Refresh, principal)?,
        })
    }

    /// Decode and check a token of `kind`.
    pub fn decode(&self, kind: TokenKind, token: &str) -> Result<Principal, VerifyError> {
        self.provider.verify(token, &self.policy(kind).secret)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::FixedClock;

    pub const NOW: u64 = 1_700_000_000;
    const HOUR: Duration = Duration::from_secs(3600);

    pub fn principal() -> Principal {
        Principal {
            id: "65f1c0a2b3d4e5f6a7b8c9d0".into(),
            email: "ada@example.com".into(),
        }
    }

    fn provider() -> (Arc<FixedClock>, TokenProvider) {
        let clock = Arc::new(FixedClock::new(NOW));
        (clock.clone(), TokenProvider::new(clock))
    }

    /// Replace one character in the middle of the signature.
    pub fn tamper(token: &str) -> String {
        let mut chars: Vec<char> = token.chars().collect();
        let idx = chars.len() - 10;
        chars[idx] = if chars[idx] == 'A' { 'B' } else { 'A' };
        chars.into_iter().collect()
    }

    #[test]
    fn test_round_trip() {
        let (clock, provider) = provider();
        let secret = Secret::new("access-secret");

        let token = provider.issue(&principal(), &secret, HOUR).unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(provider.verify(&token, &secret), Ok(principal()));

        clock.advance(HOUR.as_secs() - 1);
        assert_eq!(provider.verify(&token, &secret), Ok(principal()));
    }

    #[test]
    fn test_expired_at_lifetime_boundary() {
        let (clock, provider) = provider();
        let secret = Secret::new("access-secret");
        let token = provider.issue(&principal(), &secret, HOUR).unwrap();

        clock.advance(HOUR.as_secs());
        assert_eq!(provider.verify(&token, &secret), Err(VerifyError::Expired));

        clock.advance(HOUR.as_secs() * 24);
        assert_eq!(provider.verify(&token, &secret), Err(VerifyError::Expired));
    }

    #[test]
    fn test_wrong_secret_is_never_expired() {
        let (clock, provider) = provider();
        let token = provider
            .issue(&principal(), &Secret::new("access-secret"), HOUR)
            .unwrap();
        let other = Secret::new("refresh-secret");

        assert_eq!(
            provider.verify(&token, &other),
            Err(VerifyError::InvalidSignature)
        );

        clock.advance(HOUR.as_secs() * 2);
        assert_eq!(
            provider.verify(&token, &other),
            Err(VerifyError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_and_malformed() {
        let (_, provider) = provider();
        let secret = Secret::new("access-secret");
        let token = provider.issue(&principal(), &secret, HOUR).unwrap();

        assert_eq!(
            provider.verify(&tamper(&token), &secret),
            Err(VerifyError::InvalidSignature)
        );
        assert_eq!(
            provider.verify("not.a.token", &secret),
            Err(VerifyError::InvalidSignature)
        );
        assert_eq!(
            provider.verify("", &secret),
            Err(VerifyError::InvalidSignature)
        );
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let (_, provider) = provider();
        let claims = Claims {
            sub: "user".into(),
            email: "user@example.com".into(),
            iat: NOW,
            exp: NOW + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();

        assert_eq!(
            provider.verify(&token, &Secret::new("access-secret")),
            Err(VerifyError::InvalidSignature)
        );
    }

    #[test]
    fn test_issue_misconfiguration() {
        let (_, provider) = provider();

        assert!(matches!(
            provider.issue(&principal(), &Secret::new(""), HOUR),
            Err(SigningError::EmptySecret)
        ));
        assert!(matches!(
            provider.issue(&principal(), &Secret::new("s"), Duration::ZERO),
            Err(SigningError::InvalidLifetime)
        ));
        assert!(matches!(
            provider.issue(
                &Principal {
                    id: String::new(),
                    email: "a@b.c".into()
                },
                &Secret::new("s"),
                HOUR
            ),
            Err(SigningError::InvalidPrincipal)
        ));
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
    }

    #[test]
    fn test_manager_kinds_are_not_interchangeable() {
        let (clock, provider) = provider();
        let manager = TokenManager::new(
            provider,
            TokenPolicy {
                secret: Secret::new("access-secret"),
                lifetime: HOUR,
            },
            TokenPolicy {
                secret: Secret::new("refresh-secret"),
                lifetime: HOUR * 24 * 14,
            },
        );

        let pair = manager.create_pair(&principal()).unwrap();
        assert_eq!(manager.decode(TokenKind::Access, &pair.access_token), Ok(principal()));
        assert_eq!(manager.decode(TokenKind::Refresh, &pair.refresh_token), Ok(principal()));
        assert_eq!(
            manager.decode(TokenKind::Refresh, &pair.access_token),
            Err(VerifyError::InvalidSignature)
        );

        clock.advance(HOUR.as_secs());
        assert_eq!(
            manager.decode(TokenKind::Access, &pair.access_token),
            Err(VerifyError::Expired)
        );
        assert_eq!(manager.decode(TokenKind::Refresh, &pair.refresh_token), Ok(principal()));
    }
}
