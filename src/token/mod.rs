//! Credential/Token Service
//!
//! Issues, validates, and rotates the access/refresh token pair.
//! Access tokens are stateless HS256 JWTs trusted until expiry; refresh
//! tokens are high-entropy single-use values persisted by hash and
//! revoked the moment they are consumed.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{AccessClaims, Account, ClientContext, DomainError, RefreshToken, TokenPair};
use crate::store::{NewRefreshToken, Store, StoreError};

/// Entropy of a refresh token value, in bytes (hex-encoded on the wire).
const REFRESH_TOKEN_BYTES: usize = 64;

/// Signing and lifetime settings, read from [`crate::Config`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),

    #[error("Token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

#[derive(Clone)]
pub struct TokenService<S> {
    store: S,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl<S: Store> TokenService<S> {
    pub fn new(store: S, config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Exact expiry; the access window is short by design.
        validation.leeway = 0;

        Self {
            store,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            access_ttl: Duration::minutes(config.access_token_minutes),
            refresh_ttl: Duration::days(config.refresh_token_days),
        }
    }

    /// Issue a fresh access/refresh pair for an authenticated account.
    /// The caller (the external identity layer) has already verified the
    /// credentials; we only need the account to exist.
    pub async fn issue_initial_tokens(
        &self,
        account_id: Uuid,
        ctx: &ClientContext,
    ) -> Result<TokenPair, TokenError> {
        let account = self
            .store
            .account_by_id(account_id)
            .await
            .map_err(TokenError::Store)?
            .ok_or(DomainError::AccountNotFound(account_id))?;

        let now = Utc::now();
        let value = generate_token_value();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: hash_token_value(&value),
            owner_account_id: account.id,
            issued_at: now,
            expires_at: now + self.refresh_ttl,
            created_by_context: ctx.addr_or_unknown(),
            revoked_at: None,
            revoked_by_context: None,
            replaced_by_token_id: None,
        };
        let refresh_expires_at = token.expires_at;
        self.store
            .insert_refresh_token(token)
            .await
            .map_err(TokenError::Store)?;

        let access_token = self.sign_access_token(&account, now)?;

        tracing::info!(account_id = %account.id, "Session tokens issued");

        Ok(TokenPair {
            access_token,
            refresh_token: value,
            refresh_expires_at,
        })
    }

    /// Exchange a refresh token for a new pair, revoking the presented
    /// token in the same commit that creates its replacement.
    ///
    /// Missing, expired, and already-revoked tokens are all rejected
    /// with the same [`DomainError::InvalidToken`], and the winner of a
    /// concurrent replay is decided atomically by the store.
    pub async fn refresh(
        &self,
        refresh_token_value: &str,
        ctx: &ClientContext,
    ) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let value = generate_token_value();
        let replacement = NewRefreshToken {
            id: Uuid::new_v4(),
            token_hash: hash_token_value(&value),
            issued_at: now,
            expires_at: now + self.refresh_ttl,
            created_by_context: ctx.addr_or_unknown(),
        };

        let new_token = self
            .store
            .rotate_refresh_token(
                &hash_token_value(refresh_token_value),
                now,
                &ctx.addr_or_unknown(),
                replacement,
            )
            .await
            .map_err(|e| match e {
                StoreError::TokenNotActive => TokenError::Domain(DomainError::InvalidToken),
                other => TokenError::Store(other),
            })?;

        let account = self
            .store
            .account_by_id(new_token.owner_account_id)
            .await
            .map_err(TokenError::Store)?
            .ok_or_else(|| {
                TokenError::Store(StoreError::Inconsistent(format!(
                    "refresh token {} owned by missing account {}",
                    new_token.id, new_token.owner_account_id
                )))
            })?;

        let access_token = self.sign_access_token(&account, now)?;

        tracing::info!(account_id = %account.id, "Refresh token rotated");

        Ok(TokenPair {
            access_token,
            refresh_token: value,
            refresh_expires_at: new_token.expires_at,
        })
    }

    /// Revoke every active refresh token owned by the account. Calling
    /// with no active tokens succeeds trivially.
    pub async fn logout(&self, account_id: Uuid, ctx: &ClientContext) -> Result<u64, TokenError> {
        let revoked = self
            .store
            .revoke_tokens_for_account(account_id, Utc::now(), &ctx.addr_or_unknown())
            .await
            .map_err(TokenError::Store)?;

        tracing::info!(%account_id, revoked, "Logout revoked active refresh tokens");
        Ok(revoked)
    }

    /// Verify signature and expiry of an access token. Stateless: no
    /// store lookup, so a revoked session stays access-valid until the
    /// token's own short expiry elapses. That bounded window is a
    /// documented trade-off, not an oversight.
    pub fn validate_access(&self, access_token: &str) -> Result<AccessClaims, TokenError> {
        jsonwebtoken::decode::<AccessClaims>(access_token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    TokenError::Domain(DomainError::AccessTokenExpired)
                }
                _ => TokenError::Domain(DomainError::InvalidAccessToken),
            })
    }

    fn sign_access_token(
        &self,
        account: &Account,
        now: chrono::DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = AccessClaims {
            sub: account.id,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4(),
            name: account.display_name.clone(),
            email: account.email.clone(),
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }
}

/// High-entropy refresh token value, hex-encoded.
fn generate_token_value() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// sha-256 of the token value; only this is persisted.
fn hash_token_value(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "unit-test-secret".to_string(),
            access_token_minutes: 15,
            refresh_token_days: 7,
        }
    }

    async fn service_with_account() -> (TokenService<MemoryStore>, Uuid) {
        let store = MemoryStore::new();
        let account_id = Uuid::new_v4();
        store
            .insert_account(Account::open(account_id, "carol@example.com", "Carol"))
            .await
            .unwrap();
        (TokenService::new(store, &config()), account_id)
    }

    #[test]
    fn test_token_values_are_unique_and_long() {
        let a = generate_token_value();
        let b = generate_token_value();
        assert_ne!(a, b);
        assert_eq!(a.len(), REFRESH_TOKEN_BYTES * 2);
    }

    #[tokio::test]
    async fn test_issue_and_validate_roundtrip() {
        let (service, account_id) = service_with_account().await;
        let pair = service
            .issue_initial_tokens(account_id, &ClientContext::new())
            .await
            .unwrap();

        let claims = service.validate_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, account_id);
        assert_eq!(claims.email, "carol@example.com");
        assert_eq!(claims.name, "Carol");
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn test_issue_for_unknown_account() {
        let service = TokenService::new(MemoryStore::new(), &config());
        let err = service
            .issue_initial_tokens(Uuid::new_v4(), &ClientContext::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TokenError::Domain(DomainError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_access_token_rejected() {
        let (service, account_id) = service_with_account().await;
        // Same secret, but minting tokens that are already past expiry.
        let expired_minter = TokenService::new(
            MemoryStore::new(),
            &AuthConfig {
                access_token_minutes: -5,
                ..config()
            },
        );
        let account = Account::open(account_id, "dave@example.com", "Dave");
        let token = expired_minter
            .sign_access_token(&account, Utc::now())
            .unwrap();

        let err = service.validate_access(&token).unwrap_err();
        assert!(matches!(
            err,
            TokenError::Domain(DomainError::AccessTokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_tampered_access_token_rejected() {
        let (service, account_id) = service_with_account().await;
        let pair = service
            .issue_initial_tokens(account_id, &ClientContext::new())
            .await
            .unwrap();

        let other = TokenService::new(
            MemoryStore::new(),
            &AuthConfig {
                jwt_secret: "a-different-secret".to_string(),
                ..config()
            },
        );
        let err = other.validate_access(&pair.access_token).unwrap_err();
        assert!(matches!(
            err,
            TokenError::Domain(DomainError::InvalidAccessToken)
        ));
    }
}
