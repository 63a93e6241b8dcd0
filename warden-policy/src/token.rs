//! Bearer token validation for token-scope checks.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};
use warden_core::{Clock, ConfigError, PolicyError, SystemClock};

// ============================================================================
// SECRET
// ============================================================================

/// Signing secret that never appears in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// # Errors
    /// Returns [`ConfigError::MissingRequired`] if the secret is empty.
    pub fn new(secret: impl Into<String>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Read `WARDEN_JWT_SECRET`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(std::env::var("WARDEN_JWT_SECRET").unwrap_or_default())
    }

    fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CLAIMS
// ============================================================================

/// Claims carried by a resource-scoped bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    /// Model name of the resource the token was issued for.
    pub resource_type: String,
    /// Reference identifier (urn or id) of that resource.
    pub resource_id: String,
    #[serde(default)]
    pub scope: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn new(
        sub: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        issued_at: i64,
        ttl_secs: i64,
    ) -> Self {
        Self {
            sub: sub.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            scope: Vec::new(),
            iat: issued_at,
            exp: issued_at.saturating_add(ttl_secs),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope.push(scope.into());
        self
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// Verifies a bearer token and returns its claims.
pub trait TokenService: Send + Sync {
    fn validate(&self, token: &str) -> Result<TokenClaims, PolicyError>;
}

/// HMAC-signed JWT implementation of [`TokenService`].
///
/// Signature and required claims are checked by `jsonwebtoken`; expiry is
/// checked against the injected clock so tests can control time.
pub struct JwtTokenService {
    secret: JwtSecret,
    algorithm: Algorithm,
    leeway_secs: i64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for JwtTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenService")
            .field("secret", &self.secret)
            .field("algorithm", &self.algorithm)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl JwtTokenService {
    pub fn new(secret: JwtSecret) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: JwtSecret, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret,
            algorithm: Algorithm::HS256,
            leeway_secs: 60,
            clock,
        }
    }

    pub fn with_leeway(mut self, leeway_secs: i64) -> Self {
        self.leeway_secs = leeway_secs.max(0);
        self
    }

    /// Sign `claims` into a compact token.
    pub fn issue(&self, claims: &TokenClaims) -> Result<String, PolicyError> {
        let key = EncodingKey::from_secret(self.secret.expose().as_bytes());
        encode(&Header::new(self.algorithm), claims, &key).map_err(|e| {
            PolicyError::TokenRejected {
                reason: format!("Failed to sign token: {}", e),
            }
        })
    }

    fn rejected(reason: impl Into<String>) -> PolicyError {
        PolicyError::TokenRejected {
            reason: reason.into(),
        }
    }
}

impl TokenService for JwtTokenService {
    fn validate(&self, token: &str) -> Result<TokenClaims, PolicyError> {
        let key = DecodingKey::from_secret(self.secret.expose().as_bytes());

        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let claims = decode::<TokenClaims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    Self::rejected("Token signature is invalid")
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    Self::rejected("Token is invalid")
                }
                _ => Self::rejected(format!("Token validation failed: {}", e)),
            })?
            .claims;

        let now = self.clock.now_epoch_secs();
        if now < 0 {
            error!(timestamp = now, "Clock returned pre-epoch time");
            return Err(Self::rejected("Clock error"));
        }
        if claims.exp < now - self.leeway_secs {
            debug!(sub = %claims.sub, exp = claims.exp, now, "Token expired");
            return Err(Self::rejected("Token expired"));
        }

        Ok(claims)
    }
}

// ============================================================================
// TESTS
// ============================================================================
