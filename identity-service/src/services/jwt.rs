use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Principal;

/// Signs and validates access tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (principal ID)
    pub sub: String,
    /// Tenant scope, absent for platform administrators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub role: String,
    pub email: String,
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn principal_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn tenant_uuid(&self) -> Option<Uuid> {
        self.tenant_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
    }
}

impl JwtService {
    /// RS256 with PEM keys loaded from `private_key_path`/`public_key_path`,
    /// falling back to HS256 with `secret`.
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if let (Some(private_path), Some(public_path)) =
            (&config.private_key_path, &config.public_key_path)
        {
            return Self::from_rsa_files(private_path, public_path, &config.issuer);
        }

        let secret = config
            .secret
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No JWT signing material configured"))?;
        tracing::info!("JWT service initialized with HS256 secret");
        Ok(Self::with_secret(secret.as_bytes(), &config.issuer))
    }

    pub fn with_secret(secret: &[u8], issuer: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            issuer: issuer.to_string(),
        }
    }

    fn from_rsa_files(
        private_key_path: &str,
        public_key_path: &str,
        issuer: &str,
    ) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                private_key_path,
                e
            )
        })?;

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

        let public_key_pem = fs::read_to_string(public_key_path).map_err(|e| {
            anyhow::anyhow!("Failed to read public key from {}: {}", public_key_path, e)
        })?;

        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        tracing::info!("JWT service initialized with RS256 keys");

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm: Algorithm::RS256,
            issuer: issuer.to_string(),
        })
    }

    /// Sign an access token for `principal` that expires at `expires_at`.
    pub fn generate_access_token(
        &self,
        principal: &Principal,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let claims = AccessTokenClaims {
            sub: principal.principal_id.to_string(),
            tenant_id: principal.tenant_id.map(|id| id.to_string()),
            role: principal.role_code.clone(),
            email: principal.email.clone(),
            iss: self.issuer.clone(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Validate signature, issuer and expiry.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    fn principal() -> Principal {
        Principal::new(
            Some(Uuid::new_v4()),
            "admin@example.com".to_string(),
            None,
            "hash".to_string(),
            Role::Admin,
        )
    }

    #[test]
    fn round_trips_principal_claims() {
        let jwt = JwtService::with_secret(b"unit-test-secret", "identity-service");
        let p = principal();
        let now = Utc::now();
        let token = jwt
            .generate_access_token(&p, now, now + Duration::hours(1))
            .unwrap();

        let claims = jwt.validate_access_token(&token).unwrap();
        assert_eq!(claims.principal_id(), Some(p.principal_id));
        assert_eq!(claims.tenant_uuid(), p.tenant_id);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.email, "admin@example.com");
        assert_eq!(claims.exp, (now + Duration::hours(1)).timestamp());
    }

    #[test]
    fn rejects_expired_token() {
        let jwt = JwtService::with_secret(b"unit-test-secret", "identity-service");
        let now = Utc::now();
        let token = jwt
            .generate_access_token(&principal(), now - Duration::hours(2), now - Duration::hours(1))
            .unwrap();

        assert!(jwt.validate_access_token(&token).is_err());
    }

    #[test]
    fn rejects_foreign_signature_and_issuer() {
        let ours = JwtService::with_secret(b"unit-test-secret", "identity-service");
        let theirs = JwtService::with_secret(b"another-secret", "identity-service");
        let other_issuer = JwtService::with_secret(b"unit-test-secret", "someone-else");
        let now = Utc::now();

        let forged = theirs
            .generate_access_token(&principal(), now, now + Duration::hours(1))
            .unwrap();
        assert!(ours.validate_access_token(&forged).is_err());

        let foreign = other_issuer
            .generate_access_token(&principal(), now, now + Duration::hours(1))
            .unwrap();
        assert!(ours.validate_access_token(&foreign).is_err());
    }
}
