use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

const TOKEN_EXPIRY_MINUTES: i64 = 60;

/// Verifies the identity provider's access tokens. HMAC algorithms use the
/// shared secret and can also issue tokens, RSA algorithms verify against the
/// realm's public key only.
#[derive(Clone)]
pub struct JwtService {
    algorithm: Algorithm,
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.jwt_algorithm,
            config.jwt_secret.as_deref(),
            config.jwt_public_key_pem.as_deref(),
            &config.jwt_issuer,
            &config.jwt_audience,
        )
    }

    pub fn new(
        algorithm: Algorithm,
        secret: Option<&str>,
        public_key_pem: Option<&str>,
        issuer: &str,
        audience: &str,
    ) -> Result<Self> {
        let (encoding, decoding) = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = secret.context("JWT_SECRET must be set for HMAC algorithms")?;
                (
                    Some(EncodingKey::from_secret(secret.as_bytes())),
                    DecodingKey::from_secret(secret.as_bytes()),
                )
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => {
                let pem = public_key_pem
                    .context("JWT_PUBLIC_KEY_PATH must be set for RSA algorithms")?;
                let decoding = DecodingKey::from_rsa_pem(pem.as_bytes())
                    .context("JWT public key is not a valid RSA PEM")?;
                (None, decoding)
            }
            other => bail!("unsupported JWT algorithm {other:?}"),
        };

        Ok(Self {
            algorithm,
            encoding,
            decoding,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            expiry: Duration::minutes(TOKEN_EXPIRY_MINUTES),
        })
    }

    /// Issues a token shaped like the identity provider's access tokens.
    pub fn generate_token(&self, user_id: Uuid, username: &str, roles: &[&str]) -> Result<String> {
        let encoding = self
            .encoding
            .as_ref()
            .context("issuing tokens requires a shared secret")?;
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user_id,
            preferred_username: username.to_owned(),
            realm_access: RealmAccess {
                roles: roles.iter().map(|role| role.to_string()).collect(),
            },
            iss: self.issuer.clone(),
            aud: Audience::One(self.audience.clone()),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::new(self.algorithm), &claims, encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub preferred_username: String,
    #[serde(default)]
    pub realm_access: RealmAccess,
    pub iss: String,
    pub aud: Audience,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// The identity provider emits `aud` either as a string or as a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_PRIVATE_KEY: &str = include_str!("testdata/rsa_private.pem");
    const RSA_PUBLIC_KEY: &str = include_str!("testdata/rsa_public.pem");

    fn service(secret: &str, audience: &str) -> JwtService {
        JwtService::new(Algorithm::HS256, Some(secret), None, "userservice", audience).unwrap()
    }

    fn rsa_service() -> JwtService {
        JwtService::new(
            Algorithm::RS256,
            None,
            Some(RSA_PUBLIC_KEY),
            "userservice",
            "account",
        )
        .unwrap()
    }

    fn rsa_signed_token(user_id: Uuid) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            preferred_username: "asker".into(),
            realm_access: RealmAccess {
                roles: vec!["user".into()],
            },
            iss: "userservice".into(),
            aud: Audience::Many(vec!["account".into(), "realm-management".into()]),
            iat: now.timestamp() as usize,
            exp: (now + Duration::minutes(5)).timestamp() as usize,
        };
        let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_KEY.as_bytes()).unwrap();
        encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
    }

    #[test]
    fn issued_token_carries_realm_roles() {
        let jwt = service("secret", "account");
        let user_id = Uuid::new_v4();
        let token = jwt
            .generate_token(user_id, "consultant-1", &["consultant", "main-consultant"])
            .unwrap();

        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.preferred_username, "consultant-1");
        assert_eq!(
            claims.realm_access.roles,
            vec!["consultant".to_string(), "main-consultant".to_string()]
        );
    }

    #[test]
    fn rejects_token_for_other_audience() {
        let token = service("secret", "other")
            .generate_token(Uuid::new_v4(), "u", &["user"])
            .unwrap();
        assert!(service("secret", "account").verify_token(&token).is_err());
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = service("one", "account")
            .generate_token(Uuid::new_v4(), "u", &["user"])
            .unwrap();
        assert!(service("two", "account").verify_token(&token).is_err());
    }

    #[test]
    fn verifies_rsa_signed_access_token() {
        let user_id = Uuid::new_v4();
        let claims = rsa_service()
            .verify_token(&rsa_signed_token(user_id))
            .unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.realm_access.roles, vec!["user".to_string()]);
    }

    #[test]
    fn rsa_verifier_rejects_hmac_tokens_and_cannot_issue() {
        let hmac_token = service("secret", "account")
            .generate_token(Uuid::new_v4(), "u", &["user"])
            .unwrap();
        let jwt = rsa_service();
        assert!(jwt.verify_token(&hmac_token).is_err());
        assert!(jwt.generate_token(Uuid::new_v4(), "u", &["user"]).is_err());
    }

    #[test]
    fn key_material_must_match_algorithm() {
        assert!(JwtService::new(Algorithm::RS256, Some("secret"), None, "i", "a").is_err());
        assert!(JwtService::new(Algorithm::HS256, None, Some(RSA_PUBLIC_KEY), "i", "a").is_err());
        assert!(JwtService::new(Algorithm::RS256, None, Some("not a key"), "i", "a").is_err());
    }
}
