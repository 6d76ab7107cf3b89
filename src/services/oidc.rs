// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OpenID Connect authorization-code login.
//!
//! Provider metadata comes from `<issuer>/.well-known/openid-configuration`;
//! ID tokens are verified against the provider's JWKS. Both documents are
//! cached, honoring `Cache-Control: max-age`.

use crate::config::OidcSettings;
use crate::services::identity::{Identity, IdentityError, IdentityProvider};
use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;
const SCOPES: &str = "openid email profile";

#[derive(Clone)]
enum KeySource {
    /// Keys from the provider's published JWKS.
    Jwks,
    /// A single fixed key; for tests that mint their own ID tokens.
    StaticKey {
        kid: String,
        algorithm: Algorithm,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct ProviderMetadata {
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
}

#[derive(Clone)]
struct MetadataCacheEntry {
    metadata: ProviderMetadata,
    expires_at: Instant,
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// OIDC identity provider (authorization-code flow, confidential client).
pub struct OidcIdentityProvider {
    http_client: reqwest::Client,
    issuer_url: String,
    client_id: String,
    client_secret: String,
    key_source: KeySource,
    metadata_cache: RwLock<Option<MetadataCacheEntry>>,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl OidcIdentityProvider {
    pub fn new(settings: &OidcSettings) -> anyhow::Result<Self> {
        Self::build(settings, KeySource::Jwks)
    }

    /// Provider that verifies ID tokens with one fixed key instead of the JWKS.
    pub fn new_with_static_key(
        settings: &OidcSettings,
        kid: impl Into<String>,
        algorithm: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static OIDC kid must not be empty");
        }
        Self::build(
            settings,
            KeySource::StaticKey {
                kid,
                algorithm,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn build(settings: &OidcSettings, key_source: KeySource) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        let issuer_url = settings.issuer_url.trim_end_matches('/').to_string();

        tracing::info!(
            issuer = %issuer_url,
            client_id = %settings.client_id,
            "Initialized OIDC identity provider"
        );

        Ok(Self {
            http_client,
            issuer_url,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            key_source,
            metadata_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify an ID token and extract the identity it asserts.
    fn verify_id_token(
        &self,
        id_token: &str,
        decoding_key: &DecodingKey,
        algorithm: Algorithm,
    ) -> Result<Identity, IdentityError> {
        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        let with_slash = format!("{}/", self.issuer_url);
        validation.set_issuer(&[self.issuer_url.as_str(), with_slash.as_str()]);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<IdTokenClaims>(id_token, decoding_key, &validation)
            .map_err(|e| IdentityError::Rejected(format!("ID token validation failed: {e}")))?
            .claims;

        validate_iat(claims.iat)?;

        if claims.sub.trim().is_empty() {
            return Err(IdentityError::Rejected("empty sub claim".to_string()));
        }

        tracing::debug!(subject = %claims.sub, "ID token verified");

        Ok(Identity {
            sub: claims.sub,
            email: claims.email,
            first_name: claims.first_name.or(claims.given_name),
            last_name: claims.last_name.or(claims.family_name),
            profile_image_url: claims.profile_image_url.or(claims.picture),
        })
    }

    /// Key and algorithm for the `kid` named in an ID token header.
    async fn key_for_token(
        &self,
        id_token: &str,
    ) -> Result<(Arc<DecodingKey>, Algorithm), IdentityError> {
        let header = decode_header(id_token)
            .map_err(|e| IdentityError::Rejected(format!("invalid JWT header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Rejected("missing JWT kid".to_string()))?;

        if let KeySource::StaticKey {
            kid: static_kid,
            algorithm,
            decoding_key,
        } = &self.key_source
        {
            if header.alg != *algorithm {
                return Err(IdentityError::Rejected(format!(
                    "unexpected JWT alg: {:?}",
                    header.alg
                )));
            }
            if kid != *static_kid {
                return Err(IdentityError::Rejected(format!(
                    "unknown JWT kid for static key: {kid}"
                )));
            }
            return Ok((decoding_key.clone(), *algorithm));
        }

        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::Rejected(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        if let Some(key) = self.lookup_cached_key(&kid).await {
            return Ok((key, Algorithm::RS256));
        }

        // The provider may have rotated keys since we last looked.
        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(&kid).await {
                return Ok((key, Algorithm::RS256));
            }
        }

        Err(IdentityError::Rejected(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), IdentityError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        let jwks_uri = self.metadata().await?.jwks_uri;
        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing JWKS cache");

        let response = self
            .http_client
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IdentityError::Unavailable(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_rsa_keys(jwks);
        if keys_by_kid.is_empty() {
            return Err(IdentityError::Unavailable(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "JWKS cache refreshed");
        Ok(())
    }

    /// Provider metadata, from cache when fresh.
    async fn metadata(&self) -> Result<ProviderMetadata, IdentityError> {
        {
            let cache = self.metadata_cache.read().await;
            if let Some(entry) = cache
                .as_ref()
                .filter(|entry| entry.expires_at > Instant::now())
            {
                return Ok(entry.metadata.clone());
            }
        }

        let discovery_url = format!("{}/.well-known/openid-configuration", self.issuer_url);
        let response = self
            .http_client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("OIDC discovery failed: {e}")))?;

        if !response.status().is_success() {
            // Serve stale metadata rather than failing every login.
            if let Some(entry) = self.metadata_cache.read().await.as_ref() {
                tracing::warn!(
                    status = %response.status(),
                    "OIDC discovery returned non-success status; using cached metadata"
                );
                return Ok(entry.metadata.clone());
            }
            return Err(IdentityError::Unavailable(format!(
                "OIDC discovery returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("invalid discovery JSON: {e}")))?;

        *self.metadata_cache.write().await = Some(MetadataCacheEntry {
            metadata: metadata.clone(),
            expires_at: Instant::now() + ttl,
        });

        Ok(metadata)
    }
}

#[async_trait]
impl IdentityProvider for OidcIdentityProvider {
    async fn login_redirect(
        &self,
        state: &str,
        callback_url: &str,
    ) -> Result<String, IdentityError> {
        let metadata = self.metadata().await?;
        Ok(authorization_url(
            &metadata.authorization_endpoint,
            &self.client_id,
            callback_url,
            state,
        ))
    }

    async fn complete_login(
        &self,
        code: &str,
        callback_url: &str,
    ) -> Result<Identity, IdentityError> {
        let metadata = self.metadata().await?;

        let response = self
            .http_client
            .post(&metadata.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", callback_url),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("token request failed: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Token exchange refused");
            return Err(IdentityError::Rejected(format!(
                "token endpoint returned status {status}"
            )));
        }
        if !status.is_success() {
            return Err(IdentityError::Unavailable(format!(
                "token endpoint returned status {status}"
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("invalid token response: {e}")))?;

        let (key, algorithm) = self.key_for_token(&tokens.id_token).await?;
        self.verify_id_token(&tokens.id_token, key.as_ref(), algorithm)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: String,
    kty: String,
    alg: Option<String>,
    #[serde(default)]
    n: String,
    #[serde(default)]
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    iat: Option<usize>,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    picture: Option<String>,
    profile_image_url: Option<String>,
}

fn authorization_url(endpoint: &str, client_id: &str, callback_url: &str, state: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!(
        "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
        endpoint,
        separator,
        urlencoding::encode(client_id),
        urlencoding::encode(callback_url),
        urlencoding::encode(SCOPES),
        urlencoding::encode(state)
    )
}

/// RS256 signing keys from a JWKS, indexed by `kid`.
fn usable_rsa_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

fn validate_iat(iat: Option<usize>) -> Result<(), IdentityError> {
    let Some(iat) = iat else {
        return Err(IdentityError::Rejected("missing iat claim".to_string()));
    };

    if iat as u64 > now_unix_secs() + CLOCK_SKEW_SECS {
        return Err(IdentityError::Rejected(
            "iat claim is in the future".to_string(),
        ));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|raw| raw.trim_matches('"').parse::<u64>().ok())
    })
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &[u8] = b"oidc_test_signing_secret";
    const KID: &str = "test-kid";

    #[derive(Serialize)]
    struct TestClaims<'a> {
        iss: &'a str,
        aud: &'a str,
        sub: &'a str,
        exp: u64,
        iat: u64,
        email: &'a str,
        given_name: &'a str,
        family_name: &'a str,
        picture: &'a str,
    }

    fn settings() -> OidcSettings {
        OidcSettings {
            issuer_url: "https://id.example.com".to_string(),
            client_id: "pulse-connect".to_string(),
            client_secret: "shh".to_string(),
        }
    }

    fn provider() -> OidcIdentityProvider {
        OidcIdentityProvider::new_with_static_key(
            &settings(),
            KID,
            Algorithm::HS256,
            DecodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn mint(iss: &str, aud: &str, iat_offset: i64, kid: &str) -> String {
        let now = now_unix_secs();
        let claims = TestClaims {
            iss,
            aud,
            sub: "subject-1",
            exp: now + 600,
            iat: (now as i64 + iat_offset) as u64,
            email: "asha@example.com",
            given_name: "Asha",
            family_name: "Rao",
            picture: "https://img.example.com/a.png",
        };
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    async fn verify(token: &str) -> Result<Identity, IdentityError> {
        let provider = provider();
        let (key, alg) = provider.key_for_token(token).await?;
        provider.verify_id_token(token, key.as_ref(), alg)
    }

    #[tokio::test]
    async fn test_valid_id_token() {
        let token = mint("https://id.example.com", "pulse-connect", 0, KID);
        let identity = verify(&token).await.unwrap();
        assert_eq!(identity.sub, "subject-1");
        assert_eq!(identity.email.as_deref(), Some("asha@example.com"));
        assert_eq!(identity.first_name.as_deref(), Some("Asha"));
        assert_eq!(identity.last_name.as_deref(), Some("Rao"));
        assert_eq!(
            identity.profile_image_url.as_deref(),
            Some("https://img.example.com/a.png")
        );
    }

    #[tokio::test]
    async fn test_id_token_rejections() {
        let wrong_aud = mint("https://id.example.com", "someone-else", 0, KID);
        assert!(matches!(
            verify(&wrong_aud).await,
            Err(IdentityError::Rejected(_))
        ));

        let wrong_iss = mint("https://evil.example.com", "pulse-connect", 0, KID);
        assert!(matches!(
            verify(&wrong_iss).await,
            Err(IdentityError::Rejected(_))
        ));

        let future_iat = mint("https://id.example.com", "pulse-connect", 3600, KID);
        assert!(matches!(
            verify(&future_iat).await,
            Err(IdentityError::Rejected(_))
        ));

        let wrong_kid = mint("https://id.example.com", "pulse-connect", 0, "other");
        assert!(matches!(
            verify(&wrong_kid).await,
            Err(IdentityError::Rejected(_))
        ));
    }

    #[test]
    fn test_authorization_url() {
        let url = authorization_url(
            "https://id.example.com/authorize",
            "pulse-connect",
            "http://localhost:8080/api/callback",
            "c3RhdGU",
        );
        assert_eq!(
            url,
            "https://id.example.com/authorize?response_type=code&client_id=pulse-connect\
             &redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fcallback\
             &scope=openid%20email%20profile&state=c3RhdGU"
        );
    }

    #[test]
    fn parse_cache_control_max_age_valid() {
        assert_eq!(
            parse_cache_control_max_age("public, max-age=3600"),
            Some(3600)
        );
        assert_eq!(parse_cache_control_max_age("max-age=60"), Some(60));
        assert_eq!(parse_cache_control_max_age("max-age=\"120\""), Some(120));
    }

    #[test]
    fn parse_cache_control_max_age_invalid() {
        assert_eq!(parse_cache_control_max_age("public, immutable"), None);
        assert_eq!(parse_cache_control_max_age("max-age=abc"), None);
        assert_eq!(parse_cache_control_max_age(""), None);
    }
}
