//! Authentication and authorization.
//!
//! The [`AuthManager`] is the sole authority on whether a request may
//! proceed and against which service. It owns the in-memory API key store,
//! the localhost-bypass policy, and the JWT helpers. Keys live only for the
//! lifetime of the process; a restart loses everything except the default
//! key minted at construction.

use std::collections::HashMap;
use std::net::IpAddr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// Prefix marker carried by every generated API key token.
pub const KEY_PREFIX: &str = "wmcp_";

/// Token of the transient key synthesized for localhost-bypassed requests.
/// Never present in the store.
pub const LOCALHOST_TOKEN: &str = "wmcp_localhost-bypass";

/// An API key credential.
///
/// Usable iff `is_active` and not past `expires_at`. Keys are never removed
/// from the store; revocation only flips the active flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Opaque token string.
    pub key: String,
    /// Owner name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Optional expiry timestamp.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the key is active.
    pub is_active: bool,
    /// Service name -> allowed. A `"*"` entry grants every service.
    pub permissions: HashMap<String, bool>,
}

impl ApiKey {
    /// Whether this key grants access to `service`.
    ///
    /// An explicit entry wins; otherwise the `"*"` wildcard is consulted;
    /// absent both, access is denied.
    pub fn allows(&self, service: &str) -> bool {
        match self.permissions.get(service) {
            Some(allowed) => *allowed,
            None => self.permissions.get("*").copied().unwrap_or(false),
        }
    }
}

/// Manages API keys, the localhost-bypass policy, and JWT tokens.
///
/// Constructed once at startup and injected into the router; there are no
/// process-wide singletons.
pub struct AuthManager {
    config: AuthConfig,
    keys: RwLock<HashMap<String, ApiKey>>,
}

impl AuthManager {
    /// Create a new manager and mint the `default` key (365-day expiry).
    pub fn new(config: AuthConfig) -> Self {
        let mut keys = HashMap::new();
        let default_key = mint_key("default", Some(365), None);
        keys.insert(default_key.key.clone(), default_key);

        Self {
            config,
            keys: RwLock::new(keys),
        }
    }

    /// Create a new API key and return its token.
    ///
    /// `permissions` defaults to `{"browseruse": true}`. Non-positive
    /// `expires_days` leaves the key non-expiring.
    pub async fn create_api_key(
        &self,
        name: &str,
        expires_days: Option<i64>,
        permissions: Option<HashMap<String, bool>>,
    ) -> String {
        let key = mint_key(name, expires_days, permissions);
        let token = key.key.clone();
        self.keys.write().await.insert(token.clone(), key);
        token
    }

    /// Validate an API key token.
    ///
    /// Fails with [`Error::Unauthorized`] when the token is unknown,
    /// inactive, or expired.
    pub async fn validate_api_key(&self, token: &str) -> Result<ApiKey> {
        let keys = self.keys.read().await;
        let key = keys
            .get(token)
            .ok_or_else(|| Error::unauthorized("Invalid API key"))?;

        if !key.is_active {
            return Err(Error::unauthorized("API key is inactive"));
        }
        if let Some(expires_at) = key.expires_at {
            if Utc::now() > expires_at {
                return Err(Error::unauthorized("API key has expired"));
            }
        }

        Ok(key.clone())
    }

    /// Resolve an inbound credential to a usable key.
    ///
    /// With no bearer token, a loopback/private transport-level peer address
    /// gets a synthetic full-access key when the bypass is enabled; any
    /// other peer is rejected. The peer address must come from the socket,
    /// never from a client-supplied header.
    pub async fn authorize(&self, bearer: Option<&str>, peer: IpAddr) -> Result<ApiKey> {
        match bearer {
            Some(token) => self.validate_api_key(token).await,
            None if self.config.localhost_bypass && is_local_peer(peer) => {
                tracing::debug!(peer = %peer, "localhost bypass granted");
                Ok(localhost_key())
            }
            None => Err(Error::unauthorized("Authorization header required")),
        }
    }

    /// Check whether the key behind `token` may use `service`.
    ///
    /// Propagates validation failures; an absent permission entry is `false`.
    pub async fn check_permission(&self, token: &str, service: &str) -> Result<bool> {
        let key = self.validate_api_key(token).await?;
        Ok(key.allows(service))
    }

    /// Revoke an API key.
    ///
    /// Returns whether the token exists in the store; revoking an already
    /// revoked key returns `true` again since the entry is kept.
    pub async fn revoke_api_key(&self, token: &str) -> bool {
        match self.keys.write().await.get_mut(token) {
            Some(key) => {
                key.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Snapshot of all stored keys, indexed by token.
    ///
    /// Token redaction for external exposure is the router's job.
    pub async fn list_api_keys(&self) -> HashMap<String, ApiKey> {
        self.keys.read().await.clone()
    }

    /// Create a signed JWT carrying `data` plus an `exp` claim.
    pub fn create_access_token(
        &self,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let mut claims = data;
        let expire = Utc::now() + Duration::minutes(self.config.access_token_expire_minutes);
        claims.insert("exp".into(), serde_json::json!(expire.timestamp()));

        let token = jsonwebtoken::encode(
            &Header::new(self.algorithm()?),
            &claims,
            &EncodingKey::from_secret(self.config.secret_key.as_bytes()),
        )?;
        Ok(token)
    }

    /// Verify a JWT and return its payload.
    ///
    /// Fails with [`Error::Unauthorized`] on signature mismatch, malformed
    /// input, or expiry.
    pub fn verify_token(&self, token: &str) -> Result<serde_json::Value> {
        let validation = Validation::new(self.algorithm()?);
        let data = jsonwebtoken::decode::<serde_json::Value>(
            token,
            &DecodingKey::from_secret(self.config.secret_key.as_bytes()),
            &validation,
        )
        .map_err(|_| Error::unauthorized("Could not validate credentials"))?;
        Ok(data.claims)
    }

    fn algorithm(&self) -> Result<Algorithm> {
        match self.config.algorithm.as_str() {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            other => Err(Error::Config(format!("unsupported JWT algorithm: {other}"))),
        }
    }

    #[cfg(test)]
    async fn backdate(&self, token: &str, days: i64) {
        let mut keys = self.keys.write().await;
        keys.get_mut(token).unwrap().expires_at = Some(Utc::now() - Duration::days(days));
    }
}

/// Build a fresh key with a cryptographically random token.
fn mint_key(
    name: &str,
    expires_days: Option<i64>,
    permissions: Option<HashMap<String, bool>>,
) -> ApiKey {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let token = format!("{}{}", KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes));

    let expires_at = expires_days
        .filter(|days| *days > 0)
        .map(|days| Utc::now() + Duration::days(days));

    ApiKey {
        key: token,
        name: name.to_string(),
        created_at: Utc::now(),
        expires_at,
        is_active: true,
        permissions: permissions.unwrap_or_else(|| HashMap::from([("browseruse".into(), true)])),
    }
}

/// The transient full-access key handed out on the bypass path.
fn localhost_key() -> ApiKey {
    ApiKey {
        key: LOCALHOST_TOKEN.into(),
        name: "localhost".into(),
        created_at: Utc::now(),
        expires_at: None,
        is_active: true,
        permissions: HashMap::from([("*".into(), true)]),
    }
}

/// Whether `peer` qualifies as local under the bypass policy: loopback or
/// RFC1918-private addresses, with IPv4-mapped IPv6 unwrapped first.
pub fn is_local_peer(peer: IpAddr) -> bool {
    match peer {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.is_loopback() || v4.is_private(),
            None => v6.is_loopback(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn test_config() -> AuthConfig {
        AuthConfig {
            secret_key: "test-secret-key-for-testing".into(),
            algorithm: "HS256".into(),
            access_token_expire_minutes: 30,
            localhost_bypass: true,
        }
    }

    fn manager() -> AuthManager {
        AuthManager::new(test_config())
    }

    #[tokio::test]
    async fn create_and_validate_key() {
        let auth = manager();
        let token = auth.create_api_key("test-key", Some(30), None).await;

        assert!(token.starts_with(KEY_PREFIX));
        assert!(token.len() > 20);

        let key = auth.validate_api_key(&token).await.unwrap();
        assert_eq!(key.name, "test-key");
        assert!(key.is_active);
        assert!(key.expires_at.is_some());
    }

    #[tokio::test]
    async fn unknown_key_is_unauthorized() {
        let auth = manager();
        let err = auth.validate_api_key("invalid-key").await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn revoked_key_fails_validation() {
        let auth = manager();
        let token = auth.create_api_key("revoke-test", None, None).await;

        assert!(auth.revoke_api_key(&token).await);
        let err = auth.validate_api_key(&token).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    // Pins the revoke return contract: unknown tokens return false, any
    // token present in the store returns true regardless of prior state.
    #[tokio::test]
    async fn revoke_return_values() {
        let auth = manager();
        assert!(!auth.revoke_api_key("never-issued").await);

        let token = auth.create_api_key("twice", None, None).await;
        assert!(auth.revoke_api_key(&token).await);
        assert!(auth.revoke_api_key(&token).await);
    }

    #[tokio::test]
    async fn permission_lookup_defaults_to_false() {
        let auth = manager();
        let token = auth
            .create_api_key(
                "permission-test",
                None,
                Some(HashMap::from([
                    ("browseruse".into(), true),
                    ("web_search".into(), false),
                ])),
            )
            .await;

        assert!(auth.check_permission(&token, "browseruse").await.unwrap());
        assert!(!auth.check_permission(&token, "web_search").await.unwrap());
        assert!(!auth.check_permission(&token, "nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn default_permissions_enable_browseruse_only() {
        let auth = manager();
        let token = auth.create_api_key("defaults", None, None).await;
        assert!(auth.check_permission(&token, "browseruse").await.unwrap());
        assert!(!auth.check_permission(&token, "web_search").await.unwrap());
    }

    #[tokio::test]
    async fn expired_key_fails_validation() {
        let auth = manager();
        let token = auth.create_api_key("expired-key", Some(0), None).await;

        // expires_days of zero leaves the key non-expiring
        assert!(auth.validate_api_key(&token).await.is_ok());

        auth.backdate(&token, 1).await;
        let err = auth.validate_api_key(&token).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn list_includes_default_key() {
        let auth = manager();
        let k1 = auth.create_api_key("key1", None, None).await;
        let k2 = auth.create_api_key("key2", None, None).await;

        let keys = auth.list_api_keys().await;
        assert!(keys.len() >= 3);
        assert!(keys.contains_key(&k1));
        assert!(keys.contains_key(&k2));
        assert!(keys.values().any(|k| k.name == "default"));
    }

    #[tokio::test]
    async fn jwt_round_trip() {
        let auth = manager();
        let mut data = serde_json::Map::new();
        data.insert("user".into(), serde_json::json!("x"));

        let token = auth.create_access_token(data).unwrap();
        assert!(token.len() > 50);

        let payload = auth.verify_token(&token).unwrap();
        assert_eq!(payload["user"], "x");
        assert!(payload.get("exp").is_some());
    }

    #[tokio::test]
    async fn tampered_jwt_fails() {
        let auth = manager();
        let token = auth
            .create_access_token(serde_json::Map::new())
            .unwrap();

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(matches!(
            auth.verify_token(&tampered).unwrap_err(),
            Error::Unauthorized(_)
        ));
        assert!(auth.verify_token("not-a-jwt").is_err());
    }

    #[tokio::test]
    async fn jwt_wrong_secret_fails() {
        let auth = manager();
        let mut other_config = test_config();
        other_config.secret_key = "a-different-secret".into();
        let other = AuthManager::new(other_config);

        let token = auth.create_access_token(serde_json::Map::new()).unwrap();
        assert!(other.verify_token(&token).is_err());
    }

    #[tokio::test]
    async fn expired_jwt_fails() {
        let auth = manager();
        let mut claims = serde_json::Map::new();
        claims.insert(
            "exp".into(),
            serde_json::json!((Utc::now() - Duration::hours(2)).timestamp()),
        );
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret-key-for-testing"),
        )
        .unwrap();

        assert!(auth.verify_token(&token).is_err());
    }

    #[tokio::test]
    async fn localhost_bypass_grants_full_access() {
        let auth = manager();
        let key = auth
            .authorize(None, "127.0.0.1".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(key.key, LOCALHOST_TOKEN);
        assert!(key.allows("browseruse"));
        assert!(key.allows("web_search"));
        assert!(key.allows("anything-else"));

        // synthetic keys never touch the store
        assert!(!auth.list_api_keys().await.contains_key(LOCALHOST_TOKEN));
    }

    #[tokio::test]
    async fn non_local_peer_without_token_is_rejected() {
        let auth = manager();
        let err = auth
            .authorize(None, "8.8.8.8".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn bypass_disabled_rejects_local_peer() {
        let mut config = test_config();
        config.localhost_bypass = false;
        let auth = AuthManager::new(config);

        let err = auth
            .authorize(None, "127.0.0.1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn bearer_token_is_validated_even_from_localhost() {
        let auth = manager();
        let err = auth
            .authorize(Some("invalid-key"), "127.0.0.1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn local_peer_policy() {
        assert!(is_local_peer("127.0.0.1".parse().unwrap()));
        assert!(is_local_peer("10.1.2.3".parse().unwrap()));
        assert!(is_local_peer("192.168.0.10".parse().unwrap()));
        assert!(is_local_peer("172.16.5.5".parse().unwrap()));
        assert!(is_local_peer("::1".parse().unwrap()));
        assert!(is_local_peer("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_local_peer("8.8.8.8".parse().unwrap()));
        assert!(!is_local_peer("2001:db8::1".parse().unwrap()));
    }
}
