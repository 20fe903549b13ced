//! COS credentials and request signing
//!
//! COS authenticates every request with a `q-sign` signature:
//!
//! 1. `SignKey = hex(HMAC-SHA1(SecretKey, KeyTime))`
//! 2. `HttpString = method \n path \n params \n headers \n`, where params and
//!    headers are URL-encoded, lower-cased, sorted `k=v` pairs
//! 3. `StringToSign = "sha1" \n KeyTime \n hex(SHA1(HttpString)) \n`
//! 4. `Signature = hex(HMAC-SHA1(SignKey, StringToSign))`
//!
//! The same signature travels either in the `Authorization` header or as
//! query parameters of a presigned URL.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

use crate::CosError;

type HmacSha1 = Hmac<Sha1>;

/// Environment variable holding the COS SecretId
pub const ENV_SECRET_ID: &str = "COS_SECRET_ID";
/// Environment variable holding the COS SecretKey
pub const ENV_SECRET_KEY: &str = "COS_SECRET_KEY";
/// Environment variable holding an optional STS session token
pub const ENV_SESSION_TOKEN: &str = "COS_SESSION_TOKEN";

// ============================================================================
// Credentials
// ============================================================================

/// API key pair for one COS account
#[derive(Clone)]
pub struct Credentials {
    secret_id: String,
    secret_key: String,
    session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            session_token: None,
        }
    }

    /// Attach a temporary STS token, sent as `x-cos-security-token`
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read credentials from `COS_SECRET_ID`, `COS_SECRET_KEY` and the
    /// optional `COS_SESSION_TOKEN`
    pub fn from_env() -> Result<Self, CosError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| CosError::InvalidConfig(format!("{name} is not set")))
        };
        let mut credentials = Self::new(read(ENV_SECRET_ID)?, read(ENV_SECRET_KEY)?);
        if let Ok(token) = read(ENV_SESSION_TOKEN) {
            credentials = credentials.with_session_token(token);
        }
        Ok(credentials)
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Validity window of a signature, in Unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignWindow {
    pub start: i64,
    pub end: i64,
}

impl SignWindow {
    /// Window starting now and lasting `lifetime`
    ///
    /// The start is backdated by a minute to tolerate clock skew.
    pub fn from_now(lifetime: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        let lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX / 2);
        Self {
            start: now - 60,
            end: now.saturating_add(lifetime),
        }
    }

    fn key_time(&self) -> String {
        format!("{};{}", self.start, self.end)
    }
}

/// Inputs of one signature
#[derive(Debug, Clone)]
pub struct SignRequest<'a> {
    /// HTTP method, any case
    pub method: &'a str,
    /// Decoded request path starting with `/`
    pub path: &'a str,
    pub params: &'a [(String, String)],
    pub headers: &'a [(String, String)],
}

/// Encode, lower-case and sort pairs; returns (key list, `k=v&...` string)
fn canonical_pairs(pairs: &[(String, String)]) -> (String, String) {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k.to_ascii_lowercase()).into_owned(),
                urlencoding::encode(v).into_owned(),
            )
        })
        .collect();
    encoded.sort();

    let list = encoded
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let joined = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    (list, joined)
}

fn hmac_sha1_hex(key: &[u8], data: &[u8]) -> Result<String, CosError> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| CosError::InvalidConfig(format!("signing key rejected: {e}")))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Computes `q-sign` signatures for one set of credentials
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The `q-sign-*` parameters for `request`, in the order COS documents them
    pub fn sign(
        &self,
        request: &SignRequest<'_>,
        window: SignWindow,
    ) -> Result<Vec<(&'static str, String)>, CosError> {
        let key_time = window.key_time();
        let sign_key = hmac_sha1_hex(self.credentials.secret_key.as_bytes(), key_time.as_bytes())?;

        let (param_list, params) = canonical_pairs(request.params);
        let (header_list, headers) = canonical_pairs(request.headers);
        let http_string = format!(
            "{}\n{}\n{}\n{}\n",
            request.method.to_ascii_lowercase(),
            request.path,
            params,
            headers
        );
        let string_to_sign = format!(
            "sha1\n{}\n{}\n",
            key_time,
            hex::encode(Sha1::digest(http_string.as_bytes()))
        );
        let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes())?;

        Ok(vec![
            ("q-sign-algorithm", "sha1".to_string()),
            ("q-ak", self.credentials.secret_id.clone()),
            ("q-sign-time", key_time.clone()),
            ("q-key-time", key_time),
            ("q-header-list", header_list),
            ("q-url-param-list", param_list),
            ("q-signature", signature),
        ])
    }

    /// Value of the `Authorization` header for `request`
    pub fn authorization(
        &self,
        request: &SignRequest<'_>,
        window: SignWindow,
    ) -> Result<String, CosError> {
        Ok(self
            .sign(request, window)?
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&"))
    }
}
