//! OAuth2 client-side types: tokens, PKCE material, redirect parsing.
//!
//! The authorization flow crosses a process-external boundary: the
//! workflow opens the system browser with an authorization URL and only
//! resumes when the platform later delivers the redirect URL back. The
//! state and code-verifier strings generated here must therefore survive
//! a process restart; persisting them is the caller's job.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::client::CloudError;

/// Tokens are refreshed this long before their stated expiry.
const REFRESH_MARGIN_MINUTES: i64 = 2;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OAuthError {
    /// The refresh token itself is no longer valid; the user must run
    /// the browser authorization again.
    #[error("refresh token expired, authorization must be repeated")]
    RefreshTokenExpired,

    /// The user declined consent, or the redirect carried an error.
    #[error("authorization was rejected: {0}")]
    Rejected(String),

    /// The redirect URL does not carry the expected parameters.
    #[error("authorization redirect is malformed: {0}")]
    MalformedRedirect(String),

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, OAuthError>;

/// An OAuth2 token pair with its expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthToken {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Whether the access token is expired or close enough to expiry
    /// that it should be refreshed before use.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires| now >= expires - Duration::minutes(REFRESH_MARGIN_MINUTES))
    }
}

/// The OAuth2 surface of a cloud storage client.
#[async_trait]
pub trait OAuth2Capable: Send + Sync {
    /// Build the URL the external browser is sent to for consent.
    fn build_authorization_request_url(&self, state: &str, code_verifier: &str) -> String;

    /// Exchange the code carried by the redirect URL for a token pair.
    async fn fetch_token(
        &self,
        redirect_url: &str,
        state: &str,
        code_verifier: &str,
    ) -> Result<OAuthToken>;

    /// Trade a refresh token for a fresh access token.
    async fn refresh_token(&self, token: &OAuthToken) -> Result<OAuthToken>;
}

/// Random `state` parameter tying a redirect to the run that started it.
pub fn generate_state() -> String {
    random_url_safe(12)
}

/// Random PKCE code verifier.
pub fn generate_code_verifier() -> String {
    random_url_safe(36)
}

/// PKCE S256 challenge: BASE64URL(SHA256(verifier)), no padding.
pub fn code_challenge_s256(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn random_url_safe(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The parameters an authorization redirect may carry.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl RedirectParams {
    /// Extract `code`, `state` and `error` query parameters.
    pub fn parse(redirect_url: &str) -> Result<Self> {
        let url = Url::parse(redirect_url)
            .map_err(|e| OAuthError::MalformedRedirect(e.to_string()))?;

        let mut params = Self {
            code: None,
            state: None,
            error: None,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(params)
    }

    /// Validate the redirect against the persisted `state` and return
    /// the authorization code.
    pub fn authorization_code(&self, expected_state: &str) -> Result<&str> {
        if let Some(error) = &self.error {
            return Err(OAuthError::Rejected(error.clone()));
        }
        match &self.state {
            Some(state) if state == expected_state => {}
            _ => {
                return Err(OAuthError::MalformedRedirect(
                    "state parameter missing or not matching".into(),
                ));
            }
        }
        self.code
            .as_deref()
            .ok_or_else(|| OAuthError::MalformedRedirect("code parameter missing".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_needs_refresh_near_expiry() {
        let now = Utc.timestamp_opt(10_000, 0).unwrap();
        let token = OAuthToken {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expires_at: Some(now + Duration::seconds(30)),
        };
        assert!(token.needs_refresh(now));
    }

    #[test]
    fn test_no_refresh_when_plenty_of_time_left() {
        let now = Utc.timestamp_opt(10_000, 0).unwrap();
        let token = OAuthToken {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expires_at: Some(now + Duration::hours(1)),
        };
        assert!(!token.needs_refresh(now));
    }

    #[test]
    fn test_no_refresh_without_expiry() {
        let token = OAuthToken {
            access_token: "at".into(),
            refresh_token: None,
            expires_at: None,
        };
        assert!(!token.needs_refresh(Utc::now()));
    }

    #[test]
    fn test_code_challenge_matches_known_vector() {
        // RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            code_challenge_s256(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_state_and_verifier_are_random() {
        assert_ne!(generate_state(), generate_state());
        assert_ne!(generate_code_verifier(), generate_code_verifier());
    }

    #[test]
    fn test_parse_redirect_with_code_and_state() {
        let params =
            RedirectParams::parse("app://oauth2redirect/?code=abc&state=xyz").unwrap();
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert_eq!(params.authorization_code("xyz").unwrap(), "abc");
    }

    #[test]
    fn test_redirect_error_is_rejection() {
        let params =
            RedirectParams::parse("app://oauth2redirect/?error=access_denied&state=xyz").unwrap();
        assert!(matches!(
            params.authorization_code("xyz").unwrap_err(),
            OAuthError::Rejected(_)
        ));
    }

    #[test]
    fn test_state_mismatch_is_rejected() {
        let params =
            RedirectParams::parse("app://oauth2redirect/?code=abc&state=evil").unwrap();
        assert!(params.authorization_code("xyz").is_err());
    }

    #[test]
    fn test_garbage_redirect_is_malformed() {
        assert!(matches!(
            RedirectParams::parse("not a url").unwrap_err(),
            OAuthError::MalformedRedirect(_)
        ));
    }
}
