//! Account credentials and the secret wrapper protecting them.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::client::CloudError;
use crate::oauth::OAuthToken;

/// A string secret that is wiped from memory on drop and redacted in
/// `Debug` output. Read access goes through [`SecretString::expose`], so
/// every plaintext use is visible at the call site.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Which credential fields a provider needs before it can be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequirements {
    pub url: bool,
    pub username: bool,
    pub password: bool,
    pub secure_flag: bool,
    pub token: bool,
}

impl CredentialRequirements {
    /// Username + password + server URL (WebDAV, FTP).
    pub fn password_based() -> Self {
        Self {
            url: true,
            username: true,
            password: true,
            secure_flag: true,
            token: false,
        }
    }

    /// OAuth2 token only (Dropbox, Google Drive, ...).
    pub fn token_based() -> Self {
        Self {
            token: true,
            ..Self::default()
        }
    }
}

/// Credentials for one cloud storage account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Which provider these credentials belong to.
    pub cloud_storage_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<OAuthToken>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Whether to use the encrypted transport variant (ftps, https).
    #[serde(default)]
    pub secure: bool,
}

impl Credentials {
    /// Empty credentials bound to one provider.
    pub fn for_storage(cloud_storage_id: impl Into<String>) -> Self {
        Self {
            cloud_storage_id: cloud_storage_id.into(),
            token: None,
            username: None,
            password: None,
            url: None,
            secure: true,
        }
    }

    /// Check this credential set against a provider's requirements.
    pub fn validate(&self, requirements: &CredentialRequirements) -> Result<(), CloudError> {
        fn missing(field: &str) -> CloudError {
            CloudError::InvalidParameter(format!("missing credential field: {field}"))
        }

        if requirements.url && self.url.as_deref().is_none_or(str::is_empty) {
            return Err(missing("url"));
        }
        if requirements.username && self.username.as_deref().is_none_or(str::is_empty) {
            return Err(missing("username"));
        }
        if requirements.password && self.password.is_none() {
            return Err(missing("password"));
        }
        if requirements.token && self.token.is_none() {
            return Err(missing("token"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_debug_is_redacted() {
        let secret = SecretString::new("hunter2");
        assert_eq!(format!("{secret:?}"), "SecretString(***)");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_credentials_debug_does_not_leak_password() {
        let mut credentials = Credentials::for_storage("webdav");
        credentials.password = Some("hunter2".into());
        let printed = format!("{credentials:?}");
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_validate_password_based() {
        let requirements = CredentialRequirements::password_based();
        let mut credentials = Credentials::for_storage("webdav");
        assert!(credentials.validate(&requirements).is_err());

        credentials.url = Some("https://dav.example.org".into());
        credentials.username = Some("ada".into());
        assert!(credentials.validate(&requirements).is_err());

        credentials.password = Some("hunter2".into());
        assert!(credentials.validate(&requirements).is_ok());
    }

    #[test]
    fn test_validate_reports_invalid_parameter() {
        let requirements = CredentialRequirements::password_based();
        let credentials = Credentials::for_storage("webdav");
        let err = credentials.validate(&requirements).unwrap_err();
        assert!(matches!(err, CloudError::InvalidParameter(_)));
    }

    #[test]
    fn test_empty_requirements_accept_empty_credentials() {
        let credentials = Credentials::for_storage("directory");
        assert!(
            credentials
                .validate(&CredentialRequirements::default())
                .is_ok()
        );
    }

    #[test]
    fn test_credentials_json_roundtrip() {
        let mut credentials = Credentials::for_storage("webdav");
        credentials.url = Some("https://dav.example.org".into());
        credentials.username = Some("ada".into());
        credentials.password = Some("hunter2".into());

        let json = serde_json::to_string(&credentials).unwrap();
        let parsed: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(credentials, parsed);
    }
}
