use crate::client::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const ORG_SERVICE_URL_ENV: &str = "AZDO_ORG_SERVICE_URL";
pub const PERSONAL_ACCESS_TOKEN_ENV: &str = "AZDO_PERSONAL_ACCESS_TOKEN";
pub const API_VERSION_ENV: &str = "AZDO_API_VERSION";
pub const HTTP_TIMEOUT_ENV: &str = "AZDO_HTTP_TIMEOUT_SECS";

pub const DEFAULT_API_VERSION: &str = "7.1-preview.1";

#[derive(Clone, Serialize, Deserialize)]
pub struct AzdoConfig {
    pub organization_url: String,
    #[serde(skip_serializing, default)]
    pub personal_access_token: String,
    pub api_version: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl fmt::Debug for AzdoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzdoConfig")
            .field("organization_url", &self.organization_url)
            .field("personal_access_token", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for AzdoConfig {
    fn default() -> Self {
        Self {
            organization_url: "https://dev.azure.com/".to_string(),
            personal_access_token: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

impl AzdoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the organization URL and token the same way the provider does
    /// when run by Terraform.
    pub fn from_env() -> ClientResult<Self> {
        let organization_url =
            std::env::var(ORG_SERVICE_URL_ENV).map_err(|_| ClientError::InvalidConfig {
                message: format!("{} must be set", ORG_SERVICE_URL_ENV),
            })?;
        let personal_access_token =
            std::env::var(PERSONAL_ACCESS_TOKEN_ENV).map_err(|_| ClientError::InvalidConfig {
                message: format!("{} must be set", PERSONAL_ACCESS_TOKEN_ENV),
            })?;

        let mut config = Self::default()
            .with_organization_url(organization_url)
            .with_personal_access_token(personal_access_token);

        if let Ok(api_version) = std::env::var(API_VERSION_ENV) {
            config = config.with_api_version(api_version);
        }

        if let Ok(raw) = std::env::var(HTTP_TIMEOUT_ENV) {
            let secs: u64 = raw.parse().map_err(|_| ClientError::InvalidConfig {
                message: format!("{} must be a whole number of seconds, got {:?}", HTTP_TIMEOUT_ENV, raw),
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        config
            .validate()
            .map_err(|message| ClientError::InvalidConfig { message })?;
        Ok(config)
    }

    pub fn with_organization_url(mut self, organization_url: impl Into<String>) -> Self {
        self.organization_url = organization_url.into();
        self
    }

    pub fn with_personal_access_token(mut self, token: impl Into<String>) -> Self {
        self.personal_access_token = token.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.organization_url.is_empty() {
            return Err("Organization URL cannot be empty".to_string());
        }

        if !self.organization_url.starts_with("http://")
            && !self.organization_url.starts_with("https://")
        {
            return Err("Organization URL must start with http:// or https://".to_string());
        }

        if self.personal_access_token.trim().is_empty() {
            return Err("Personal access token cannot be empty".to_string());
        }

        if self.api_version.trim().is_empty() {
            return Err("API version cannot be empty".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Bounded retry for throttled or unavailable responses. Applied by the HTTP
/// client only; callers above it never retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }
}
