use std::{fs, path::Path, time::Duration};

use crate::error::Error;

use reqwest::Url;
use serde::Deserialize;

pub const APPID_ENV: &str = "EHSM_APPID";
pub const APIKEY_ENV: &str = "EHSM_APIKEY";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Application credentials shared with the KMS.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub appid: Option<String>,
    pub apikey: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("appid", &self.appid)
            .field("apikey", &self.apikey.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn new(appid: &str, apikey: &str) -> Self {
        Credentials {
            appid: Some(appid.to_owned()),
            apikey: Some(apikey.to_owned()),
        }
    }

    /// Read credentials from `EHSM_APPID` and `EHSM_APIKEY`.
    pub fn from_env() -> Self {
        Credentials {
            appid: std::env::var(APPID_ENV).ok(),
            apikey: std::env::var(APIKEY_ENV).ok(),
        }
    }

    /// Keep values of `other` when they are set.
    pub fn merge(self, other: Credentials) -> Self {
        Credentials {
            appid: other.appid.or(self.appid),
            apikey: other.apikey.or(self.apikey),
        }
    }

    /// Both values, or [`Error::ConfigurationError`] if one is missing.
    pub fn require(&self) -> Result<(&str, &str), Error> {
        let appid = self
            .appid
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::ConfigurationError(format!("appid is missing (set {APPID_ENV})")))?;
        let apikey = self
            .apikey
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::ConfigurationError(format!("apikey is missing (set {APIKEY_ENV})"))
            })?;
        Ok((appid, apikey))
    }
}

/// Settings of a [`crate::api::KmsClient`], fixed once built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    pub credentials: Credentials,
    /// Set to `false` to accept self-signed server certificates.
    pub verify_certificate: bool,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct ConfigFile {
    base_url: String,
    #[serde(flatten)]
    credentials: Credentials,
    verify_certificate: Option<bool>,
    timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, Error> {
        let base_url = base_url.trim_end_matches('/');
        let url = Url::parse(base_url)
            .map_err(|e| Error::ConfigurationError(format!("bad KMS URL '{base_url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::ConfigurationError(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        Ok(ClientConfig {
            base_url: base_url.to_owned(),
            credentials,
            verify_certificate: true,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Load a JSON configuration file.
    ///
    /// ```json
    /// {"base_url": "https://kms:9000", "appid": "...", "apikey": "...",
    ///  "verify_certificate": false, "timeout_secs": 30}
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigurationError(format!("can't read {}: {e}", path.display()))
        })?;
        let file: ConfigFile = serde_json::from_str(&content).map_err(|e| {
            Error::ConfigurationError(format!("can't parse {}: {e}", path.display()))
        })?;

        let mut config = ClientConfig::new(&file.base_url, file.credentials)?;
        if let Some(verify_certificate) = file.verify_certificate {
            config.verify_certificate = verify_certificate;
        }
        if let Some(timeout_secs) = file.timeout_secs {
            config.timeout = Duration::from_secs(timeout_secs);
        }

        Ok(config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<base-url>/ehsm?Action=<action>`
    pub fn action_url(&self, action: &str) -> Result<Url, Error> {
        Url::parse_with_params(&format!("{}/ehsm", self.base_url), &[("Action", action)])
            .map_err(|e| Error::ConfigurationError(e.to_string()))
    }
}
