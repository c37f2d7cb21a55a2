use crate::{
    config::ClientConfig,
    envelope::RequestEnvelope,
    error::Error,
    payload::Payload,
    response::{decode_result, unwrap_response, GenerateQuoteResult},
};

use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value};

pub const GENERATE_QUOTE_ACTION: &str = "GenerateQuote";

/// Blocking client of the eHSM KMS REST API.
pub struct KmsClient {
    config: ClientConfig,
    http: reqwest::blocking::Client,
}

impl KmsClient {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_certificate)
            .build()?;

        Ok(KmsClient { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sign `payload`, post it to `<base-url>/ehsm?Action=<action>` and
    /// return the `result` object of the response.
    pub fn call(&self, action: &str, payload: Payload) -> Result<Map<String, Value>, Error> {
        let url = self.config.action_url(action)?;
        let envelope = RequestEnvelope::build(payload, &self.config.credentials)?;
        let body = envelope.to_body();

        debug!("{action} request: {body}");

        let response = self.http.post(url).body(body).send()?;
        let status = response.status();
        let raw = response.bytes()?;

        debug!("{action} response ({status}): {}", String::from_utf8_lossy(&raw));

        let result = match unwrap_response(&raw, action) {
            Err(Error::ProtocolError(e)) if !status.is_success() => Err(Error::ProtocolError(
                format!("HTTP status code {status}: {e}"),
            )),
            Err(Error::ServerError { code, message }) => {
                warn!("{action} failed, error message: {message}");
                Err(Error::ServerError { code, message })
            }
            r => r,
        }?;

        info!("{action} successfully");

        Ok(result)
    }

    /// Ask the KMS enclave for a quote bound to `challenge`.
    ///
    /// # Returns
    ///
    /// Either the quote as sent by the server or [`Error`].
    pub fn generate_quote(&self, challenge: &[u8]) -> Result<String, Error> {
        let mut payload = Payload::new();
        payload.insert_base64("challenge", challenge)?;

        let result = self.call(GENERATE_QUOTE_ACTION, payload)?;
        let GenerateQuoteResult { quote } = decode_result(result)?;

        Ok(quote)
    }
}
