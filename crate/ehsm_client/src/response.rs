use crate::error::Error;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

/// `code` value of a successful response.
pub const SUCCESS_CODE: i64 = 200;

/// Status code of a response, sent either as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ResponseCode {
    Int(i64),
    Str(String),
}

impl ResponseCode {
    pub fn is_success(&self) -> bool {
        match self {
            ResponseCode::Int(code) => *code == SUCCESS_CODE,
            ResponseCode::Str(code) => code.trim().parse::<i64>() == Ok(SUCCESS_CODE),
        }
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResponseCode::Int(code) => write!(f, "{code}"),
            ResponseCode::Str(code) => write!(f, "{code}"),
        }
    }
}

/// Response envelope returned by the KMS.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    pub code: ResponseCode,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub action: Option<String>,
}

impl ResponseEnvelope {
    /// Decode a raw response body.
    ///
    /// Fails with [`Error::ProtocolError`] if `body` is not a JSON object and
    /// with [`Error::SchemaError`] if the object doesn't have the envelope shape.
    pub fn parse(body: &[u8]) -> Result<Self, Error> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Error::ProtocolError(format!("response is not JSON: {e}")))?;
        if !value.is_object() {
            return Err(Error::ProtocolError(
                "response is not a JSON object".to_owned(),
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| Error::SchemaError(format!("malformed response envelope: {e}")))
    }

    /// Check the status and the action, then hand back `result`.
    pub fn into_result(self, action: &str) -> Result<Map<String, Value>, Error> {
        if !self.code.is_success() {
            return Err(Error::ServerError {
                code: self.code.to_string(),
                message: self.message.unwrap_or_default(),
            });
        }

        if let Some(responded) = &self.action {
            if responded != action {
                return Err(Error::ProtocolError(format!(
                    "response to '{responded}' received for '{action}'"
                )));
            }
        }

        match self.result {
            Some(Value::Object(result)) => Ok(result),
            Some(_) => Err(Error::SchemaError(
                "'result' is not a JSON object".to_owned(),
            )),
            None => Err(Error::SchemaError(format!(
                "'result' missing in successful {action} response"
            ))),
        }
    }
}

/// Validate the response to `action` and extract its `result` object.
pub fn unwrap_response(body: &[u8], action: &str) -> Result<Map<String, Value>, Error> {
    ResponseEnvelope::parse(body)?.into_result(action)
}

/// Typed view of a `result` object.
pub fn decode_result<T: DeserializeOwned>(result: Map<String, Value>) -> Result<T, Error> {
    serde_json::from_value(Value::Object(result))
        .map_err(|e| Error::SchemaError(format!("unexpected result content: {e}")))
}

/// `result` of the `GenerateQuote` action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerateQuoteResult {
    pub quote: String,
}
