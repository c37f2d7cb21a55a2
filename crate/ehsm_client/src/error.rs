use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("ConfigurationError: {0}")]
    ConfigurationError(String),
    #[error("EncodingError: {0}")]
    EncodingError(String),
    #[error("TransportError: {0}")]
    TransportError(#[from] reqwest::Error),
    #[error("ProtocolError: {0}")]
    ProtocolError(String),
    #[error("SchemaError: {0}")]
    SchemaError(String),
    #[error("ServerError: code: {code}, message: {message}")]
    ServerError { code: String, message: String },
    #[error("UnexpectedError: {0}")]
    UnexpectedError(String),
}
