//! Client side of the eHSM KMS REST API.
//!
//! Requests are JSON objects signed with HMAC-SHA256 over a canonical form of
//! their fields ([`envelope::RequestEnvelope`]). Responses are checked for a
//! success `code` before their `result` object is handed back
//! ([`response::unwrap_response`]).

pub mod api;
pub mod config;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod response;

pub use api::KmsClient;
pub use config::{ClientConfig, Credentials};
pub use error::Error;
pub use payload::{Payload, PayloadValue};
