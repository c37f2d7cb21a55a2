use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    config::Credentials,
    error::Error,
    payload::{canonicalize, Payload, PayloadValue},
};

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use log::debug;
use rand::Rng as _;
use serde_json::{Map, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes in a request nonce.
pub const NONCE_SIZE: usize = 16;

/// Signed request body sent to the KMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    payload: Payload,
    appid: String,
    nonce: String,
    timestamp: String,
    sign: String,
}

impl RequestEnvelope {
    /// Sign `payload` with a fresh timestamp (milliseconds since epoch) and nonce.
    pub fn build(payload: Payload, credentials: &Credentials) -> Result<Self, Error> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::UnexpectedError(format!("system clock before UNIX epoch: {e}")))?
            .as_millis()
            .to_string();
        let nonce: [u8; NONCE_SIZE] = rand::thread_rng().gen();

        Self::build_with(payload, credentials, &timestamp, &hex::encode(nonce))
    }

    /// Sign `payload` with a caller supplied timestamp and nonce.
    pub fn build_with(
        payload: Payload,
        credentials: &Credentials,
        timestamp: &str,
        nonce: &str,
    ) -> Result<Self, Error> {
        let (appid, apikey) = credentials.require()?;

        let canonical = signing_string(&payload, appid, nonce, timestamp);
        debug!("Canonical request string: {canonical}");
        let sign = general_purpose::STANDARD.encode(compute_mac(apikey, &canonical)?);

        Ok(RequestEnvelope {
            payload,
            appid: appid.to_owned(),
            nonce: nonce.to_owned(),
            timestamp: timestamp.to_owned(),
            sign,
        })
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Base64 encoded HMAC-SHA256 of the canonical request.
    pub fn sign(&self) -> &str {
        &self.sign
    }

    /// Recompute the signature with `apikey` and compare it in constant time.
    pub fn verify_signature(&self, apikey: &str) -> bool {
        let Ok(expected) = general_purpose::STANDARD.decode(&self.sign) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(apikey.as_bytes()) else {
            return false;
        };
        mac.update(
            signing_string(&self.payload, &self.appid, &self.nonce, &self.timestamp).as_bytes(),
        );
        mac.verify_slice(&expected).is_ok()
    }

    /// Payload fields in insertion order followed by the envelope fields.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (key, value) in self.payload.iter() {
            root.insert(key.to_owned(), value.to_json());
        }
        root.insert("appid".to_owned(), Value::from(self.appid.as_str()));
        root.insert("nonce".to_owned(), Value::from(self.nonce.as_str()));
        root.insert("timestamp".to_owned(), Value::from(self.timestamp.as_str()));
        root.insert("sign".to_owned(), Value::from(self.sign.as_str()));
        Value::Object(root)
    }

    pub fn to_body(&self) -> String {
        self.to_json().to_string()
    }
}

fn signing_string(payload: &Payload, appid: &str, nonce: &str, timestamp: &str) -> String {
    let appid = PayloadValue::from(appid);
    let nonce = PayloadValue::from(nonce);
    let timestamp = PayloadValue::from(timestamp);

    canonicalize(payload.iter().chain([
        ("appid", &appid),
        ("nonce", &nonce),
        ("timestamp", &timestamp),
    ]))
}

fn compute_mac(apikey: &str, message: &str) -> Result<Vec<u8>, Error> {
    let mut mac = HmacSha256::new_from_slice(apikey.as_bytes())
        .map_err(|e| Error::ConfigurationError(format!("invalid apikey: {e}")))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESTAMP: &str = "1700000000000";
    const NONCE: &str = "00112233445566778899aabbccddeeff";

    fn credentials() -> Credentials {
        Credentials::new("appid-1", "apikey-secret")
    }

    fn challenge_payload(challenge: &[u8]) -> Payload {
        let mut payload = Payload::new();
        payload.insert_base64("challenge", challenge).unwrap();
        payload
    }

    #[test]
    fn test_build_is_deterministic() {
        let payload = challenge_payload(b"challenge123456");
        let first =
            RequestEnvelope::build_with(payload.clone(), &credentials(), TIMESTAMP, NONCE).unwrap();
        let second =
            RequestEnvelope::build_with(payload, &credentials(), TIMESTAMP, NONCE).unwrap();

        assert_eq!(first.sign(), second.sign());
        assert_eq!(first.to_body(), second.to_body());
    }

    #[test]
    fn test_sign_depends_on_every_field() {
        let base = RequestEnvelope::build_with(
            challenge_payload(b"AAA"),
            &credentials(),
            TIMESTAMP,
            NONCE,
        )
        .unwrap();

        let other_challenge = RequestEnvelope::build_with(
            challenge_payload(b"AAB"),
            &credentials(),
            TIMESTAMP,
            NONCE,
        )
        .unwrap();
        assert_ne!(base.sign(), other_challenge.sign());

        let other_timestamp = RequestEnvelope::build_with(
            challenge_payload(b"AAA"),
            &credentials(),
            "1700000000001",
            NONCE,
        )
        .unwrap();
        assert_ne!(base.sign(), other_timestamp.sign());

        let other_nonce = RequestEnvelope::build_with(
            challenge_payload(b"AAA"),
            &credentials(),
            TIMESTAMP,
            "ffeeddccbbaa99887766554433221100",
        )
        .unwrap();
        assert_ne!(base.sign(), other_nonce.sign());

        let other_key = RequestEnvelope::build_with(
            challenge_payload(b"AAA"),
            &Credentials::new("appid-1", "another-secret"),
            TIMESTAMP,
            NONCE,
        )
        .unwrap();
        assert_ne!(base.sign(), other_key.sign());
    }

    #[test]
    fn test_sign_ignores_insertion_order() {
        let mut forward = Payload::new();
        forward.insert("keyid", "k").unwrap();
        forward.insert("challenge", "c").unwrap();
        let mut backward = Payload::new();
        backward.insert("challenge", "c").unwrap();
        backward.insert("keyid", "k").unwrap();

        let forward = RequestEnvelope::build_with(forward, &credentials(), TIMESTAMP, NONCE).unwrap();
        let backward =
            RequestEnvelope::build_with(backward, &credentials(), TIMESTAMP, NONCE).unwrap();
        assert_eq!(forward.sign(), backward.sign());
    }

    #[test]
    fn test_envelope_keys() {
        let envelope = RequestEnvelope::build(challenge_payload(b"challenge123456"), &credentials())
            .unwrap();
        let json = envelope.to_json();
        let keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();

        assert_eq!(keys, vec!["challenge", "appid", "nonce", "timestamp", "sign"]);
        assert_eq!(json["challenge"], "Y2hhbGxlbmdlMTIzNDU2");
        assert_eq!(json["appid"], "appid-1");
        assert_eq!(envelope.nonce().len(), NONCE_SIZE * 2);
        assert!(envelope.timestamp().parse::<u128>().is_ok());
        assert!(envelope.verify_signature("apikey-secret"));
        assert!(!envelope.verify_signature("wrong"));
    }

    #[test]
    fn test_fresh_nonce_per_build() {
        let payload = challenge_payload(b"challenge123456");
        let first = RequestEnvelope::build(payload.clone(), &credentials()).unwrap();
        let second = RequestEnvelope::build(payload, &credentials()).unwrap();
        assert_ne!(first.nonce(), second.nonce());
        assert_ne!(first.sign(), second.sign());
    }

    #[test]
    fn test_missing_secret() {
        let payload = challenge_payload(b"challenge123456");
        for credentials in [
            Credentials::default(),
            Credentials {
                appid: Some("appid-1".to_owned()),
                apikey: None,
            },
            Credentials::new("appid-1", ""),
        ] {
            assert!(matches!(
                RequestEnvelope::build_with(payload.clone(), &credentials, TIMESTAMP, NONCE),
                Err(Error::ConfigurationError(_))
            ));
        }
    }
}
