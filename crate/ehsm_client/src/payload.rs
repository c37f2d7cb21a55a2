use std::fmt::Write as _;

use crate::error::Error;

use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Value};

/// Field names owned by the request envelope.
pub const RESERVED_KEYS: [&str; 4] = ["appid", "nonce", "timestamp", "sign"];

/// Primitive value carried by a [`Payload`] entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl PayloadValue {
    fn type_tag(&self) -> char {
        match self {
            PayloadValue::Str(_) => 's',
            PayloadValue::Int(_) => 'i',
            PayloadValue::Bool(_) => 'b',
        }
    }

    fn canonical_text(&self) -> String {
        match self {
            PayloadValue::Str(s) => s.clone(),
            PayloadValue::Int(i) => i.to_string(),
            PayloadValue::Bool(b) => b.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PayloadValue::Str(s) => Value::from(s.as_str()),
            PayloadValue::Int(i) => Value::from(*i),
            PayloadValue::Bool(b) => Value::from(*b),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Str(value.to_owned())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Str(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        PayloadValue::Int(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        PayloadValue::Bool(value)
    }
}

impl TryFrom<&Value> for PayloadValue {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(PayloadValue::Str(s.clone())),
            Value::Bool(b) => Ok(PayloadValue::Bool(*b)),
            Value::Number(n) => n.as_i64().map(PayloadValue::Int).ok_or_else(|| {
                Error::EncodingError(format!("number {n} is not a 64-bit signed integer"))
            }),
            Value::Null => Err(Error::EncodingError(
                "null can't be encoded in a payload".to_owned(),
            )),
            Value::Array(_) | Value::Object(_) => Err(Error::EncodingError(
                "nested values can't be encoded in a payload".to_owned(),
            )),
        }
    }
}

/// Ordered set of request parameters.
///
/// Insertion order is kept for the JSON body sent on the wire. The
/// signature never depends on it: see [`canonicalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    entries: Vec<(String, PayloadValue)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, replacing in place any previous value.
    pub fn insert(&mut self, key: &str, value: impl Into<PayloadValue>) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::EncodingError("empty payload key".to_owned()));
        }
        if RESERVED_KEYS.contains(&key) {
            return Err(Error::EncodingError(format!(
                "'{key}' is reserved for the request envelope"
            )));
        }

        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_owned(), value)),
        }

        Ok(())
    }

    /// Insert raw bytes which must already be valid UTF-8.
    pub fn insert_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), Error> {
        let value = std::str::from_utf8(value).map_err(|e| {
            Error::EncodingError(format!(
                "value of '{key}' is not UTF-8 ({e}), wrap it with base64"
            ))
        })?;
        self.insert(key, value)
    }

    /// Insert arbitrary bytes as a standard base64 string.
    pub fn insert_base64(&mut self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.insert(key, general_purpose::STANDARD.encode(value))
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PayloadValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<&Map<String, Value>> for Payload {
    type Error = Error;

    fn try_from(map: &Map<String, Value>) -> Result<Self, Self::Error> {
        let mut payload = Payload::new();
        for (key, value) in map {
            payload.insert(key, PayloadValue::try_from(value)?)?;
        }
        Ok(payload)
    }
}

/// Deterministic serialization of signed fields.
///
/// Keys are sorted by bytes. Each entry is written as
/// `<key len>:<key><type tag><value len>:<value>`, lengths in bytes, so no
/// two distinct field sets share an encoding.
pub fn canonicalize<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a PayloadValue)>,
{
    let mut fields: Vec<_> = fields.into_iter().collect();
    fields.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut out = String::new();
    for (key, value) in fields {
        let text = value.canonical_text();
        // Writing into a String can't fail.
        let _ = write!(
            out,
            "{}:{}{}{}:{}",
            key.len(),
            key,
            value.type_tag(),
            text.len(),
            text
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut payload = Payload::new();
        payload.insert("keyid", "k1").unwrap();
        payload.insert("challenge", "AAA=").unwrap();
        payload.insert("keyid", "k2").unwrap();

        let keys: Vec<&str> = payload.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["keyid", "challenge"]);
        assert_eq!(payload.get("keyid"), Some(&PayloadValue::from("k2")));
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn test_reserved_and_empty_keys() {
        let mut payload = Payload::new();
        for key in RESERVED_KEYS {
            assert!(matches!(
                payload.insert(key, "x"),
                Err(Error::EncodingError(_))
            ));
        }
        assert!(matches!(
            payload.insert("", "x"),
            Err(Error::EncodingError(_))
        ));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_bytes() {
        let mut payload = Payload::new();
        assert!(matches!(
            payload.insert_bytes("blob", &[0xff, 0xfe, 0x00]),
            Err(Error::EncodingError(_))
        ));

        payload.insert_bytes("text", b"hello").unwrap();
        payload.insert_base64("blob", &[0xff, 0xfe, 0x00]).unwrap();
        assert_eq!(payload.get("text"), Some(&PayloadValue::from("hello")));
        assert_eq!(payload.get("blob"), Some(&PayloadValue::from("//4A")));
    }

    #[test]
    fn test_from_json_object() {
        let map = json!({"keyid": "k", "length": 32, "wrapped": false});
        let payload = Payload::try_from(map.as_object().unwrap()).unwrap();
        assert_eq!(payload.get("length"), Some(&PayloadValue::Int(32)));
        assert_eq!(payload.get("wrapped"), Some(&PayloadValue::Bool(false)));

        for bad in [
            json!({"a": null}),
            json!({"a": 1.5}),
            json!({"a": [1]}),
            json!({"a": {"b": 1}}),
            json!({"sign": "x"}),
        ] {
            assert!(matches!(
                Payload::try_from(bad.as_object().unwrap()),
                Err(Error::EncodingError(_))
            ));
        }
    }

    #[test]
    fn test_canonicalize_sorted_and_length_prefixed() {
        let b = PayloadValue::from("2");
        let a = PayloadValue::from("1");
        assert_eq!(canonicalize([("b", &b), ("a", &a)]), "1:as1:11:bs1:2");

        // `{"a":"1","b":"2"}` vs `{"a":"1b":"2"}` style collisions.
        let joined = PayloadValue::from("1b2");
        assert_ne!(
            canonicalize([("a", &a), ("b", &b)]),
            canonicalize([("a", &joined)])
        );

        let int = PayloadValue::Int(1);
        assert_ne!(canonicalize([("a", &a)]), canonicalize([("a", &int)]));
    }

    #[test]
    fn test_canonicalize_counts_bytes() {
        let v = PayloadValue::from("é");
        assert_eq!(canonicalize([("k", &v)]), "1:ks2:é");
    }
}
