//! Uplink envelope as published by the device platform.
//!
//! Only `uplink_message.decoded_payload.bytes` is read; every other field of
//! the envelope is ignored.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct UplinkEnvelope {
    pub uplink_message: UplinkMessage,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct UplinkMessage {
    pub decoded_payload: DecodedPayload,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct DecodedPayload {
    #[serde(deserialize_with = "payload_bytes")]
    pub bytes: Vec<u8>,
}

impl UplinkEnvelope {
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.uplink_message.decoded_payload.bytes
    }
}

/// Accepts a standard base64 string, an array of byte values, or `null`.
fn payload_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(PayloadBytesVisitor)
}

struct PayloadBytesVisitor;

impl<'de> Visitor<'de> for PayloadBytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a base64 string or an array of bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        STANDARD
            .decode(v)
            .map_err(|e| E::custom(format!("invalid base64 in bytes: {}", e)))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(bytes)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_bytes() {
        let envelope = UplinkEnvelope::from_slice(
            br#"{"uplink_message":{"decoded_payload":{"bytes":"aGVsbG8="}}}"#,
        )
        .unwrap();
        assert_eq!(envelope.into_bytes(), b"hello");
    }

    #[test]
    fn accepts_byte_arrays_and_null() {
        let envelope = UplinkEnvelope::from_slice(
            br#"{"uplink_message":{"decoded_payload":{"bytes":[104,105]}}}"#,
        )
        .unwrap();
        assert_eq!(envelope.into_bytes(), b"hi");

        let envelope =
            UplinkEnvelope::from_slice(br#"{"uplink_message":{"decoded_payload":{"bytes":null}}}"#)
                .unwrap();
        assert!(envelope.into_bytes().is_empty());
    }

    #[test]
    fn ignores_unrelated_fields() {
        let payload = br#"{
            "end_device_ids": {"device_id": "eui-70b3d57ed005d1a2"},
            "received_at": "2024-05-01T10:00:00Z",
            "uplink_message": {
                "f_port": 1,
                "frm_payload": "AQI=",
                "decoded_payload": {"bytes": "MjEuNUM=", "temperature": 21.5}
            }
        }"#;
        let envelope = UplinkEnvelope::from_slice(payload).unwrap();
        assert_eq!(envelope.into_bytes(), b"21.5C");
    }

    #[test]
    fn rejects_missing_fields_and_bad_values() {
        for payload in [
            &br#"{}"#[..],
            br#"{"uplink_message":{}}"#,
            br#"{"uplink_message":{"decoded_payload":{}}}"#,
            br#"{"uplink_message":{"decoded_payload":{"bytes":"not base64!"}}}"#,
            br#"{"uplink_message":{"decoded_payload":{"bytes":[256]}}}"#,
            br#"{"uplink_message":{"decoded_payload":{"bytes":42}}}"#,
            br#"{not json"#,
        ] {
            assert!(
                UplinkEnvelope::from_slice(payload).is_err(),
                "expected failure for {}",
                String::from_utf8_lossy(payload)
            );
        }
    }
}
