//! Wire encodings for protocol bodies.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Body encoding, selected by the HTTP content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// `application/json`, the default.
    #[default]
    Json,
    /// `application/cbor`.
    Cbor,
}

impl WireFormat {
    /// Content type sent with bodies in this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Json => "application/json",
            WireFormat::Cbor => "application/cbor",
        }
    }

    /// Selects a format from a `Content-Type` header value.
    ///
    /// Parameters such as `; charset=utf-8` are ignored.
    pub fn from_content_type(value: &str) -> ProtocolResult<Self> {
        let mime = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/json" | "" => Ok(WireFormat::Json),
            "application/cbor" => Ok(WireFormat::Cbor),
            _ => Err(ProtocolError::UnsupportedContentType(value.to_string())),
        }
    }

    /// Encodes a message.
    pub fn encode<T: Serialize>(&self, message: &T) -> ProtocolResult<Vec<u8>> {
        match self {
            WireFormat::Json => Ok(serde_json::to_vec(message)?),
            WireFormat::Cbor => {
                let mut out = Vec::new();
                ciborium::into_writer(message, &mut out)
                    .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
                Ok(out)
            }
        }
    }

    /// Decodes a message.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> ProtocolResult<T> {
        match self {
            WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
            WireFormat::Cbor => {
                ciborium::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChangeFeed;
    use replidb_core::{DocId, Document};

    fn sample_feed() -> ChangeFeed {
        let mut doc = Document::new()
            .with("name", "ada")
            .with("tags", serde_json::json!(["a", "b"]));
        doc.set_id(DocId::from_value(17));
        ChangeFeed::from_parts(vec![doc], [DocId::from_value(3)].into())
            .with_originator("replica-1")
            .with_sequence(1_700_000_000_000)
    }

    #[test]
    fn content_types() {
        assert_eq!(
            WireFormat::from_content_type("application/json; charset=utf-8").unwrap(),
            WireFormat::Json
        );
        assert_eq!(
            WireFormat::from_content_type("Application/CBOR").unwrap(),
            WireFormat::Cbor
        );
        assert_eq!(WireFormat::from_content_type("").unwrap(), WireFormat::Json);
        assert!(matches!(
            WireFormat::from_content_type("text/xml"),
            Err(ProtocolError::UnsupportedContentType(_))
        ));
    }

    #[test]
    fn feed_through_both_formats() {
        let feed = sample_feed();
        for format in [WireFormat::Json, WireFormat::Cbor] {
            let bytes = format.encode(&feed).unwrap();
            let back: ChangeFeed = format.decode(&bytes).unwrap();
            assert_eq!(back, feed, "{format:?}");
        }
    }

    #[test]
    fn json_uses_camel_case() {
        let bytes = WireFormat::Json.encode(&sample_feed()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"sequenceNumber\":1700000000000"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            WireFormat::Json.decode::<ChangeFeed>(b"{not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            WireFormat::Cbor.decode::<ChangeFeed>(&[0xff, 0x00]),
            Err(ProtocolError::CborDecode(_))
        ));
    }
}
