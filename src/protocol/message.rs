use crate::protocol::Token;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire-safe tagged tree produced by the value codec.
///
/// Encoded as `{"kind": <tag>, "data": <payload>}`. Trees are finite and
/// acyclic; live functions travel only as tokens. A `raw` or `unknown` node
/// without `data` is an absence marker and decodes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Serialized {
    /// A scalar: null, boolean, number or string.
    Raw(serde_json::Value),
    /// Ordered sequence.
    Array(Vec<Serialized>),
    /// String-keyed structure; key order carries no meaning.
    Object(BTreeMap<String, Serialized>),
    /// Token of a callable held by the sending peer.
    Function(Token),
    /// Opaque payload, carried best-effort and not guaranteed to round-trip.
    Unknown(serde_json::Value),
}

impl<'de> Deserialize<'de> for Serialized {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // ---
        #[derive(Deserialize)]
        #[serde(rename_all = "lowercase")]
        enum Kind {
            Raw,
            Array,
            Object,
            Function,
            Unknown,
        }

        #[derive(Deserialize)]
        struct Node {
            kind: Kind,
            #[serde(default)]
            data: serde_json::Value,
        }

        fn nested<T: DeserializeOwned, E: de::Error>(data: serde_json::Value) -> Result<T, E> {
            serde_json::from_value(data).map_err(E::custom)
        }

        let Node { kind, data } = Node::deserialize(deserializer)?;
        Ok(match kind {
            Kind::Raw => Serialized::Raw(data),
            Kind::Unknown => Serialized::Unknown(data),
            Kind::Array => Serialized::Array(nested(data)?),
            Kind::Object => Serialized::Object(nested(data)?),
            Kind::Function => Serialized::Function(nested(data)?),
        })
    }
}

/// A single protocol message.
///
/// Exactly one `Response` or `Error` is sent per `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Message {
    /// Invoke a named handler or an exported callback on the receiving peer.
    Request {
        #[serde(rename = "functionId")]
        function_id: String,
        #[serde(rename = "requestId")]
        request_id: Token,
        args: Vec<Serialized>,
    },

    /// Successful completion of a request.
    Response {
        #[serde(rename = "requestId")]
        request_id: Token,
        data: Serialized,
    },

    /// Failed completion of a request, carrying the stringified cause.
    Error {
        #[serde(rename = "requestId")]
        request_id: Token,
        error: String,
    },
}

impl Message {
    /// Encode as a single JSON text payload.
    pub fn encode(&self) -> crate::Result<String> {
        // ---
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one JSON text payload.
    pub fn decode(payload: &str) -> crate::Result<Self> {
        // ---
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        // ---
        let msg = Message::Request {
            function_id: "add".into(),
            request_id: Token::from("0"),
            args: vec![Serialized::Raw(json!(1)), Serialized::Function(Token::from("1"))],
        };

        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "request",
                "functionId": "add",
                "requestId": "0",
                "args": [
                    { "kind": "raw", "data": 1 },
                    { "kind": "function", "data": "1" }
                ]
            })
        );
    }

    #[test]
    fn test_response_and_error_wire_shape() {
        // ---
        let resp = Message::Response {
            request_id: Token::from("7"),
            data: Serialized::Array(vec![Serialized::Raw(json!("x"))]),
        };
        let value: serde_json::Value = serde_json::from_str(&resp.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "response",
                "requestId": "7",
                "data": { "kind": "array", "data": [{ "kind": "raw", "data": "x" }] }
            })
        );

        let err = Message::Error {
            request_id: Token::from("8"),
            error: "boom".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&err.encode().unwrap()).unwrap();
        assert_eq!(value, json!({ "kind": "error", "requestId": "8", "error": "boom" }));
    }

    #[test]
    fn test_decode_object_payload() {
        // ---
        let text = r#"{"kind":"response","requestId":"3","data":{"kind":"object","data":{"a":{"kind":"raw","data":null}}}}"#;
        let msg = Message::decode(text).unwrap();

        let mut expected = BTreeMap::new();
        expected.insert("a".to_string(), Serialized::Raw(serde_json::Value::Null));
        assert_eq!(
            msg,
            Message::Response {
                request_id: Token::from("3"),
                data: Serialized::Object(expected),
            }
        );
    }

    #[test]
    fn test_missing_data_is_an_absence_marker() {
        // ---
        let msg = Message::decode(r#"{"kind":"response","requestId":"0","data":{"kind":"raw"}}"#).unwrap();
        assert_eq!(
            msg,
            Message::Response {
                request_id: Token::from("0"),
                data: Serialized::Raw(serde_json::Value::Null),
            }
        );

        let nested: Serialized =
            serde_json::from_str(r#"{"kind":"array","data":[{"kind":"raw"},{"kind":"unknown"}]}"#).unwrap();
        assert_eq!(
            nested,
            Serialized::Array(vec![
                Serialized::Raw(serde_json::Value::Null),
                Serialized::Unknown(serde_json::Value::Null),
            ])
        );

        // Only raw and unknown may omit their payload.
        assert!(serde_json::from_str::<Serialized>(r#"{"kind":"function"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        // ---
        assert!(Message::decode(r#"{"kind":"notify","requestId":"1"}"#).is_err());
        assert!(Message::decode("not json").is_err());
        assert!(serde_json::from_str::<Serialized>(r#"{"kind":"bogus","data":1}"#).is_err());
    }
}
