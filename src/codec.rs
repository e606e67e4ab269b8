//! Value codec.
//!
//! Converts call arguments and results between [`Value`] and the wire tree
//! [`Serialized`]. Both directions are total: anything the codec cannot
//! represent faithfully degrades to the `unknown` tag instead of failing.

use crate::protocol::{Serialized, Token};
use crate::{Callable, Value};

/// Registers local callables so the remote peer can call them back.
pub(crate) trait Exporter {
    /// Store `callable` as a persistent entry and return its token.
    fn export(&mut self, callable: &Callable) -> Token;
}

/// Turns a received function token into something callable locally.
pub(crate) trait Importer {
    /// Build a proxy that issues a request for `token` on each call.
    fn import(&self, token: Token) -> Callable;
}

/// Convert a value into its wire tree, exporting every callable it contains.
pub(crate) fn serialize(value: &Value, exporter: &mut dyn Exporter) -> Serialized {
    // ---
    match value {
        Value::Null => Serialized::Raw(serde_json::Value::Null),
        Value::Bool(b) => Serialized::Raw(serde_json::Value::Bool(*b)),
        Value::Number(n) => Serialized::Raw(serde_json::Value::Number(n.clone())),
        Value::String(s) => Serialized::Raw(serde_json::Value::String(s.clone())),
        Value::Array(items) => Serialized::Array(
            items
                .iter()
                .map(|item| serialize(item, exporter))
                .collect(),
        ),
        Value::Object(map) => Serialized::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), serialize(item, exporter)))
                .collect(),
        ),
        Value::Function(callable) => Serialized::Function(exporter.export(callable)),
        Value::Unknown(json) => Serialized::Unknown(json.clone()),
    }
}

/// Rebuild a value from its wire tree, turning function tokens into proxies.
pub(crate) fn deserialize(serialized: Serialized, importer: &dyn Importer) -> Value {
    // ---
    match serialized {
        Serialized::Raw(json) => match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            // Not a scalar; keep it opaque rather than guess at its shape.
            other => Value::Unknown(other),
        },
        Serialized::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| deserialize(item, importer))
                .collect(),
        ),
        Serialized::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, deserialize(item, importer)))
                .collect(),
        ),
        Serialized::Function(token) => Value::Function(importer.import(token)),
        Serialized::Unknown(json) => Value::Unknown(json),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::protocol::{CounterIdGenerator, IdGenerator};
    use crate::Error;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingExporter {
        ids: CounterIdGenerator,
        exported: Vec<(Token, Callable)>,
    }

    impl Exporter for RecordingExporter {
        fn export(&mut self, callable: &Callable) -> Token {
            let token = self.ids.generate();
            self.exported.push((token.clone(), callable.clone()));
            token
        }
    }

    struct EchoImporter;

    impl Importer for EchoImporter {
        fn import(&self, token: Token) -> Callable {
            Callable::new(move |_| {
                let token = token.clone();
                async move { Ok::<_, Error>(token.to_string()) }
            })
        }
    }

    fn round_trip(value: &Value) -> Value {
        let mut exporter = RecordingExporter::default();
        deserialize(serialize(value, &mut exporter), &EchoImporter)
    }

    #[test]
    fn test_plain_values_round_trip() {
        // ---
        let values = vec![
            Value::Null,
            Value::from(true),
            Value::from(-17),
            Value::from(2.25),
            Value::from("hello"),
            Value::Array(vec![]),
            Value::from(json!({ "nested": { "list": [1, "two", null, [false]] }, "empty": {} })),
        ];

        for value in values {
            assert_eq!(round_trip(&value), value);
        }
    }

    #[test]
    fn test_object_keys_preserved() {
        // ---
        let value = Value::object([("b", 2), ("a", 1), ("weird key!", 3)]);
        let mut exporter = RecordingExporter::default();

        let Serialized::Object(map) = serialize(&value, &mut exporter) else {
            panic!("expected object");
        };
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "weird key!"]);
    }

    #[test]
    fn test_functions_are_exported_by_token() {
        // ---
        let f = Callable::new(|_| async { Ok::<_, Error>(()) });
        let g = Callable::new(|_| async { Ok::<_, Error>(()) });
        let value = Value::Array(vec![Value::from(f.clone()), Value::object([("g", g.clone())])]);

        let mut exporter = RecordingExporter::default();
        let serialized = serialize(&value, &mut exporter);

        let mut inner = BTreeMap::new();
        inner.insert("g".to_string(), Serialized::Function(Token::from("1")));
        assert_eq!(
            serialized,
            Serialized::Array(vec![
                Serialized::Function(Token::from("0")),
                Serialized::Object(inner),
            ])
        );

        assert_eq!(exporter.exported.len(), 2);
        assert!(exporter.exported[0].1.ptr_eq(&f));
        assert!(exporter.exported[1].1.ptr_eq(&g));
    }

    #[tokio::test]
    async fn test_function_tokens_become_proxies() {
        // ---
        let value = deserialize(Serialized::Function(Token::from("12")), &EchoImporter);
        let proxy = value.as_function().expect("function").clone();

        let answer = proxy.call(()).await.unwrap();
        assert_eq!(answer.as_str(), Some("12"));
    }

    #[test]
    fn test_unknown_is_opaque() {
        // ---
        let opaque = json!({ "kind": "raw", "data": 1 });
        let value = round_trip(&Value::Unknown(opaque.clone()));
        assert_eq!(value, Value::Unknown(opaque));

        // A non-scalar smuggled into `raw` is not descended into.
        let value = deserialize(Serialized::Raw(json!([1, 2])), &EchoImporter);
        assert_eq!(value, Value::Unknown(json!([1, 2])));
    }
}
