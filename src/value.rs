//! Native values exchanged through calls.
//!
//! [`Value`] is what handlers receive and return. It mirrors JSON with two
//! additions: [`Value::Function`] carries a live [`Callable`] and
//! [`Value::Unknown`] carries an opaque payload the codec does not descend into.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed, sendable future used across the call surface.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future returned by every call, local or remote.
pub type CallFuture = BoxFuture<'static, Result<Value>>;

type CallFn = dyn Fn(Vec<Value>) -> CallFuture + Send + Sync;

/// A type-erased asynchronous function.
///
/// Cloning is cheap and clones share the same underlying function. A callable
/// placed inside a call argument or result is exported to the remote peer,
/// which receives a proxy that calls back into it.
#[derive(Clone)]
pub struct Callable {
    func: Arc<CallFn>,
}

impl Callable {
    // ---

    /// Wrap an async closure taking the raw argument list.
    ///
    /// Any error type with a `Display` impl may be returned; its rendering is
    /// what the remote caller observes.
    pub fn new<F, Fut, R, E>(func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Into<Value>,
        E: fmt::Display,
    {
        // ---
        Self::from_fn(move |args| {
            let fut = func(args);
            Box::pin(async move {
                fut.await
                    .map(Into::<Value>::into)
                    .map_err(|e| Error::Handler(e.to_string()))
            })
        })
    }

    /// Wrap an async closure taking typed arguments.
    ///
    /// Argument conversion failures are reported as handler errors.
    ///
    /// ```
    /// use duplex_rpc::{Callable, Error};
    ///
    /// let add = Callable::typed(|(a, b): (i64, i64)| async move { Ok::<_, Error>(a + b) });
    /// # let _ = add;
    /// ```
    pub fn typed<A, F, Fut, R, E>(func: F) -> Self
    where
        A: FromArgs,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Into<Value>,
        E: fmt::Display,
    {
        // ---
        Self::from_fn(move |args| match A::from_args(args) {
            Ok(args) => {
                let fut = func(args);
                Box::pin(async move {
                    fut.await
                        .map(Into::<Value>::into)
                        .map_err(|e| Error::Handler(e.to_string()))
                })
            }
            Err(e) => Box::pin(async move { Err::<Value, _>(Error::Handler(e.to_string())) }),
        })
    }

    pub(crate) fn from_fn<F>(func: F) -> Self
    where
        F: Fn(Vec<Value>) -> CallFuture + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Invoke the function.
    ///
    /// Invocation is eager: a remote proxy sends its request before this
    /// returns, so dropping the future only discards the reply.
    pub fn call(&self, args: impl IntoArgs) -> CallFuture {
        // ---
        (self.func)(args.into_args())
    }

    /// True when both handles share the same underlying function.
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable(..)")
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// A dynamically typed call argument or result.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Function(Callable),
    /// Opaque payload. Lossy by contract: it crosses the wire as-is and is
    /// never interpreted, so it is not guaranteed to mean the same thing on the
    /// other side.
    Unknown(serde_json::Value),
}

impl Value {
    // ---

    /// Build an object from key/value pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Convert any serializable type, via its JSON form.
    pub fn from_serde<T: Serialize>(value: &T) -> Result<Self> {
        // ---
        Ok(serde_json::to_value(value)?.into())
    }

    /// Convert into any deserializable type, via its JSON form.
    ///
    /// Fails if the value contains a function.
    pub fn into_serde<T: DeserializeOwned>(self) -> Result<T> {
        // ---
        let json = self.to_json().ok_or(Error::TypeMismatch {
            expected: "plain data",
            found: "function",
        })?;
        Ok(serde_json::from_value(json)?)
    }

    /// JSON form of this value, or `None` if it contains a function.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        // ---
        Some(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Option<_>>()?,
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Some((k.clone(), v.to_json()?)))
                    .collect::<Option<_>>()?,
            ),
            Value::Function(_) => return None,
            Value::Unknown(json) => json.clone(),
        })
    }

    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Unknown(_) => "unknown",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Callable> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Look up a key of an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(Number::from(n))
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::from(f64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl From<Callable> for Value {
    fn from(f: Callable) -> Self {
        Value::Function(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// Conversion out of a [`Value`], used for typed results and arguments.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &'static str, value: &Value) -> Result<T> {
    Err(Error::TypeMismatch {
        expected,
        found: value.kind(),
    })
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(_: Value) -> Result<Self> {
        Ok(())
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value.as_bool() {
            Some(b) => Ok(b),
            None => mismatch("bool", &value),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value.as_i64() {
            Some(n) => Ok(n),
            None => mismatch("integer", &value),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self> {
        match value.as_u64() {
            Some(n) => Ok(n),
            None => mismatch("unsigned integer", &value),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value.as_f64() {
            Some(n) => Ok(n),
            None => mismatch("number", &value),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => mismatch("string", &other),
        }
    }
}

impl FromValue for Callable {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Function(f) => Ok(f),
            other => mismatch("function", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch("array", &other),
        }
    }
}

/// Typed wrapper converting through serde.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> FromValue for Json<T> {
    fn from_value(value: Value) -> Result<Self> {
        value.into_serde().map(Json)
    }
}

/// Conversion into a positional argument list.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Value>;
}

impl IntoArgs for Vec<Value> {
    fn into_args(self) -> Vec<Value> {
        self
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<Value> {
        Vec::new()
    }
}

/// Conversion from a positional argument list.
///
/// Missing trailing arguments read as `Null`, so optional parameters can be
/// declared as `Option<T>`.
pub trait FromArgs: Sized {
    fn from_args(args: Vec<Value>) -> Result<Self>;
}

impl FromArgs for Vec<Value> {
    fn from_args(args: Vec<Value>) -> Result<Self> {
        Ok(args)
    }
}

impl FromArgs for () {
    fn from_args(_: Vec<Value>) -> Result<Self> {
        Ok(())
    }
}

macro_rules! tuple_args {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }

        impl<$($name: FromValue),+> FromArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn from_args(args: Vec<Value>) -> Result<Self> {
                let mut args = args.into_iter();
                $(let $name = $name::from_value(args.next().unwrap_or_default())?;)+
                Ok(($($name,)+))
            }
        }
    };
}

tuple_args!(A);
tuple_args!(A, B);
tuple_args!(A, B, C);
tuple_args!(A, B, C, D);
tuple_args!(A, B, C, D, E);

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_non_finite_float_is_null() {
        // ---
        assert_eq!(Value::from(f64::NAN), Value::Null);
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
    }

    #[test]
    fn test_serde_bridge() {
        // ---
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Reading {
            sensor: String,
            celsius: f64,
        }

        let reading = Reading {
            sensor: "t1".into(),
            celsius: 21.5,
        };
        let value = Value::from_serde(&reading).unwrap();
        assert_eq!(value.get("sensor").and_then(Value::as_str), Some("t1"));

        let back: Reading = value.into_serde().unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn test_into_serde_rejects_functions() {
        // ---
        let f = Callable::new(|_| async { Ok::<_, Error>(()) });
        let value = Value::object([("cb", Value::from(f))]);
        assert!(matches!(
            value.into_serde::<serde_json::Value>(),
            Err(Error::TypeMismatch { found: "function", .. })
        ));
    }

    #[test]
    fn test_from_args_pads_missing_with_null() {
        // ---
        let (a, b): (i64, Option<String>) = FromArgs::from_args(vec![Value::from(3)]).unwrap();
        assert_eq!(a, 3);
        assert_eq!(b, None);

        let err = <(i64,)>::from_args(vec![Value::from("x")]).unwrap_err();
        assert_eq!(err.to_string(), "type mismatch: expected integer, found string");
    }

    #[test]
    fn test_json_conversion() {
        // ---
        let value = Value::from(json!({ "a": [1, true, null] }));
        assert_eq!(value.to_json(), Some(json!({ "a": [1, true, null] })));
    }

    #[tokio::test]
    async fn test_typed_callable_reports_bad_arguments() {
        // ---
        let add = Callable::typed(|(a, b): (i64, i64)| async move { Ok::<_, Error>(a + b) });

        let sum = add.call((2, 3)).await.unwrap();
        assert_eq!(sum.as_i64(), Some(5));

        let err = add.call(("two", 3)).await.unwrap_err();
        assert!(matches!(err, Error::Handler(_)));
    }
}
