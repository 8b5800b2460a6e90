//! Request and response types passed through the interceptor chain.

use std::collections::HashMap;

use serde_json::Value;

/// Header-style metadata: name to an ordered list of values.
///
/// Names are case-insensitive; they are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: HashMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `name`, keeping earlier values.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Replace all values stored under `name`.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(name.to_ascii_lowercase(), vec![value.into()]);
    }

    /// All values for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The first value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (name, value) in iter {
            metadata.append(name.as_ref(), value);
        }
        metadata
    }
}

/// An inbound call to a backend service method.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub service: String,
    pub method: String,
    /// Decoded call arguments
    pub input: Value,
    pub metadata: Metadata,
    /// Client address from the connection, possibly with a port
    pub remote_addr: String,
}

impl Request {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            input: Value::Null,
            metadata: Metadata::new(),
            remote_addr: String::new(),
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.metadata.append(name, value);
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }
}

/// A backend's answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub output: Value,
    pub metadata: Metadata,
}

impl Response {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            metadata: Metadata::new(),
        }
    }
}
