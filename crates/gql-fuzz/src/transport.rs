//! The request boundary between the engine and a GraphQL endpoint.

use crate::error::TransportError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Position inside the sent payload, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Value>,
}

/// Parsed body of a GraphQL response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl GraphQLResponse {
    /// Errors, if the server reported any.
    pub fn errors(&self) -> &[GraphQLError] {
        self.errors.as_deref().unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

/// What came back for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// HTTP status, when the transport has one.
    pub status: Option<u16>,
    /// None when the body was missing or was not a GraphQL response object.
    pub response: Option<GraphQLResponse>,
}

impl Exchange {
    pub fn from_value(status: Option<u16>, body: Value) -> Self {
        let response = match body {
            Value::Object(_) => serde_json::from_value(body).ok(),
            _ => None,
        };
        Self { status, response }
    }

    pub fn from_body(status: Option<u16>, body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(status, value),
            Err(_) => Self {
                status,
                response: None,
            },
        }
    }
}

/// Sends one GraphQL document and returns whatever came back.
///
/// Implementations block until the server answers or their own timeout
/// expires. The endpoint is part of the implementation, not of the call.
pub trait Transport {
    fn send(&self, payload: &str) -> Result<Exchange, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&str) -> Result<Exchange, TransportError>,
{
    fn send(&self, payload: &str) -> Result<Exchange, TransportError> {
        self(payload)
    }
}

/// Replays queued exchanges in order and remembers every payload it was given.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Exchange, TransportError>>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a 200 response with the given JSON body.
    pub fn push_json(&self, body: Value) -> &Self {
        self.push_exchange(Exchange::from_value(Some(200), body))
    }

    pub fn push_exchange(&self, exchange: Exchange) -> &Self {
        self.script.lock().push_back(Ok(exchange));
        self
    }

    pub fn push_error(&self, error: TransportError) -> &Self {
        self.script.lock().push_back(Err(error));
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, payload: &str) -> Result<Exchange, TransportError> {
        self.sent.lock().push(payload.to_string());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("script exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_error_response() {
        let exchange = Exchange::from_value(
            Some(200),
            json!({
                "errors": [{"message": "boom", "locations": [{"line": 4, "column": 5}]}]
            }),
        );
        let response = exchange.response.unwrap();
        assert!(response.has_errors());
        assert_eq!(response.errors()[0].locations, vec![Location { line: 4, column: 5 }]);
        assert!(response.data.is_none());
    }

    #[test]
    fn test_non_object_body_has_no_response() {
        assert!(Exchange::from_value(Some(200), json!([1, 2])).response.is_none());
        assert!(Exchange::from_body(Some(502), "<html>bad gateway</html>").response.is_none());
    }

    #[test]
    fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(json!({"data": {"a": 1}}))
            .push_error(TransportError::Request("timeout".into()));

        assert!(transport.send("query { a }").is_ok());
        assert!(transport.send("query { b }").is_err());
        assert!(transport.send("query { c }").is_err());
        assert_eq!(transport.sent().len(), 3);
        assert_eq!(transport.remaining(), 0);
    }

    #[test]
    fn test_closure_transport() {
        let transport = |payload: &str| {
            Ok::<_, TransportError>(Exchange::from_value(
                Some(200),
                json!({"data": {"echo": payload}}),
            ))
        };
        let exchange = transport.send("query { echo }").unwrap();
        assert_eq!(
            exchange.response.unwrap().data.unwrap()["echo"],
            json!("query { echo }")
        );
    }
}
