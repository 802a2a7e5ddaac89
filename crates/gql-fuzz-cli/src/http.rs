//! Blocking HTTP transport.

use anyhow::{anyhow, Context, Result};
use gql_fuzz::{Exchange, Transport, TransportError, INTROSPECTION_QUERY};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Posts GraphQL documents to one endpoint.
pub struct HttpTransport {
    endpoint: String,
    agent: ureq::Agent,
    auth: Option<String>,
}

impl HttpTransport {
    /// Default request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    /// Default connect timeout in seconds.
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    pub fn new(endpoint: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            agent: Self::build_agent(timeout, connect_timeout),
            auth: None,
        }
    }

    /// Send `auth` as the `Authorization` header on every request.
    pub fn with_auth(mut self, auth: Option<String>) -> Self {
        self.auth = auth;
        self
    }

    fn build_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(timeout)
            .timeout_connect(connect_timeout)
            .build()
    }

    /// POST `body`, returning the status and raw response text.
    ///
    /// Non-2xx statuses are not errors here: GraphQL servers put error
    /// details in the body of 4xx/5xx responses too.
    fn post(&self, body: &Value) -> Result<(u16, String), TransportError> {
        let mut request = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");
        if let Some(auth) = &self.auth {
            request = request.set("Authorization", auth);
        }

        let response = match request.send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(TransportError::Request(err.to_string())),
        };
        let status = response.status();
        let text = response
            .into_string()
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        debug!(status, bytes = text.len(), "response received");
        Ok((status, text))
    }

    /// Run the introspection query and return the whole response body.
    pub fn introspect(&self) -> Result<Value> {
        let (status, text) = self
            .post(&json!({ "query": INTROSPECTION_QUERY }))
            .map_err(|e| anyhow!("introspection request to {} failed: {}", self.endpoint, e))?;
        let body: Value = serde_json::from_str(&text)
            .with_context(|| format!("introspection response (HTTP {status}) is not JSON"))?;
        if body.get("data").and_then(|d| d.get("__schema")).is_none() {
            return Err(anyhow!(
                "introspection response (HTTP {status}) has no schema: {}",
                body.get("errors").unwrap_or(&Value::Null)
            ));
        }
        Ok(body)
    }
}

impl Transport for HttpTransport {
    fn send(&self, payload: &str) -> Result<Exchange, TransportError> {
        let (status, text) = self.post(&json!({ "query": payload }))?;
        Ok(Exchange::from_body(Some(status), &text))
    }
}
