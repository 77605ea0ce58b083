// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;

// Layer 3: Internal module imports
use crate::errors::NetError;
use fluxor_rt::context::FluxorContext;
use fluxor_rt::util::RequestId;

/// Captured `:param` path segments.
pub type Params = HashMap<String, String>;

/// Per-request state flowing through the middleware chain to the handler.
///
/// Carries the parsed request line, captured path params, the body bytes, a
/// free-form data map for inter-middleware hand-off, and the
/// [`FluxorContext`] (already tagged with the request id, so bus traffic
/// sent from the handler is correlated).
pub struct RequestContext {
    method: Method,
    path: String,
    query: String,
    params: Params,
    headers: HeaderMap,
    body: Bytes,
    data: HashMap<String, Value>,
    ctx: FluxorContext,
    request_id: RequestId,
}

impl RequestContext {
    /// Assemble a request context; the server does this per request, and
    /// adapters/tests may construct one directly.
    pub fn new(
        method: Method,
        path: String,
        query: String,
        headers: HeaderMap,
        body: Bytes,
        ctx: FluxorContext,
        request_id: RequestId,
    ) -> Self {
        Self {
            method,
            path,
            query,
            params: Params::new(),
            headers,
            body,
            data: HashMap::new(),
            ctx,
            request_id,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path (no query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string (may be empty).
    pub fn query(&self) -> &str {
        &self.query
    }

    /// A captured path parameter (`:id` -> `param("id")`).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// All captured path parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// A request header value, when it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// All request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, NetError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Read a value stashed by an earlier middleware.
    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Stash a value for later middleware or the handler.
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Runtime services, tagged with this request's id.
    pub fn context(&self) -> &FluxorContext {
        &self.ctx
    }

    /// The request correlation id.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use fluxor_rt::bus::LocalBus;
    use fluxor_rt::config::ConfigMap;
    use fluxor_rt::runtime::WeakVertx;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn test_request(body: &str) -> RequestContext {
        let ctx = FluxorContext::new(
            CancellationToken::new(),
            Arc::new(LocalBus::new()),
            WeakVertx::detached(),
            ConfigMap::empty(),
        );
        RequestContext::new(
            Method::POST,
            "/orders/42".to_string(),
            "verbose=1".to_string(),
            HeaderMap::new(),
            Bytes::from(body.to_string()),
            ctx,
            RequestId::from_string("req-1"),
        )
    }

    #[test]
    fn test_basic_accessors() {
        let request = test_request("{}");
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.path(), "/orders/42");
        assert_eq!(request.query(), "verbose=1");
        assert_eq!(request.request_id().as_str(), "req-1");
    }

    #[test]
    fn test_params() {
        let mut request = test_request("{}");
        let mut params = Params::new();
        params.insert("id".to_string(), "42".to_string());
        request.set_params(params);

        assert_eq!(request.param("id"), Some("42"));
        assert_eq!(request.param("missing"), None);
    }

    #[test]
    fn test_json_body() {
        let request = test_request(r#"{"amount": 150}"#);
        let value: Value = request.json().unwrap();
        assert_eq!(value["amount"], 150);

        let bad = test_request("not json");
        assert!(bad.json::<Value>().is_err());
    }

    #[test]
    fn test_data_map() {
        let mut request = test_request("{}");
        request.set_data("auth.user", json!("alice"));
        assert_eq!(request.get_data("auth.user"), Some(&json!("alice")));
        assert!(request.get_data("other").is_none());
    }
}
