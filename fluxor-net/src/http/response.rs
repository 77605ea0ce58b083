// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;

// Layer 3: Internal module imports
use super::REQUEST_ID_HEADER;
use fluxor_rt::util::RequestId;

/// Response produced by handlers and middleware.
///
/// # Example
///
/// ```rust
/// use fluxor_net::http::HttpResponse;
/// use serde_json::json;
///
/// let response = HttpResponse::ok_json(&json!({"status": "ok"}));
/// assert_eq!(response.status().as_u16(), 200);
/// ```
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl HttpResponse {
    /// Empty response with the given status.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Plain-text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: Bytes::from(body.into()),
        }
    }

    /// JSON response with an arbitrary status.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        Self {
            status,
            headers: vec![(
                "content-type".to_string(),
                "application/json".to_string(),
            )],
            body: Bytes::from(body),
        }
    }

    /// `200 OK` JSON response.
    pub fn ok_json<T: Serialize>(value: &T) -> Self {
        Self::json(StatusCode::OK, value)
    }

    /// `404 Not Found` with a JSON error body.
    pub fn not_found() -> Self {
        Self::json(
            StatusCode::NOT_FOUND,
            &serde_json::json!({"error": "not found"}),
        )
    }

    /// `400 Bad Request` with a JSON error body.
    pub fn bad_request(reason: &str) -> Self {
        Self::json(
            StatusCode::BAD_REQUEST,
            &serde_json::json!({"error": reason}),
        )
    }

    /// `503 Service Unavailable` with a JSON error body.
    pub fn service_unavailable(reason: &str) -> Self {
        Self::json(
            StatusCode::SERVICE_UNAVAILABLE,
            &serde_json::json!({"error": reason}),
        )
    }

    /// `500 Internal Server Error` with a generic JSON body.
    pub fn internal_error() -> Self {
        Self::json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &serde_json::json!({"error": "internal server error"}),
        )
    }

    /// Attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Convert into a hyper response, stamping the request id header.
    pub(crate) fn into_hyper(self, request_id: &RequestId) -> Response<Full<Bytes>> {
        let mut builder = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder.header(REQUEST_ID_HEADER, request_id.as_str());
        match builder.body(Full::new(self.body)) {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(%error, "failed to build response; substituting 500");
                let mut response =
                    Response::new(Full::new(Bytes::from_static(b"internal server error")));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_json() {
        let response = HttpResponse::ok_json(&json!({"a": 1}));
        assert_eq!(response.status(), StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn test_error_helpers() {
        assert_eq!(HttpResponse::not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            HttpResponse::bad_request("nope").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HttpResponse::service_unavailable("busy").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            HttpResponse::internal_error().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_into_hyper_stamps_request_id() {
        let request_id = RequestId::from_string("req-1");
        let response = HttpResponse::text(StatusCode::OK, "hi").into_hyper(&request_id);
        assert_eq!(
            response
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("req-1")
        );
    }
}
