// Layer 1: Standard library imports
use std::future::Future;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use futures::future::BoxFuture;
use http::Method;

// Layer 3: Internal module imports
use super::request::RequestContext;
use super::response::HttpResponse;

pub use super::request::Params;

/// Boxed handler future.
pub type HandlerFuture = BoxFuture<'static, HttpResponse>;

/// A route endpoint.
pub trait RouteHandler: Send + Sync + 'static {
    /// Produce the response for a matched request.
    fn call(&self, req: RequestContext) -> HandlerFuture;
}

impl<F, Fut> RouteHandler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, req: RequestContext) -> HandlerFuture {
        Box::pin(self(req))
    }
}

/// Wrap an async closure as a boxed route handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RouteHandler>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route {
    method: Method,
    segments: Vec<Segment>,
    handler: Arc<dyn RouteHandler>,
}

/// Method + path router with `:param` captures.
///
/// Matching is first-registered-wins; routes are never reordered at runtime.
/// A path segment prefixed with `:` matches any single segment and captures
/// it into the request's params.
///
/// # Example
///
/// ```rust,ignore
/// use fluxor_net::http::{HttpResponse, Router};
/// use http::Method;
///
/// let router = Router::new()
///     .get("/health", |_req| async { HttpResponse::ok_json(&serde_json::json!({"status": "ok"})) })
///     .get("/instances/:id", |req| async move {
///         let id = req.param("id").unwrap_or("").to_string();
///         HttpResponse::ok_json(&serde_json::json!({"id": id}))
///     });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// An empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route.
    pub fn route<H, Fut>(mut self, method: Method, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            segments: parse_segments(path),
            handler: Arc::new(handler),
        });
        self
    }

    /// Register a route with a pre-built handler.
    pub fn route_handler(
        mut self,
        method: Method,
        path: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> Self {
        self.routes.push(Route {
            method,
            segments: parse_segments(path),
            handler,
        });
        self
    }

    /// Register a `GET` route.
    pub fn get<H, Fut>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    /// Register a `POST` route.
    pub fn post<H, Fut>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    /// Register a `PUT` route.
    pub fn put<H, Fut>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.route(Method::PUT, path, handler)
    }

    /// Register a `DELETE` route.
    pub fn delete<H, Fut>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.route(Method::DELETE, path, handler)
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First registered route matching (method, path), with its captures.
    fn find(&self, method: &Method, path: &str) -> Option<(Arc<dyn RouteHandler>, Params)> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for route in &self.routes {
            if route.method != *method {
                continue;
            }
            if let Some(params) = match_segments(&route.segments, &segments) {
                return Some((Arc::clone(&route.handler), params));
            }
        }
        None
    }

    /// Match and invoke, or 404.
    ///
    /// Public so adapters and tests can exercise routes without binding a
    /// listener.
    pub fn dispatch_route(&self, mut req: RequestContext) -> HandlerFuture {
        match self.find(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req)
            }
            None => Box::pin(async { HttpResponse::not_found() }),
        }
    }
}

fn parse_segments(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(segment.to_string()),
        })
        .collect()
}

fn match_segments(pattern: &[Segment], segments: &[&str]) -> Option<Params> {
    if pattern.len() != segments.len() {
        return None;
    }
    let mut params = Params::new();
    for (part, actual) in pattern.iter().zip(segments) {
        match part {
            Segment::Literal(literal) => {
                if literal != actual {
                    return None;
                }
            }
            Segment::Param(name) => {
                params.insert(name.clone(), (*actual).to_string());
            }
        }
    }
    Some(params)
}
