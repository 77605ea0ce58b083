//! Demo gateway: an HTTP front routing work to worker verticles over the bus.
//!
//! Run with `cargo run --example http_gateway`, then:
//!
//! ```text
//! curl http://127.0.0.1:8080/health
//! curl http://127.0.0.1:8080/status
//! curl http://127.0.0.1:8080/workers
//! curl -X POST http://127.0.0.1:8080/process -d '{"task": "resize"}'
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use fluxor_net::{
    HttpApp, HttpResponse, HttpServer, HttpServerOptions, RecoveryMiddleware,
    RequestLogMiddleware, Router, TimeoutMiddleware,
};
use fluxor_rt::bus::BusError;
use fluxor_rt::config::ConfigMap;
use fluxor_rt::prelude::*;

/// Address workers consume and the gateway requests on.
const WORK_ADDRESS: &str = "workers.process";

/// A worker verticle answering process requests.
struct ProcessWorker {
    worker_id: String,
}

#[async_trait]
impl Verticle for ProcessWorker {
    fn name(&self) -> &str {
        &self.worker_id
    }

    async fn start(&mut self, ctx: FluxorContext) -> Result<(), BoxError> {
        let worker_id = self.worker_id.clone();
        let consumer = ctx.consumer(WORK_ADDRESS)?;
        consumer.handler(move |delivery| {
            let worker_id = worker_id.clone();
            async move {
                let input = delivery.body().clone();
                let _ = delivery
                    .reply(json!({
                        "worker": worker_id,
                        "input": input,
                        "status": "processed",
                    }))
                    .await;
            }
        });
        Ok(())
    }
}

/// The HTTP gateway verticle.
struct GatewayVerticle {
    workers: Arc<Vec<String>>,
    server: Option<HttpServer>,
}

#[async_trait]
impl Verticle for GatewayVerticle {
    fn name(&self) -> &str {
        "http-gateway"
    }

    async fn start(&mut self, ctx: FluxorContext) -> Result<(), BoxError> {
        let vertx = ctx.vertx().ok_or("runtime already gone")?;
        let pool = vertx.executor();

        let status_pool = Arc::clone(&pool);
        let status_vertx = vertx.clone();
        let workers = Arc::clone(&self.workers);

        let router = Router::new()
            .get("/health", |_req| async {
                HttpResponse::ok_json(&json!({"status": "ok"}))
            })
            .get("/status", move |_req| {
                let pool = Arc::clone(&status_pool);
                let vertx = status_vertx.clone();
                async move {
                    let stats = pool.stats();
                    HttpResponse::ok_json(&json!({
                        "status": "UP",
                        "deployments": vertx.deployment_count(),
                        "executor": {
                            "workers": stats.workers,
                            "queued": stats.queued,
                            "active": stats.active,
                            "completed": stats.completed,
                            "rejected": stats.rejected,
                            "utilization_pct": stats.utilization_pct,
                        },
                    }))
                }
            })
            .get("/workers", move |_req| {
                let workers = Arc::clone(&workers);
                async move { HttpResponse::ok_json(&json!({"workers": *workers})) }
            })
            .get("/process", |req| async move { process(req, json!({})).await })
            .post("/process", |req| async move {
                match req.json::<serde_json::Value>() {
                    Ok(body) => process(req, body).await,
                    Err(_) => HttpResponse::bad_request("body must be JSON"),
                }
            });

        let app = HttpApp::new(router)
            .with_middleware(RecoveryMiddleware)
            .with_middleware(RequestLogMiddleware)
            .with_middleware(TimeoutMiddleware::new(Duration::from_secs(10)));

        let options = HttpServerOptions::from_config(ctx.config());
        let server = HttpServer::bind(&ctx, pool, options, app).await?;
        tracing::info!(addr = %server.local_addr(), "gateway listening");
        self.server = Some(server);
        Ok(())
    }

    async fn stop(&mut self, _ctx: FluxorContext) -> Result<(), BoxError> {
        if let Some(server) = &self.server {
            server.shutdown();
        }
        Ok(())
    }
}

async fn process(req: fluxor_net::RequestContext, body: serde_json::Value) -> HttpResponse {
    match req
        .context()
        .request(WORK_ADDRESS, body, Duration::from_secs(2))
        .await
    {
        Ok(reply) => HttpResponse::ok_json(&reply.body),
        Err(BusError::NoConsumer { .. }) | Err(BusError::AllConsumersBusy { .. }) => {
            HttpResponse::service_unavailable("workers unavailable")
        }
        Err(BusError::RequestTimeout { .. }) => {
            HttpResponse::service_unavailable("workers busy")
        }
        Err(error) => {
            tracing::error!(%error, "process request failed");
            HttpResponse::internal_error()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ConfigMap::from_value(json!({
        "http_addr": "127.0.0.1:8080",
        "workers": 4,
        "max_queue": 64,
    }))?;
    let vertx = Vertx::new(VertxOptions::from_config(config));

    // Leaves before roots: workers first, then the gateway.
    let mut worker_names = Vec::new();
    for index in 0..3 {
        let worker_id = format!("worker-{index}");
        worker_names.push(worker_id.clone());
        vertx.deploy(ProcessWorker { worker_id }).await?;
    }

    vertx
        .deploy(GatewayVerticle {
            workers: Arc::new(worker_names),
            server: None,
        })
        .await?;

    tokio::signal::ctrl_c().await?;
    vertx.close().await?;
    Ok(())
}
